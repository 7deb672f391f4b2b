use std::collections::BTreeMap;

use rkyv::{Archive, Deserialize, Serialize};

/// Values that are carried along unchanged when two records are blended.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub enum Opaque {
    Text(String),
    Flag(bool),
}

/// A single field of an entity record. The kind is fixed when the record is
/// built and must stay the same for a given entity across snapshots.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub enum FieldValue {
    Scalar(f64),
    Vector(Vec<f64>),
    Opaque(Opaque),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Scalar,
    Vector,
    Opaque,
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            Self::Scalar(_) => FieldKind::Scalar,
            Self::Vector(_) => FieldKind::Vector,
            Self::Opaque(_) => FieldKind::Opaque,
        }
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&[f64]> {
        match self {
            Self::Vector(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Opaque(Opaque::Text(text)) => Some(text),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Self::Opaque(Opaque::Flag(flag)) => Some(*flag),
            _ => None,
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

impl From<Vec<f64>> for FieldValue {
    fn from(values: Vec<f64>) -> Self {
        Self::Vector(values)
    }
}

impl<const N: usize> From<[f64; N]> for FieldValue {
    fn from(values: [f64; N]) -> Self {
        Self::Vector(values.to_vec())
    }
}

impl From<&str> for FieldValue {
    fn from(text: &str) -> Self {
        Self::Opaque(Opaque::Text(text.to_owned()))
    }
}

impl From<String> for FieldValue {
    fn from(text: String) -> Self {
        Self::Opaque(Opaque::Text(text))
    }
}

impl From<bool> for FieldValue {
    fn from(flag: bool) -> Self {
        Self::Opaque(Opaque::Flag(flag))
    }
}

/// A named mapping of fields to values.
#[derive(Debug, Clone, Default, PartialEq, Archive, Serialize, Deserialize)]
pub struct Entity {
    fields: BTreeMap<String, FieldValue>,
}

impl Entity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn scalar(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(FieldValue::as_scalar)
    }

    pub fn vector(&self, name: &str) -> Option<&[f64]> {
        self.get(name).and_then(FieldValue::as_vector)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_text)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[inline]
fn lerp(from: f64, to: f64, frac: f64) -> f64 {
    from + frac * (to - from)
}

fn blend_field(name: &str, from: &FieldValue, to: &FieldValue, frac: f64) -> FieldValue {
    match (from, to) {
        (FieldValue::Scalar(a), FieldValue::Scalar(b)) => FieldValue::Scalar(lerp(*a, *b, frac)),
        (FieldValue::Vector(a), FieldValue::Vector(b)) => {
            assert_eq!(
                a.len(),
                b.len(),
                "vector field `{name}` changed length between snapshots"
            );
            FieldValue::Vector(
                a.iter()
                    .zip(b)
                    .map(|(a, b)| lerp(*a, *b, frac))
                    .collect(),
            )
        }
        (FieldValue::Opaque(_), FieldValue::Opaque(_)) => from.clone(),
        _ => panic!(
            "field `{name}` changed kind between snapshots ({:?} -> {:?})",
            from.kind(),
            to.kind()
        ),
    }
}

/// Blends two records of the same entity. A record present on only one side
/// is returned as is; `None` only when both sides are absent.
///
/// `frac` is normally in `0..=1` but may lie outside it when extrapolating.
pub fn blend_entity(from: Option<&Entity>, to: Option<&Entity>, frac: f64) -> Option<Entity> {
    let (from, to) = match (from, to) {
        (Some(from), Some(to)) => (from, to),
        (Some(only), None) | (None, Some(only)) => return Some(only.clone()),
        (None, None) => return None,
    };

    let fields = from
        .fields
        .iter()
        .map(|(name, value)| {
            let blended = match to.fields.get(name) {
                Some(target) => blend_field(name, value, target, frac),
                None => value.clone(),
            };
            (name.clone(), blended)
        })
        .collect();

    Some(Entity { fields })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_fields_blend_linearly() {
        let from = Entity::new().with("angle", 0.0);
        let to = Entity::new().with("angle", 2.0);

        let blended = blend_entity(Some(&from), Some(&to), 0.25).unwrap();
        assert_eq!(blended.scalar("angle"), Some(0.5));
    }

    #[test]
    fn vector_fields_blend_per_element() {
        let from = Entity::new().with("position", [0.0, 10.0, -4.0]);
        let to = Entity::new().with("position", [10.0, 20.0, 4.0]);

        let blended = blend_entity(Some(&from), Some(&to), 0.5).unwrap();
        assert_eq!(blended.vector("position"), Some(&[5.0, 15.0, 0.0][..]));
    }

    #[test]
    fn opaque_fields_copy_first_record() {
        let from = Entity::new().with("color", "red").with("visible", true);
        let to = Entity::new().with("color", "blue").with("visible", false);

        let blended = blend_entity(Some(&from), Some(&to), 0.9).unwrap();
        assert_eq!(blended.text("color"), Some("red"));
        assert_eq!(blended.get("visible").and_then(FieldValue::as_flag), Some(true));
    }

    #[test]
    fn one_sided_records_are_copied() {
        let only = Entity::new().with("angle", 1.5).with("color", "blue");

        assert_eq!(blend_entity(Some(&only), None, 0.3), Some(only.clone()));
        assert_eq!(blend_entity(None, Some(&only), 0.3), Some(only.clone()));
        assert_eq!(blend_entity(None, None, 0.3), None);
    }

    #[test]
    fn extrapolation_overshoots() {
        let from = Entity::new().with("x", 1.0);
        let to = Entity::new().with("x", 2.0);

        let ahead = blend_entity(Some(&from), Some(&to), 1.5).unwrap();
        let behind = blend_entity(Some(&from), Some(&to), -1.0).unwrap();
        assert_eq!(ahead.scalar("x"), Some(2.5));
        assert_eq!(behind.scalar("x"), Some(0.0));
    }

    #[test]
    #[should_panic(expected = "changed length")]
    fn mismatched_vectors_fail_fast() {
        let from = Entity::new().with("position", [0.0, 1.0]);
        let to = Entity::new().with("position", [0.0, 1.0, 2.0]);
        blend_entity(Some(&from), Some(&to), 0.5);
    }

    #[test]
    #[should_panic(expected = "changed kind")]
    fn mismatched_kinds_fail_fast() {
        let from = Entity::new().with("angle", 0.0);
        let to = Entity::new().with("angle", "zero");
        blend_entity(Some(&from), Some(&to), 0.5);
    }
}
