use std::f64::consts::{PI, TAU};

use smoothstate::{Entity, SimulationState};

/// Two dots circling in opposite directions, velocity in rad/s.
pub fn initial_state() -> SimulationState {
    SimulationState::new()
        .with(
            "a",
            Entity::new()
                .with("angle", 0.0)
                .with("velocity", 1.0)
                .with("color", "red"),
        )
        .with(
            "b",
            Entity::new()
                .with("angle", PI)
                .with("velocity", -1.0)
                .with("color", "blue"),
        )
}

pub fn spin(state: &SimulationState, dt: f64) -> SimulationState {
    state
        .iter()
        .map(|(id, entity)| {
            let mut entity = entity.clone();
            let angle = entity.scalar("angle").unwrap_or(0.0);
            let velocity = entity.scalar("velocity").unwrap_or(0.0);
            entity.set("angle", angle + velocity * dt);
            (id.to_owned(), entity)
        })
        .collect()
}

/// `a=0.52 b=2.62`, angles folded into one turn for display.
pub fn describe(state: &SimulationState) -> String {
    state
        .iter()
        .map(|(id, entity)| match entity.scalar("angle") {
            Some(angle) => format!("{id}={:.3}", angle.rem_euclid(TAU)),
            None => format!("{id}=?"),
        })
        .collect::<Vec<_>>()
        .join(" ")
}
