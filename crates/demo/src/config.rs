use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use smoothstate::{AuthorityConfig, LinkConditions, ReceiverConfig};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub authority: AuthorityConfig,
    pub receiver: ReceiverConfig,
    pub link: LinkConditions,
    pub receivers: usize,
    /// Zero runs until interrupted.
    pub duration_secs: u64,
    pub render_rate: u32,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            authority: AuthorityConfig::default(),
            receiver: ReceiverConfig::with_delay(100),
            link: LinkConditions::default(),
            receivers: 2,
            duration_secs: 10,
            render_rate: 4,
        }
    }
}

impl DemoConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smoothstate::EdgePolicy;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: DemoConfig = toml::from_str(
            r#"
            receivers = 3

            [receiver]
            delay_ms = 250
            edge_policy = "clamp"

            [link]
            min_latency_ms = 40
            max_latency_ms = 80
            "#,
        )
        .unwrap();

        assert_eq!(config.receivers, 3);
        assert_eq!(config.receiver.delay_ms, 250);
        assert_eq!(config.receiver.backlog(), 400);
        assert_eq!(config.receiver.edge_policy, EdgePolicy::Clamp);
        assert_eq!(config.link.max_latency_ms, 80);
        assert_eq!(config.authority.tick_rate, 60);
        assert_eq!(config.render_rate, 4);
    }
}
