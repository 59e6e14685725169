use crate::errors::Error;
use anyhow::{bail, Result};
use serde::Deserialize;

/// Process-wide engine options. Unknown keys are configuration errors.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    pub buffer_pool_frames: usize,
    pub replacement_strategy: ReplacementPolicy,
    pub lruk_k: usize,
    /// Consumed by the external server; only validated here.
    pub max_clients: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            buffer_pool_frames: 128,
            replacement_strategy: ReplacementPolicy::Lru,
            lruk_k: 2,
            max_clients: 64,
        }
    }
}

impl Config {
    pub fn from_toml(input: &str) -> Result<Self> {
        let config: Config = match toml::from_str(input) {
            Ok(config) => config,
            Err(e) => bail!(Error::Config(e.message().to_string())),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.buffer_pool_frames == 0 {
            bail!(Error::Config("buffer_pool_frames must be positive".into()));
        }
        if self.lruk_k == 0 {
            bail!(Error::Config("lruk_k must be positive".into()));
        }
        if self.max_clients == 0 {
            bail!(Error::Config("max_clients must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ReplacementPolicy {
    #[serde(rename = "LRU")]
    Lru,
    #[serde(rename = "LFU")]
    Lfu,
    #[serde(rename = "LRU-K")]
    LruK,
    #[serde(rename = "Random")]
    Random,
    #[serde(rename = "FIFO")]
    Fifo,
}

impl std::str::FromStr for ReplacementPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "LRU" => Ok(ReplacementPolicy::Lru),
            "LFU" => Ok(ReplacementPolicy::Lfu),
            "LRU-K" => Ok(ReplacementPolicy::LruK),
            "Random" => Ok(ReplacementPolicy::Random),
            "FIFO" => Ok(ReplacementPolicy::Fifo),
            other => bail!(Error::Config(format!(
                "unknown replacement strategy {other:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.buffer_pool_frames, 128);
        assert_eq!(config.replacement_strategy, ReplacementPolicy::Lru);
        assert_eq!(config.lruk_k, 2);
    }

    #[test]
    fn test_parse_toml() -> anyhow::Result<()> {
        let config = Config::from_toml(
            r#"
            buffer_pool_frames = 16
            replacement_strategy = "LRU-K"
            lruk_k = 3
            "#,
        )?;
        assert_eq!(config.buffer_pool_frames, 16);
        assert_eq!(config.replacement_strategy, ReplacementPolicy::LruK);
        assert_eq!(config.lruk_k, 3);
        assert_eq!(config.max_clients, 64);
        Ok(())
    }

    #[test]
    fn test_unknown_option_rejected() {
        assert!(Config::from_toml("frames = 10").is_err());
    }

    #[test]
    fn test_bad_strategy_rejected() {
        assert!(Config::from_toml(r#"replacement_strategy = "CLOCK""#).is_err());
    }

    #[test]
    fn test_zero_frames_rejected() {
        assert!(Config::from_toml("buffer_pool_frames = 0").is_err());
    }
}
