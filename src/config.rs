//! TOML configuration for the snapshot subsystem.
//!
//! Loaded from the node's config path; absent file or sections fall back to
//! defaults. The host binary is responsible for CLI/environment overrides.

use crate::chainparams::{ChainParams, MainParams, RegtestParams, TestParams};
use crate::limiter::RateLimiterLimits;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SnapshotConfig {
    #[serde(default)]
    pub node: NodeSection,
    /// Server-side admission limits (see [`RateLimiterLimits`]).
    #[serde(default)]
    pub limits: RateLimiterLimits,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    pub data_dir: String,
    /// Chain network: "main", "test" or "regtest".
    pub network: String,
    /// Whether this node accepts inbound connections. Gates the
    /// snapshot-serving service advertisement.
    pub listen: bool,
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            data_dir: "./data/node".into(),
            network: "main".into(),
            listen: true,
        }
    }
}

impl SnapshotConfig {
    /// Load from a TOML file; a missing file yields the defaults.
    pub fn load(path: &Path) -> io::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let s = std::fs::read_to_string(path)?;
        toml::from_str(&s)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("config parse: {e}")))
    }

    /// Chain parameters for the configured network. Unknown names fall back
    /// to mainnet.
    pub fn chain_params(&self) -> Box<dyn ChainParams> {
        match self.node.network.as_str() {
            "test" => Box::new(TestParams::new()),
            "regtest" => Box::new(RegtestParams::new()),
            _ => Box::new(MainParams::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let cfg = SnapshotConfig::load(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(cfg.node.network, "main");
        assert!(cfg.node.listen);
        assert_eq!(cfg.limits.max_chunks_per_peer_per_minute, 30);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: SnapshotConfig = toml::from_str(
            r#"
            [node]
            network = "regtest"
            listen = false

            [limits]
            max_concurrent_transfers = 5
            "#,
        )
        .unwrap();
        assert_eq!(cfg.node.network, "regtest");
        assert!(!cfg.node.listen);
        assert_eq!(cfg.limits.max_concurrent_transfers, 5);
        // untouched fields keep their defaults
        assert_eq!(cfg.limits.ban_threshold, 100);
        assert_eq!(cfg.node.data_dir, "./data/node");
    }

    #[test]
    fn chain_params_selection() {
        let mut cfg = SnapshotConfig::default();
        cfg.node.network = "regtest".into();
        assert!(cfg.chain_params().snapshot_checkpoints().is_empty());
        cfg.node.network = "main".into();
        assert_eq!(cfg.chain_params().snapshot_checkpoints().len(), 1);
    }

    #[test]
    fn config_roundtrip() {
        let cfg = SnapshotConfig::default();
        let s = toml::to_string(&cfg).unwrap();
        let back: SnapshotConfig = toml::from_str(&s).unwrap();
        assert_eq!(back.node.data_dir, cfg.node.data_dir);
        assert_eq!(back.limits.ban_duration_s, cfg.limits.ban_duration_s);
    }
}
