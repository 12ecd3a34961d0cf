//! # Node Configuration
//!
//! Unified configuration for one shard-commit process.
//!
//! ## Loading Order
//!
//! 1. Built-in defaults
//! 2. TOML file named by `SC_CONFIG` (if set)
//! 3. Environment overrides (`SC_ALIAS`, `SC_INDEX`, `SC_HOST`, `SC_PORT`,
//!    `SC_DELAY_MS`, `SC_EPOCH_INCREMENT`, `SC_QUORUM`)
//!
//! ```toml
//! [node]
//! alias = "x"
//! index = 1
//! host = "127.0.0.1"
//! port = 5001
//!
//! [consensus]
//! quorum = "majority"
//!
//! [[peers]]
//! owner = "x"
//! index = 1
//! host = "127.0.0.1"
//! port = 5001
//! rank = 1
//! ```

use sc_01_failure_detection::DetectorConfig;
use sc_02_consensus::{ConsensusConfig, QuorumPolicy};
use serde::{Deserialize, Serialize};
use shared_bus::BrokerConfig;
use shared_types::ProcessId;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable naming the TOML file.
pub const CONFIG_PATH_ENV: &str = "SC_CONFIG";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Cannot read {path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file is not valid TOML for [`NodeConfig`].
    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// An environment override could not be parsed.
    #[error("Invalid value {value:?} for {key}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Raw value.
        value: String,
    },

    /// The configuration is inconsistent.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Complete node configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Identity and listening address.
    pub node: NodeSection,
    /// Failure detector timing.
    pub detector: DetectorSection,
    /// Consensus tuning.
    pub consensus: ConsensusConfig,
    /// Broker sizing.
    pub broker: BrokerSection,
    /// Static membership used by the static registrar.
    pub peers: Vec<PeerConfig>,
}

/// Identity and listening address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    /// Shard this process belongs to.
    pub alias: String,
    /// Index within the shard.
    pub index: u32,
    /// Host peers reach this process on.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            alias: "x".to_string(),
            index: 1,
            host: "127.0.0.1".to_string(),
            port: 5001,
        }
    }
}

/// Failure detector timing, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorSection {
    /// Initial round length.
    pub initial_delay_ms: u64,
    /// Round length growth after a false suspicion.
    pub delay_increment_ms: u64,
}

impl Default for DetectorSection {
    fn default() -> Self {
        Self {
            initial_delay_ms: 100,
            delay_increment_ms: 100,
        }
    }
}

impl From<DetectorSection> for DetectorConfig {
    fn from(section: DetectorSection) -> Self {
        DetectorConfig {
            initial_delay: Duration::from_millis(section.initial_delay_ms),
            delay_increment: Duration::from_millis(section.delay_increment_ms),
        }
    }
}

/// Broker sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerSection {
    /// Capacity of each actor queue.
    pub queue_capacity: usize,
    /// Messages held per route that is not subscribed yet.
    pub max_parked_per_route: usize,
    /// Routes allowed to hold parked messages at once.
    pub max_parked_routes: usize,
    /// Retired consensus systems remembered.
    pub max_retired_scopes: usize,
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            queue_capacity: shared_bus::DEFAULT_QUEUE_CAPACITY,
            max_parked_per_route: shared_bus::DEFAULT_QUEUE_CAPACITY,
            max_parked_routes: shared_bus::DEFAULT_MAX_PARKED_ROUTES,
            max_retired_scopes: shared_bus::DEFAULT_MAX_RETIRED_SCOPES,
        }
    }
}

impl From<BrokerSection> for BrokerConfig {
    fn from(section: BrokerSection) -> Self {
        BrokerConfig {
            queue_capacity: section.queue_capacity,
            max_parked_per_route: section.max_parked_per_route,
            max_parked_routes: section.max_parked_routes,
            max_retired_scopes: section.max_retired_scopes,
        }
    }
}

/// One statically known process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Shard.
    pub owner: String,
    /// Index within the shard.
    pub index: u32,
    /// Host.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Leader-election rank, unique across the cluster.
    pub rank: u32,
}

impl PeerConfig {
    /// Process identity of this entry.
    pub fn process_id(&self) -> ProcessId {
        ProcessId::new(self.host.clone(), self.port, self.owner.clone(), self.index)
            .with_rank(self.rank)
    }
}

impl NodeConfig {
    /// Defaults, then the `SC_CONFIG` file, then environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parse TOML text; missing sections keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `SC_*` overrides read through `lookup`.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(alias) = lookup("SC_ALIAS") {
            self.node.alias = alias;
        }
        if let Some(host) = lookup("SC_HOST") {
            self.node.host = host;
        }
        if let Some(index) = parse_override(&lookup, "SC_INDEX")? {
            self.node.index = index;
        }
        if let Some(port) = parse_override(&lookup, "SC_PORT")? {
            self.node.port = port;
        }
        if let Some(delay) = parse_override(&lookup, "SC_DELAY_MS")? {
            self.detector.initial_delay_ms = delay;
        }
        if let Some(increment) = parse_override(&lookup, "SC_EPOCH_INCREMENT")? {
            self.consensus.epoch_increment = increment;
        }
        if let Some(quorum) = lookup("SC_QUORUM") {
            self.consensus.quorum =
                quorum
                    .parse::<QuorumPolicy>()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: "SC_QUORUM".into(),
                        value: quorum.clone(),
                    })?;
        }
        Ok(())
    }

    /// Reject configurations a node cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node.alias.trim().is_empty() {
            return Err(ConfigError::Invalid("node.alias must not be empty".into()));
        }
        if self.detector.initial_delay_ms == 0 {
            return Err(ConfigError::Invalid(
                "detector.initial_delay_ms must be positive".into(),
            ));
        }
        self.consensus
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let mut identities = HashSet::new();
        let mut ranks = HashSet::new();
        for peer in &self.peers {
            if !identities.insert(peer.process_id()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate peer {}",
                    peer.process_id()
                )));
            }
            if peer.rank == 0 || !ranks.insert(peer.rank) {
                return Err(ConfigError::Invalid(format!(
                    "peer {} has a zero or duplicate rank {}",
                    peer.process_id(),
                    peer.rank
                )));
            }
        }
        Ok(())
    }
}

fn parse_override<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
        None => Ok(None),
    }
}
