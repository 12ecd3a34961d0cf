//! Telemetry configuration from environment variables.

use std::env;

/// Configuration for logging and metrics.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to log lines
    pub service_name: String,

    /// Shard alias of the node, if known
    pub shard: Option<String>,

    /// Process index inside the shard, if known
    pub index: Option<u32>,

    /// Log filter directive (trace, debug, info, warn, error or a full
    /// `EnvFilter` expression)
    pub log_level: String,

    /// Whether to enable JSON formatted logs
    pub json_logs: bool,

    /// Whether to include thread ids in log lines
    pub thread_ids: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "shard-commit".to_string(),
            shard: None,
            index: None,
            log_level: "info".to_string(),
            json_logs: false,
            thread_ids: true,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `SC_SERVICE_NAME`: Service name (default: shard-commit)
    /// - `SC_LOG_LEVEL` or `RUST_LOG`: Log filter (default: info)
    /// - `SC_JSON_LOGS`: Enable JSON logs (default: false, true in containers)
    /// - `SC_THREAD_IDS`: Include thread ids (default: true)
    pub fn from_env() -> Self {
        let is_container =
            env::var("KUBERNETES_SERVICE_HOST").is_ok() || env::var("DOCKER_CONTAINER").is_ok();

        Self {
            service_name: env::var("SC_SERVICE_NAME")
                .unwrap_or_else(|_| "shard-commit".to_string()),

            shard: None,
            index: None,

            log_level: env::var("SC_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),

            json_logs: env::var("SC_JSON_LOGS")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(is_container),

            thread_ids: env::var("SC_THREAD_IDS")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(true),
        }
    }

    /// Configuration for one node of a shard.
    pub fn for_node(shard: &str, index: u32) -> Self {
        let mut config = Self::from_env();
        config.shard = Some(shard.to_string());
        config.index = Some(index);
        config
    }

    /// Service name qualified with the node identity, e.g. `shard-commit-x-1`.
    pub fn full_service_name(&self) -> String {
        match (&self.shard, self.index) {
            (Some(shard), Some(index)) => format!("{}-{}-{}", self.service_name, shard, index),
            (Some(shard), None) => format!("{}-{}", self.service_name, shard),
            _ => self.service_name.clone(),
        }
    }
}
