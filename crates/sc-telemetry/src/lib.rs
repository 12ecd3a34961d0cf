//! # Shard-Commit Telemetry
//!
//! Logging and metrics shared by every subsystem.
//!
//! ## Components
//!
//! - **Logs**: `tracing` events rendered by `tracing-subscriber`, filtered with
//!   `EnvFilter`, optionally as JSON lines
//! - **Metrics**: Prometheus counters and gauges in a process registry
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sc_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let config = TelemetryConfig::for_node("x", 1);
//! let _guard = init_telemetry(&config)?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SC_SERVICE_NAME` | `shard-commit` | Service name in log lines |
//! | `SC_LOG_LEVEL` | `info` | Log filter (falls back to `RUST_LOG`) |
//! | `SC_JSON_LOGS` | `false` | JSON formatted logs |
//! | `SC_THREAD_IDS` | `true` | Thread ids in log lines |

#![warn(missing_docs)]

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::{init_logging, init_test_logging};
pub use metrics::{
    encode_metrics, register_metrics, MetricsHandle, ACTIVE_ROUTES, CONSENSUS_DECISIONS,
    DUPLICATE_FINALIZATIONS, EPOCHS_ABORTED, EPOCHS_STARTED, EPOCH_NACKS, LEADER_CHANGES,
    MESSAGES_DROPPED, MESSAGES_PARKED, MESSAGES_ROUTED, OPEN_SYSTEMS, RESTORES, SUSPICIONS,
    TRANSACTIONS_FINALIZED,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// The global subscriber could not be installed.
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    /// A collector could not be registered or encoded.
    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging and register metrics.
///
/// Returns a guard to hold for the lifetime of the application.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let metrics = register_metrics()?;
    logging::init_logging(config)?;

    Ok(TelemetryGuard {
        service: config.full_service_name(),
        _metrics: metrics,
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    service: String,
    _metrics: MetricsHandle,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.service, "Shutting down telemetry");
    }
}
