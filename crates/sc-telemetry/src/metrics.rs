//! Prometheus metrics for shard-commit subsystems.
//!
//! All metrics follow the naming convention: `sc_<subsystem>_<metric>_<unit>`
//!
//! Counters are usable before registration; `register_metrics()` only makes
//! them visible to `encode_metrics()`.

use lazy_static::lazy_static;
use prometheus::{CounterVec, Encoder, IntCounter, IntGauge, Opts, Registry, TextEncoder};

use crate::TelemetryError;

lazy_static! {
    /// Metrics registry for this process
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // BROKER METRICS
    // =========================================================================

    /// Messages enqueued on a route
    pub static ref MESSAGES_ROUTED: IntCounter = IntCounter::new(
        "sc_broker_messages_routed_total",
        "Messages delivered to an actor queue"
    ).expect("metric creation failed");

    /// Messages parked until their route subscribes
    pub static ref MESSAGES_PARKED: IntCounter = IntCounter::new(
        "sc_broker_messages_parked_total",
        "Messages held for a route that does not exist yet"
    ).expect("metric creation failed");

    /// Messages dropped, by reason
    pub static ref MESSAGES_DROPPED: CounterVec = CounterVec::new(
        Opts::new("sc_broker_messages_dropped_total", "Messages dropped by the broker"),
        &["reason"]  // retired, parked_overflow, queue_full, transport, crashed
    ).expect("metric creation failed");

    /// Live routes
    pub static ref ACTIVE_ROUTES: IntGauge = IntGauge::new(
        "sc_broker_active_routes",
        "Number of subscribed (scope, abstraction) routes"
    ).expect("metric creation failed");

    // =========================================================================
    // FAILURE & LEADER DETECTION METRICS
    // =========================================================================

    /// Suspicions raised by the failure detector
    pub static ref SUSPICIONS: IntCounter = IntCounter::new(
        "sc_epfd_suspicions_total",
        "Peers newly suspected"
    ).expect("metric creation failed");

    /// Suspicions withdrawn by the failure detector
    pub static ref RESTORES: IntCounter = IntCounter::new(
        "sc_epfd_restores_total",
        "Peers restored after a false suspicion"
    ).expect("metric creation failed");

    /// Leader changes published by the leader detector
    pub static ref LEADER_CHANGES: IntCounter = IntCounter::new(
        "sc_eld_leader_changes_total",
        "Trust publications after a leader change"
    ).expect("metric creation failed");

    // =========================================================================
    // CONSENSUS METRICS
    // =========================================================================

    /// Epochs adopted by epoch change
    pub static ref EPOCHS_STARTED: IntCounter = IntCounter::new(
        "sc_ec_epochs_started_total",
        "New epochs accepted"
    ).expect("metric creation failed");

    /// NACKs sent by epoch change
    pub static ref EPOCH_NACKS: IntCounter = IntCounter::new(
        "sc_ec_nacks_total",
        "NewEpoch announcements refused"
    ).expect("metric creation failed");

    /// Epoch consensus instances aborted
    pub static ref EPOCHS_ABORTED: IntCounter = IntCounter::new(
        "sc_ep_aborted_total",
        "Epoch consensus instances superseded"
    ).expect("metric creation failed");

    /// Uniform consensus decisions, by phase
    pub static ref CONSENSUS_DECISIONS: CounterVec = CounterVec::new(
        Opts::new("sc_uc_decisions_total", "Consensus systems decided"),
        &["phase"]  // prepare, accept
    ).expect("metric creation failed");

    /// Open consensus systems
    pub static ref OPEN_SYSTEMS: IntGauge = IntGauge::new(
        "sc_uc_open_systems",
        "Consensus systems opened and not yet decided"
    ).expect("metric creation failed");

    // =========================================================================
    // ATOMIC COMMIT METRICS
    // =========================================================================

    /// Transactions finalized, by outcome
    pub static ref TRANSACTIONS_FINALIZED: CounterVec = CounterVec::new(
        Opts::new("sc_sbac_transactions_finalized_total", "Transactions finalized"),
        &["status"]  // accepted, rejected
    ).expect("metric creation failed");

    /// Duplicate finalizations suppressed
    pub static ref DUPLICATE_FINALIZATIONS: IntCounter = IntCounter::new(
        "sc_sbac_duplicate_finalizations_total",
        "Accept decisions dropped because the transaction was already logged"
    ).expect("metric creation failed");
}

/// Handle returned once metrics are registered.
pub struct MetricsHandle {
    registered: usize,
}

impl MetricsHandle {
    /// Number of collectors registered by this call.
    pub fn registered(&self) -> usize {
        self.registered
    }
}

/// Register all metrics with the process registry.
///
/// Collectors registered by an earlier call are skipped.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Broker
        Box::new(MESSAGES_ROUTED.clone()),
        Box::new(MESSAGES_PARKED.clone()),
        Box::new(MESSAGES_DROPPED.clone()),
        Box::new(ACTIVE_ROUTES.clone()),
        // Detection
        Box::new(SUSPICIONS.clone()),
        Box::new(RESTORES.clone()),
        Box::new(LEADER_CHANGES.clone()),
        // Consensus
        Box::new(EPOCHS_STARTED.clone()),
        Box::new(EPOCH_NACKS.clone()),
        Box::new(EPOCHS_ABORTED.clone()),
        Box::new(CONSENSUS_DECISIONS.clone()),
        Box::new(OPEN_SYSTEMS.clone()),
        // Atomic commit
        Box::new(TRANSACTIONS_FINALIZED.clone()),
        Box::new(DUPLICATE_FINALIZATIONS.clone()),
    ];

    let mut registered = 0;
    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) => registered += 1,
            Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle { registered })
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}
