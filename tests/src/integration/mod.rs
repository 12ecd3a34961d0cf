//! End-to-end scenarios over in-memory clusters.

pub mod flows;
pub mod recovery;

use node_runtime::{InMemoryCluster, NodeConfig, NodeHandle};
use sc_03_atomic_commit::AllPrepared;
use shared_types::{ProcessId, Transaction};
use std::time::Duration;

/// Upper bound for any single scenario step.
pub const STEP_TIMEOUT: Duration = Duration::from_secs(10);

/// Node template with a fast failure detector.
pub fn fast_config() -> NodeConfig {
    let mut config = NodeConfig::default();
    config.detector.initial_delay_ms = 20;
    config.detector.delay_increment_ms = 20;
    config
}

/// Start `shards` and wait until every node agrees on its shard leader.
pub async fn start_cluster(shards: &[(&str, u32)]) -> InMemoryCluster {
    sc_telemetry::init_test_logging();
    let cluster = InMemoryCluster::with_shards(fast_config(), shards).expect("cluster start");
    assert!(
        cluster.await_stable_leaders(STEP_TIMEOUT).await,
        "leaders did not stabilize"
    );
    cluster
}

/// Submit `tx` and wait until every live node of its shards reported it.
pub async fn commit(cluster: &InMemoryCluster, tx: &Transaction) -> Vec<AllPrepared> {
    let expected: Vec<ProcessId> = tx
        .shards()
        .into_iter()
        .flat_map(|shard| cluster.alive(shard))
        .map(|node| node.process().clone())
        .collect();
    cluster.gateway().submit(tx).expect("submit");
    reports_from(cluster, &tx.id, &expected).await
}

/// Wait until each of `reporters` reported `tx_id`.
pub async fn reports_from(
    cluster: &InMemoryCluster,
    tx_id: &str,
    reporters: &[ProcessId],
) -> Vec<AllPrepared> {
    let gateway = cluster.gateway();
    tokio::time::timeout(STEP_TIMEOUT, async {
        loop {
            let reports = gateway.outcome(tx_id);
            if reporters
                .iter()
                .all(|p| reports.iter().any(|r| r.reporter == *p))
            {
                return reports;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("{tx_id} not reported by all of {reporters:?}"))
}

/// Balance of `account` at `node`, zero if unknown.
pub fn balance(node: &NodeHandle, account: &str) -> i64 {
    node.balances().get(account).copied().unwrap_or(0)
}
