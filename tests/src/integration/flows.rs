//! # Commit Flows
//!
//! Deposits, intra-shard transfers and cross-shard transfers driven through
//! the client gateway, checked against every replica's ledger.
//!
//! ```text
//! gateway ──SbacPrepare──► shard_out nodes ─┐
//!         └─SbacPrepare──► shard_in nodes  ─┼─► prepare consensus per shard
//!                                           │      └─SbacLocalPrepared (leaders)
//!                                           └─► accept consensus ─► AllPrepared
//! ```

#[cfg(test)]
mod tests {
    use crate::integration::{balance, commit, reports_from, start_cluster, STEP_TIMEOUT};
    use node_runtime::InMemoryCluster;
    use shared_types::{Phase, ProcessId, Transaction, TransactionAction, TransactionStatus};
    use std::time::Duration;

    async fn eventually(what: &str, condition: impl Fn() -> bool) {
        let reached = tokio::time::timeout(STEP_TIMEOUT, async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(reached.is_ok(), "timed out waiting until {what}");
    }

    fn leader_of(cluster: &InMemoryCluster, shard: &str) -> ProcessId {
        cluster.shard(shard)[0].leader().expect("shard has a leader")
    }

    fn assert_all(reports: &[sc_03_atomic_commit::AllPrepared], action: TransactionAction) {
        assert!(!reports.is_empty());
        for report in reports {
            assert_eq!(report.action, action, "reported by {}", report.reporter);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_deposit_accepted_on_every_replica() {
        let cluster = start_cluster(&[("x", 3)]).await;

        let deposit = Transaction::deposit("A", 100, "x");
        let reports = commit(&cluster, &deposit).await;
        assert_eq!(reports.len(), 3);
        assert_all(&reports, TransactionAction::Commit);

        for node in cluster.shard("x") {
            let log = node.transactions();
            assert_eq!(log.len(), 1);
            assert_eq!(log[0].id, deposit.id);
            assert_eq!(log[0].status, TransactionStatus::Accepted);
            assert_eq!(balance(node, "A"), 100);
        }
        cluster.shutdown();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_intra_shard_transfer() {
        let cluster = start_cluster(&[("x", 3)]).await;

        commit(&cluster, &Transaction::deposit("A", 100, "x")).await;
        let transfer = Transaction::transfer("A", "B", 40, "x", "x");
        let reports = commit(&cluster, &transfer).await;
        assert_all(&reports, TransactionAction::Commit);

        for node in cluster.shard("x") {
            assert_eq!(balance(node, "A"), 60);
            assert_eq!(balance(node, "B"), 40);
        }
        cluster.shutdown();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_insufficient_funds_rejected() {
        let cluster = start_cluster(&[("x", 3)]).await;

        commit(&cluster, &Transaction::deposit("A", 10, "x")).await;
        let transfer = Transaction::transfer("A", "B", 40, "x", "x");
        let reports = commit(&cluster, &transfer).await;
        assert_all(&reports, TransactionAction::Abort);

        for node in cluster.shard("x") {
            let rejected = node
                .transactions()
                .into_iter()
                .find(|t| t.id == transfer.id)
                .expect("rejected transaction logged");
            assert_eq!(rejected.status, TransactionStatus::Rejected);
            assert_eq!(balance(node, "A"), 10);
            assert_eq!(balance(node, "B"), 0);
        }
        cluster.shutdown();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_cross_shard_transfer() {
        let cluster = start_cluster(&[("x", 3), ("y", 3)]).await;

        commit(&cluster, &Transaction::deposit("A", 100, "x")).await;
        let transfer = Transaction::transfer("A", "C", 30, "x", "y");
        let reports = commit(&cluster, &transfer).await;
        assert_eq!(reports.len(), 6);
        assert_all(&reports, TransactionAction::Commit);

        for node in cluster.shard("x") {
            assert_eq!(balance(node, "A"), 70);
            assert!(!node.balances().contains_key("C"));
        }
        for node in cluster.shard("y") {
            assert_eq!(balance(node, "C"), 30);
            assert!(!node.balances().contains_key("A"));
        }
        cluster.shutdown();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_cross_shard_abort_reaches_both_shards() {
        let cluster = start_cluster(&[("x", 3), ("y", 3)]).await;

        commit(&cluster, &Transaction::deposit("A", 100, "x")).await;
        let overdraft = Transaction::transfer("A", "C", 500, "x", "y");
        let reports = commit(&cluster, &overdraft).await;
        assert_eq!(reports.len(), 6);
        assert_all(&reports, TransactionAction::Abort);

        for node in cluster.nodes() {
            assert_eq!(balance(node, "C"), 0);
        }
        for node in cluster.shard("x") {
            assert_eq!(balance(node, "A"), 100);
        }
        cluster.shutdown();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_cross_shard_votes_exchanged_once_by_leaders() {
        let cluster = start_cluster(&[("x", 3), ("y", 3)]).await;
        commit(&cluster, &Transaction::deposit("A", 100, "x")).await;

        let transfer = Transaction::transfer("A", "C", 30, "x", "y");
        let prepare = Phase::Prepare.system_id(&transfer.id);
        let accept = Phase::Accept.system_id(&transfer.id);
        let (x_leader, y_leader) = (leader_of(&cluster, "x"), leader_of(&cluster, "y"));

        // Only shard x is asked first; y's prepare request is held back.
        for node in cluster.shard("x") {
            node.request_prepare(transfer.clone());
        }
        eventually("x decided its prepare phase", || {
            cluster.shard("x").iter().all(|n| n.is_decided(&prepare))
        })
        .await;
        eventually("x's vote reached every y replica", || {
            cluster.network().traffic("sbac_local_prepared").len() == 3
        })
        .await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        // One shard voted: nobody may enter the accept phase yet.
        for node in cluster.nodes() {
            assert!(!node.is_open(&accept), "{} opened {accept} early", node.process());
            assert!(!node.is_decided(&accept), "{} decided {accept} early", node.process());
        }

        for node in cluster.shard("y") {
            node.request_prepare(transfer.clone());
        }
        let everyone: Vec<ProcessId> = cluster.nodes().iter().map(|n| n.process().clone()).collect();
        let reports = reports_from(&cluster, &transfer.id, &everyone).await;
        assert_all(&reports, TransactionAction::Commit);
        for node in cluster.nodes() {
            assert!(node.is_decided(&accept));
        }

        // Exactly one vote per (leader, replica of the other shard).
        let mut expected: Vec<(ProcessId, ProcessId, usize)> = cluster
            .shard("y")
            .iter()
            .map(|n| (x_leader.clone(), n.process().clone(), 1))
            .chain(
                cluster
                    .shard("x")
                    .iter()
                    .map(|n| (y_leader.clone(), n.process().clone(), 1)),
            )
            .collect();
        expected.sort_by_key(|(from, to, _)| (from.rank, to.rank));
        assert_eq!(cluster.network().traffic("sbac_local_prepared"), expected);
        cluster.shutdown();
    }
}
