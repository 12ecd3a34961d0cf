//! # Recovery and Replica Agreement
//!
//! Leader crash during a commit, duplicate decisions, and ledger agreement
//! under conflicting concurrent transfers.

#[cfg(test)]
mod tests {
    use crate::integration::{balance, commit, reports_from, start_cluster, STEP_TIMEOUT};
    use rand::seq::SliceRandom;
    use sc_03_atomic_commit::fold_balances;
    use shared_types::{
        AbstractionId, Message, Payload, ProcessId, Scope, Transaction, TransactionAction, Value,
    };
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_leader_crash_mid_commit() {
        let cluster = start_cluster(&[("x", 3)]).await;
        let leader = cluster.node("x", 3).expect("leader").process().clone();
        assert_eq!(cluster.node("x", 1).expect("follower").leader(), Some(leader.clone()));

        let deposit = Transaction::deposit("A", 100, "x");
        cluster.gateway().submit(&deposit).expect("submit");
        cluster.crash(&leader);

        let survivors: Vec<ProcessId> = cluster
            .alive("x")
            .into_iter()
            .map(|n| n.process().clone())
            .collect();
        assert_eq!(survivors.len(), 2);
        let reports = reports_from(&cluster, &deposit.id, &survivors).await;
        for report in reports.iter().filter(|r| r.reporter != leader) {
            assert_eq!(report.action, TransactionAction::Commit);
        }

        assert!(cluster.await_stable_leaders(STEP_TIMEOUT).await);
        for node in cluster.alive("x") {
            assert_eq!(node.leader(), Some(survivors[1].clone()));
            assert_eq!(balance(node, "A"), 100);
        }

        // The shard keeps committing without the crashed process.
        let transfer = Transaction::transfer("A", "B", 25, "x", "x");
        commit(&cluster, &transfer).await;
        for node in cluster.alive("x") {
            assert_eq!(balance(node, "A"), 75);
            assert_eq!(balance(node, "B"), 25);
        }
        cluster.shutdown();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_duplicate_decision_reports_once() {
        let cluster = start_cluster(&[("x", 3)]).await;
        let deposit = Transaction::deposit("A", 100, "x");
        let reports = commit(&cluster, &deposit).await;
        assert_eq!(reports.len(), 3);

        let node = cluster.node("x", 1).expect("node");
        let decided = reports[0].transaction.clone();
        node.link().trigger(Message::new(
            Scope::Process,
            AbstractionId::Sbac,
            Payload::UcDecide(Value::Accept {
                action: TransactionAction::Commit,
                transaction: decided,
            }),
        ));
        // A second prepare request for a finalized transaction is refused too.
        node.request_prepare(deposit.clone());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(cluster.gateway().outcome(&deposit.id).len(), 3);
        assert_eq!(node.transactions().len(), 1);
        assert_eq!(balance(node, "A"), 100);
        cluster.shutdown();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_replicas_agree_under_conflicting_transfers() {
        let cluster = start_cluster(&[("x", 3)]).await;
        commit(&cluster, &Transaction::deposit("A", 100, "x")).await;

        let first = Transaction::transfer("A", "B", 60, "x", "x");
        let second = Transaction::transfer("A", "C", 60, "x", "x");
        cluster.gateway().submit(&first).expect("submit");
        cluster.gateway().submit(&second).expect("submit");

        let everyone: Vec<ProcessId> = cluster.nodes().iter().map(|n| n.process().clone()).collect();
        let first_reports = reports_from(&cluster, &first.id, &everyone).await;
        let second_reports = reports_from(&cluster, &second.id, &everyone).await;

        // Every replica reports the same action for each transaction.
        for reports in [&first_reports, &second_reports] {
            assert!(reports.iter().all(|r| r.action == reports[0].action));
        }
        assert!(
            !(first_reports[0].action == TransactionAction::Commit
                && second_reports[0].action == TransactionAction::Commit),
            "both transfers of 60 out of 100 committed"
        );

        let reference = cluster.nodes()[0].balances();
        assert!(reference.values().all(|b| *b >= 0));
        let mut rng = rand::thread_rng();
        for node in cluster.nodes() {
            assert_eq!(node.balances(), reference);
            let mut log = node.transactions();
            log.shuffle(&mut rng);
            assert_eq!(fold_balances("x", &log), reference);
        }
        cluster.shutdown();
    }
}
