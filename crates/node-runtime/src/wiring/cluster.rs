//! In-process clusters.

use crate::adapters::InMemoryNetwork;
use crate::container::{Node, NodeConfig, NodeHandle};
use crate::error::RuntimeError;
use crate::registry::InMemoryRegistrar;
use crate::wiring::ClientGateway;
use shared_types::{ProcessId, ShardId};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const BASE_PORT: u16 = 7000;

/// Nodes of several shards sharing one [`InMemoryNetwork`], a registration
/// hub and a [`ClientGateway`].
pub struct InMemoryCluster {
    template: NodeConfig,
    network: Arc<InMemoryNetwork>,
    registrar: InMemoryRegistrar,
    gateway: Arc<ClientGateway>,
    nodes: Vec<NodeHandle>,
}

impl InMemoryCluster {
    /// Empty cluster; every node starts from `template`.
    pub fn new(template: NodeConfig) -> Self {
        let network = Arc::new(InMemoryNetwork::new());
        let gateway = ClientGateway::new(network.clone());
        Self {
            template,
            network,
            registrar: InMemoryRegistrar::new(),
            gateway,
            nodes: Vec::new(),
        }
    }

    /// Start `count` nodes for every shard in `shards`, shard by shard.
    pub fn with_shards(
        template: NodeConfig,
        shards: &[(&str, u32)],
    ) -> Result<Self, RuntimeError> {
        let mut cluster = Self::new(template);
        for (shard, count) in shards {
            for index in 1..=*count {
                cluster.spawn_node(shard, index)?;
            }
        }
        Ok(cluster)
    }

    /// Start one node and connect it to the network and the gateway.
    pub fn spawn_node(&mut self, shard: &str, index: u32) -> Result<&NodeHandle, RuntimeError> {
        let mut config = self.template.clone();
        config.node.alias = shard.to_string();
        config.node.index = index;
        config.node.host = "mem".to_string();
        config.node.port = BASE_PORT + self.nodes.len() as u16 + 1;
        config.peers.clear();

        let node = Node::start(&config, &self.registrar, self.network.clone())?;
        self.network.attach(node.link().clone());
        self.gateway.add_process(node.process().clone());
        if let Some(outcomes) = node.outcomes() {
            self.gateway.attach(outcomes);
        }
        info!("[cluster] {} joined", node.process());
        self.nodes.push(node);
        Ok(&self.nodes[self.nodes.len() - 1])
    }

    /// Every started node in start order.
    pub fn nodes(&self) -> &[NodeHandle] {
        &self.nodes
    }

    /// Started nodes of `shard`.
    pub fn shard(&self, shard: &str) -> Vec<&NodeHandle> {
        self.nodes
            .iter()
            .filter(|n| n.process().owner == shard)
            .collect()
    }

    /// Node of `shard` with `index`.
    pub fn node(&self, shard: &str, index: u32) -> Option<&NodeHandle> {
        self.nodes
            .iter()
            .find(|n| n.process().owner == shard && n.process().index == index)
    }

    /// Live nodes of `shard`.
    pub fn alive(&self, shard: &str) -> Vec<&NodeHandle> {
        self.shard(shard)
            .into_iter()
            .filter(|n| !self.network.is_crashed(n.process()))
            .collect()
    }

    /// The network connecting the nodes.
    pub fn network(&self) -> &Arc<InMemoryNetwork> {
        &self.network
    }

    /// Client gateway.
    pub fn gateway(&self) -> &Arc<ClientGateway> {
        &self.gateway
    }

    /// Crash `process`.
    pub fn crash(&self, process: &ProcessId) {
        self.network.crash(process);
    }

    /// Wait until every live node trusts the highest-ranked live node of
    /// its shard. Returns `false` on timeout.
    pub async fn await_stable_leaders(&self, wait: Duration) -> bool {
        tokio::time::timeout(wait, async {
            while !self.leaders_stable() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .is_ok()
    }

    fn leaders_stable(&self) -> bool {
        let mut expected: BTreeMap<ShardId, ProcessId> = BTreeMap::new();
        for node in &self.nodes {
            if self.network.is_crashed(node.process()) {
                continue;
            }
            let entry = expected
                .entry(node.process().owner.clone())
                .or_insert_with(|| node.process().clone());
            if node.process().rank > entry.rank {
                *entry = node.process().clone();
            }
        }
        self.nodes
            .iter()
            .filter(|n| !self.network.is_crashed(n.process()))
            .all(|n| {
                let shard_size = self.shard(&n.process().owner).len();
                n.leader().as_ref() == expected.get(&n.process().owner)
                    && n.membership().local_shard_nodes().len() == shard_size
            })
    }

    /// Stop every node.
    pub fn shutdown(&self) {
        for node in &self.nodes {
            node.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_later_joins_take_leadership() {
        let mut template = NodeConfig::default();
        template.detector.initial_delay_ms = 20;
        template.detector.delay_increment_ms = 20;
        let mut cluster = InMemoryCluster::new(template);
        cluster.spawn_node("x", 1).unwrap();
        cluster.spawn_node("x", 2).unwrap();
        cluster.spawn_node("y", 1).unwrap();

        assert!(cluster.await_stable_leaders(Duration::from_secs(5)).await);
        let leader = cluster.node("x", 2).unwrap().process().clone();
        assert_eq!(cluster.node("x", 1).unwrap().leader(), Some(leader));
        assert_eq!(cluster.shard("x").len(), 2);
        assert_eq!(cluster.alive("y").len(), 1);
        cluster.shutdown();
    }
}
