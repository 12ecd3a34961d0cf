//! # Client Wiring
//!
//! Connects clients to running nodes.
//!
//! ```text
//!  client ──submit(tx)──► ClientGateway ──SbacPrepare──► every node of shard_out and shard_in
//!                              ▲
//!                              └──AllPrepared── outcome streams of the attached nodes
//! ```
//!
//! [`InMemoryCluster`] assembles whole clusters inside one tokio runtime on
//! top of [`crate::adapters::InMemoryNetwork`].

pub mod client_gateway;
pub mod cluster;

pub use client_gateway::ClientGateway;
pub use cluster::InMemoryCluster;
