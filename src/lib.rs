//! Distributed Sort Cluster Library
//!
//! A sort service for a clustered object store: tar shards of records stored in a bucket
//! are re-sharded into ordered output shards, with every storage target taking part.
//! The binary (`main.rs`) hosts the targets in one process behind a JSON HTTP API.
//!
//! ## Architecture Modules
//! - **`dsort`**: the orchestrator. Coordinator, per-node agents, meta-sort exchange and
//!   shard building.
//! - **`metrics`**: per-operation, per-node progress records polled by clients.
//! - **`membership`**: the cluster map of storage targets sorts are planned over.
//! - **`storage`**: the object store contract with on-disk and in-memory backends.
//! - **`client`**: typed HTTP client used by the CLI and end-to-end tests.
//! - **`server`**: the axum router tying it together.
//! - **`config`** / **`error`**: runtime knobs and the shared error types.

pub mod client;
pub mod config;
pub mod dsort;
pub mod error;
pub mod membership;
pub mod metrics;
pub mod server;
pub mod storage;
