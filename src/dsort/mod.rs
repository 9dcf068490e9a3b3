//! Distributed Sort Module
//!
//! Re-shards the records of many input tar shards into a new, ordered set of output
//! shards, with every alive storage target (node) taking part.
//!
//! ## Flow
//! 1. **Start**: `SortCoordinator::start_sort` validates the `SortSpec`, expands the input
//!    template and hands each node a contiguous block of input shards.
//! 2. **Extraction**: each `NodeAgent` reads its shards and indexes their records.
//! 3. **Meta-sorting**: agents publish their index to the exchange; once the barrier has
//!    heard from every node the coordinator computes the global `ShardAssignment`.
//! 4. **Shard creation**: nodes exchange records and write their output shards, each one
//!    published by a single atomic put.
//!
//! Progress is recorded per node in the metrics registry and is the only way clients
//! observe an operation. Abort is cooperative: agents check for it between records.
//!
//! ## Submodules
//! - **`coordinator`**: the public operations (start, abort, metrics, list, remove).
//! - **`agent`**: the per-node state machine.
//! - **`exchange`**: barrier and shard assignment.
//! - **`extract`** / **`builder`** / **`archive`**: reading inputs, shipping records, writing outputs.
//! - **`template`**: brace-range name templates.
//! - **`job`**: operation lifecycle shared by the coordinator and agents.
//! - **`handlers`** / **`protocol`**: the HTTP API.

pub mod agent;
pub mod archive;
pub mod builder;
pub mod coordinator;
pub mod exchange;
pub mod extract;
pub mod handlers;
pub mod job;
pub mod protocol;
pub mod template;
pub mod types;
