//! Sort Metrics Module
//!
//! Per-operation, per-node progress of every sort job, readable at any time by polling clients.
//!
//! ## Layout
//! `MetricsRegistry` maps a sort UUID to an `OperationMetrics`, which in turn maps each node
//! to its `MetricsRecord`. Both levels are `DashMap`s, so a node agent updating its own slot
//! never blocks a reader looking at another node or another operation.
//!
//! ## Ownership
//! Each node agent receives a `NodeMetrics` handle bound to its own slot and is the only
//! writer of that slot. Clients only ever see cloned snapshots.
//!
//! ## Invariants
//! - `aborted` is monotonic.
//! - A phase can only start or finish after the previous phase finished; once a record is
//!   aborted no phase changes anymore.

pub mod registry;
pub mod types;

#[cfg(test)]
mod tests;
