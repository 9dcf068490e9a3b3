//! Cluster Membership Module
//!
//! Keeps the set of storage targets (nodes) that sort operations are planned over.
//!
//! ## Core Concepts
//! - **Cluster Map**: a versioned map of members; every join or death bumps the version.
//! - **Deterministic Order**: alive members are always listed sorted by id, so plans computed
//!   against the same membership are identical.
//! - **Incarnation Numbers**: each member carries a counter that grows with every state change.

pub mod service;
pub mod types;
