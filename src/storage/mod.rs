//! Object Storage Module
//!
//! The sort service reads input shards from, and writes output shards to, a
//! name-addressable blob store. This module defines that contract and ships two backends.
//!
//! ## Core Concepts
//! - **Buckets**: flat namespaces of objects; must exist before objects are written.
//! - **Atomic Puts**: an object becomes visible only once its full content is stored, so
//!   readers never observe a truncated shard.
//! - **Backends**: `LocalObjectStore` keeps objects on disk, `MemoryObjectStore` keeps them in
//!   a nested `DashMap` (used by tests and throwaway clusters).
//!
//! ## Submodules
//! - **`store`**: the `ObjectStore` trait and name validation.
//! - **`local`** / **`memory`**: the backends.
//! - **`handlers`** / **`protocol`**: thin HTTP surface for bucket and object access.

pub mod handlers;
pub mod local;
pub mod memory;
pub mod protocol;
pub mod store;

#[cfg(test)]
mod tests;
