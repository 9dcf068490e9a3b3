use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a storage target taking part in sort operations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub String);

impl NodeId {
    /// Conventional id of the `index`-th target hosted by a process.
    pub fn target(index: usize) -> Self {
        Self(format!("t{}", index))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeState {
    Alive,
    Dead,
}

/// A single member of the cluster map.
///
/// `incarnation` grows every time the member changes state, so two views of the
/// same node can always be ordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub state: NodeState,
    pub incarnation: u64,
}

impl Node {
    pub fn alive(id: NodeId) -> Self {
        Self {
            id,
            state: NodeState::Alive,
            incarnation: 1,
        }
    }
}
