use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::types::{Node, NodeId, NodeState};

/// Versioned view of the storage targets known to this proxy.
///
/// Every membership change bumps `version`; sort plans record the version they
/// were computed against.
pub struct ClusterMap {
    pub members: Arc<DashMap<NodeId, Node>>,
    version: AtomicU64,
}

impl ClusterMap {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            members: Arc::new(DashMap::new()),
            version: AtomicU64::new(0),
        })
    }

    /// Builds a map with `count` alive targets named `t0`, `t1`, ...
    pub fn with_targets(count: usize) -> Arc<Self> {
        let map = Self::new();
        for index in 0..count {
            map.join(NodeId::target(index));
        }
        map
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Adds a node, or brings a dead one back to life.
    pub fn join(&self, id: NodeId) {
        match self.members.get_mut(&id) {
            Some(mut existing) => {
                if existing.state == NodeState::Alive {
                    return;
                }
                existing.state = NodeState::Alive;
                existing.incarnation += 1;
                tracing::info!("Node {} rejoined (inc={})", id, existing.incarnation);
            }
            None => {
                tracing::info!("Node {} joined cluster", id);
                self.members.insert(id.clone(), Node::alive(id));
            }
        }
        self.version.fetch_add(1, Ordering::SeqCst);
    }

    /// Returns `false` if the node is unknown or already dead.
    pub fn mark_dead(&self, id: &NodeId) -> bool {
        let Some(mut member) = self.members.get_mut(id) else {
            tracing::debug!("Cannot mark unknown node {} dead", id);
            return false;
        };
        if member.state == NodeState::Dead {
            return false;
        }

        member.state = NodeState::Dead;
        member.incarnation += 1;
        drop(member);

        self.version.fetch_add(1, Ordering::SeqCst);
        tracing::warn!(
            "Node {} declared DEAD, {} alive nodes left",
            id,
            self.get_alive_members().len()
        );
        true
    }

    /// Alive members sorted by id, so every caller sees the same order.
    pub fn get_alive_members(&self) -> Vec<Node> {
        let mut alive: Vec<Node> = self
            .members
            .iter()
            .filter(|entry| entry.value().state == NodeState::Alive)
            .map(|entry| entry.value().clone())
            .collect();
        alive.sort_by(|a, b| a.id.cmp(&b.id));
        alive
    }
}
