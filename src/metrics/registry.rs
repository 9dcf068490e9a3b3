use dashmap::DashMap;
use std::sync::Arc;

use super::types::{MetricsRecord, Phase, SortMetrics};
use crate::dsort::types::SortUuid;
use crate::membership::types::NodeId;

/// Per-node slots of one sort operation.
pub struct OperationMetrics {
    nodes: DashMap<NodeId, MetricsRecord>,
}

impl OperationMetrics {
    fn new(nodes: &[NodeId]) -> Self {
        let map = DashMap::new();
        for node in nodes {
            map.insert(node.clone(), MetricsRecord::default());
        }
        Self { nodes: map }
    }

    /// Runs `f` against one node's slot, holding only that slot's shard lock.
    pub fn update<R>(&self, node: &NodeId, f: impl FnOnce(&mut MetricsRecord) -> R) -> Option<R> {
        self.nodes.get_mut(node).map(|mut record| f(&mut record))
    }

    pub fn snapshot(&self) -> SortMetrics {
        SortMetrics(
            self.nodes
                .iter()
                .map(|entry| (entry.key().to_string(), entry.value().clone()))
                .collect(),
        )
    }

    /// Marks every slot aborted at once, so the first poll after an abort already sees it
    /// on every node.
    pub fn abort_all(&self) {
        for mut record in self.nodes.iter_mut() {
            record.abort();
        }
    }
}

/// Write handle for a single node's slot. The owning node agent is the only holder;
/// apart from it only `OperationMetrics::abort_all` touches the slot.
#[derive(Clone)]
pub struct NodeMetrics {
    operation: Arc<OperationMetrics>,
    node: NodeId,
}

impl NodeMetrics {
    pub fn new(operation: Arc<OperationMetrics>, node: NodeId) -> Self {
        Self { operation, node }
    }

    pub fn begin(&self, phase: Phase) -> bool {
        self.operation
            .update(&self.node, |record| record.begin(phase))
            .unwrap_or(false)
    }

    pub fn finish(&self, phase: Phase) -> bool {
        self.operation
            .update(&self.node, |record| record.finish(phase))
            .unwrap_or(false)
    }

    pub fn add(&self, phase: Phase, shards: u64, records: u64, bytes: u64) {
        self.operation
            .update(&self.node, |record| record.add(phase, shards, records, bytes));
    }

    pub fn abort(&self) {
        self.operation.update(&self.node, MetricsRecord::abort);
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        self.operation
            .update(&self.node, |record| record.errors.push(message));
    }

    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        self.operation
            .update(&self.node, |record| record.warnings.push(message));
    }
}

/// Process-wide metrics of every known sort operation.
pub struct MetricsRegistry {
    operations: DashMap<SortUuid, Arc<OperationMetrics>>,
}

impl MetricsRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            operations: DashMap::new(),
        })
    }

    /// Creates a slot for every node, all phases unfinished.
    pub fn register(&self, uuid: &SortUuid, nodes: &[NodeId]) -> Arc<OperationMetrics> {
        let operation = Arc::new(OperationMetrics::new(nodes));
        self.operations.insert(uuid.clone(), operation.clone());
        tracing::debug!("Registered metrics for {} on {} nodes", uuid, nodes.len());
        operation
    }

    pub fn get(&self, uuid: &SortUuid) -> Option<Arc<OperationMetrics>> {
        self.operations.get(uuid).map(|entry| entry.value().clone())
    }

    pub fn snapshot(&self, uuid: &SortUuid) -> Option<SortMetrics> {
        // Clone the Arc first so the outer shard lock is released before walking the nodes
        self.get(uuid).map(|operation| operation.snapshot())
    }

    pub fn remove(&self, uuid: &SortUuid) -> bool {
        self.operations.remove(uuid).is_some()
    }
}
