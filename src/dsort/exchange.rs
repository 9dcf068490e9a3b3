//! Meta-Sort Exchange
//!
//! After extraction every node publishes the index of records it holds. A per-operation
//! barrier collects one arrival per node (or a withdrawal), enforcing a deadline. Once
//! everyone is in, the global `ShardAssignment` is computed and every node receives its
//! own `NodePlan` through a `watch` channel.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use super::types::{AlgorithmKind, ParsedSpec, SortAlgorithm};
use crate::error::{Result, SortError};
use crate::membership::types::NodeId;

/// Location of one record: which node holds it and how big it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordMeta {
    pub key: String,
    pub node: NodeId,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputShard {
    pub index: usize,
    /// Object name, extension included.
    pub name: String,
    pub builder: NodeId,
    pub records: Vec<RecordMeta>,
    /// Sum of the record sizes.
    pub size: u64,
}

/// What a single node has to do once the barrier is passed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodePlan {
    pub build: Vec<OutputShard>,
    /// Keys of local records to ship, per destination node.
    pub send: BTreeMap<NodeId, Vec<String>>,
    /// Number of records to wait for, per source node.
    pub expect: BTreeMap<NodeId, usize>,
}

/// The global output layout of one sort operation.
#[derive(Debug, Clone, Default)]
pub struct ShardAssignment {
    pub shards: Vec<OutputShard>,
}

impl ShardAssignment {
    /// Orders `records` and packs them greedily into shards of at most `shard_size` bytes.
    ///
    /// A shard only goes over the target when a single record is larger than the target.
    /// Fails when the output template runs out of names.
    pub fn compute(records: Vec<RecordMeta>, parsed: &ParsedSpec) -> Result<Self> {
        let records = order_records(records, &parsed.spec.algorithm);
        let target = parsed.shard_size;
        let mut names = parsed.output.iter();

        let mut shards = Vec::new();
        let mut current: Vec<RecordMeta> = Vec::new();
        let mut size = 0u64;

        let mut close = |current: Vec<RecordMeta>, size: u64| -> Result<()> {
            let index = shards.len();
            let name = names.next().ok_or_else(|| {
                SortError::invalid_spec(format!(
                    "output_format '{}' has only {} names, more output shards are needed",
                    parsed.output.source(),
                    parsed.output.count()
                ))
            })?;
            shards.push(OutputShard {
                index,
                name: format!("{}{}", name, parsed.extension()),
                builder: pick_builder(&current),
                records: current,
                size,
            });
            Ok(())
        };

        for record in records {
            if !current.is_empty() && size + record.size > target {
                close(std::mem::take(&mut current), size)?;
                size = 0;
            }
            size += record.size;
            current.push(record);
        }
        if !current.is_empty() {
            close(current, size)?;
        }

        Ok(Self { shards })
    }

    pub fn record_count(&self) -> usize {
        self.shards.iter().map(|shard| shard.records.len()).sum()
    }

    /// Splits the assignment into one plan per node. Every node in `nodes` gets a plan,
    /// possibly empty.
    pub fn node_plans(&self, nodes: &[NodeId]) -> HashMap<NodeId, NodePlan> {
        let mut plans: HashMap<NodeId, NodePlan> = nodes
            .iter()
            .map(|node| (node.clone(), NodePlan::default()))
            .collect();

        for shard in &self.shards {
            for record in &shard.records {
                if record.node == shard.builder {
                    continue;
                }
                plans
                    .entry(record.node.clone())
                    .or_default()
                    .send
                    .entry(shard.builder.clone())
                    .or_default()
                    .push(record.key.clone());
                *plans
                    .entry(shard.builder.clone())
                    .or_default()
                    .expect
                    .entry(record.node.clone())
                    .or_default() += 1;
            }
            plans
                .entry(shard.builder.clone())
                .or_default()
                .build
                .push(shard.clone());
        }

        plans
    }
}

fn order_records(mut records: Vec<RecordMeta>, algorithm: &SortAlgorithm) -> Vec<RecordMeta> {
    match algorithm.kind {
        AlgorithmKind::Alphanumeric => {
            records.sort_by(|a, b| a.key.cmp(&b.key).then_with(|| a.node.cmp(&b.node)));
            if algorithm.decreasing {
                records.reverse();
            }
        }
        AlgorithmKind::Shuffle => {
            // Start from a canonical order so the same seed always gives the same layout
            records.sort_by(|a, b| a.key.cmp(&b.key).then_with(|| a.node.cmp(&b.node)));
            let seed = algorithm.seed.unwrap_or_else(rand::random);
            let mut rng = StdRng::seed_from_u64(seed);
            records.shuffle(&mut rng);
        }
        AlgorithmKind::None => {
            if algorithm.decreasing {
                records.reverse();
            }
        }
    }
    records
}

/// The node contributing most bytes builds the shard; ties go to the lowest node id.
fn pick_builder(records: &[RecordMeta]) -> NodeId {
    let mut bytes: BTreeMap<&NodeId, u64> = BTreeMap::new();
    for record in records {
        *bytes.entry(&record.node).or_default() += record.size;
    }

    let mut best: Option<(&NodeId, u64)> = None;
    for (node, total) in bytes {
        match best {
            Some((_, best_total)) if total <= best_total => {}
            _ => best = Some((node, total)),
        }
    }
    best.map(|(node, _)| node.clone())
        .unwrap_or_else(|| NodeId::from(""))
}

enum Arrival {
    Published {
        node: NodeId,
        records: Vec<RecordMeta>,
    },
    Withdrawn {
        node: NodeId,
    },
}

#[derive(Debug, Clone)]
pub enum ExchangeOutcome {
    Pending,
    Ready(Arc<HashMap<NodeId, NodePlan>>),
    Failed(String),
}

/// Node-facing side of the exchange.
pub struct MetaSortExchange {
    arrivals: mpsc::UnboundedSender<Arrival>,
    outcome: watch::Receiver<ExchangeOutcome>,
}

/// Coordinator-facing side of the exchange.
pub struct Barrier {
    expected: BTreeSet<NodeId>,
    arrivals: mpsc::UnboundedReceiver<Arrival>,
    outcome: watch::Sender<ExchangeOutcome>,
}

pub fn channel(expected: &[NodeId]) -> (Arc<MetaSortExchange>, Barrier) {
    let (arrivals_tx, arrivals_rx) = mpsc::unbounded_channel();
    let (outcome_tx, outcome_rx) = watch::channel(ExchangeOutcome::Pending);

    (
        Arc::new(MetaSortExchange {
            arrivals: arrivals_tx,
            outcome: outcome_rx,
        }),
        Barrier {
            expected: expected.iter().cloned().collect(),
            arrivals: arrivals_rx,
            outcome: outcome_tx,
        },
    )
}

impl MetaSortExchange {
    pub fn publish(&self, node: &NodeId, records: Vec<RecordMeta>) -> Result<()> {
        self.arrivals
            .send(Arrival::Published {
                node: node.clone(),
                records,
            })
            .map_err(|_| SortError::transfer("meta-sort exchange is closed"))
    }

    /// Leaves the barrier without contributing records.
    pub fn withdraw(&self, node: &NodeId) {
        let _ = self.arrivals.send(Arrival::Withdrawn { node: node.clone() });
    }

    /// Waits until the coordinator broadcasts the plans, or the operation is cancelled.
    pub async fn wait_plan(&self, node: &NodeId, cancel: &CancellationToken) -> Result<NodePlan> {
        let mut outcome = self.outcome.clone();

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SortError::Aborted),
            settled = outcome.wait_for(|o| !matches!(o, ExchangeOutcome::Pending)) => {
                settled
                    .map(|o| o.clone())
                    .map_err(|_| SortError::transfer("meta-sort exchange is closed"))?
            }
        };

        match outcome {
            ExchangeOutcome::Ready(plans) => Ok(plans.get(node).cloned().unwrap_or_default()),
            ExchangeOutcome::Failed(reason) => Err(SortError::transfer(reason)),
            ExchangeOutcome::Pending => Err(SortError::transfer("meta-sort exchange is closed")),
        }
    }
}

async fn recv_until(
    arrivals: &mut mpsc::UnboundedReceiver<Arrival>,
    deadline: Option<tokio::time::Instant>,
) -> std::result::Result<Option<Arrival>, tokio::time::error::Elapsed> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, arrivals.recv()).await,
        None => Ok(arrivals.recv().await),
    }
}

impl Barrier {
    /// Collects one arrival per expected node and returns all published records,
    /// grouped by node in id order.
    ///
    /// `timeout` is counted from the first arrival: extraction may take as long as it
    /// needs, but once one node is in, the stragglers have `timeout` to follow.
    pub async fn wait(
        &mut self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Vec<RecordMeta>> {
        let mut deadline: Option<tokio::time::Instant> = None;
        let mut pending = self.expected.clone();
        let mut published: BTreeMap<NodeId, Vec<RecordMeta>> = BTreeMap::new();

        while !pending.is_empty() {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SortError::Aborted),
                next = recv_until(&mut self.arrivals, deadline) => next,
            };
            let arrival = match next {
                Ok(Some(arrival)) => arrival,
                Ok(None) => return Err(SortError::transfer("every node left the exchange")),
                Err(_) => {
                    return Err(SortError::NodeTimeout {
                        timeout,
                        missing: pending.into_iter().collect(),
                    });
                }
            };
            if deadline.is_none() {
                deadline = Some(tokio::time::Instant::now() + timeout);
            }

            match arrival {
                Arrival::Published { node, records } => {
                    if pending.remove(&node) {
                        tracing::debug!("Node {} published {} records", node, records.len());
                        published.insert(node, records);
                    } else {
                        tracing::warn!("Ignoring unexpected publication from {}", node);
                    }
                }
                Arrival::Withdrawn { node } => {
                    if pending.remove(&node) {
                        tracing::warn!("Node {} withdrew from the exchange", node);
                    }
                }
            }
        }

        Ok(published.into_values().flatten().collect())
    }

    pub fn broadcast(&self, plans: HashMap<NodeId, NodePlan>) {
        self.outcome
            .send_replace(ExchangeOutcome::Ready(Arc::new(plans)));
    }

    pub fn fail(&self, reason: impl Into<String>) {
        self.outcome
            .send_replace(ExchangeOutcome::Failed(reason.into()));
    }
}
