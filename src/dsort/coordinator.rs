use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::Instrument;

use super::agent::{NodeAgent, plan_input_shards};
use super::builder::TransferHub;
use super::exchange::{self, Barrier, ShardAssignment};
use super::job::{JobControl, OperationContext};
use super::types::{ParsedSpec, SortJobInfo, SortSpec, SortState, SortUuid};
use crate::config::SortConfig;
use crate::error::{Result, SortError};
use crate::membership::service::ClusterMap;
use crate::membership::types::NodeId;
use crate::metrics::registry::{MetricsRegistry, NodeMetrics, OperationMetrics};
use crate::metrics::types::SortMetrics;
use crate::storage::store::ObjectStore;

struct SortJob {
    ctx: Arc<OperationContext>,
    metrics: Arc<OperationMetrics>,
    nodes: Vec<NodeId>,
    created_at: DateTime<Utc>,
}

impl SortJob {
    fn info(&self) -> SortJobInfo {
        SortJobInfo {
            uuid: self.ctx.uuid.clone(),
            state: self.ctx.control.state(),
            description: self.ctx.parsed.spec.description.clone(),
            bucket: self.ctx.parsed.input_bucket().to_string(),
            output_bucket: self.ctx.parsed.output_bucket().to_string(),
            nodes: self.nodes.len(),
            created_at: self.created_at,
            ended_at: self.ctx.control.ended_at(),
        }
    }
}

/// Cluster-wide entry point of the sort service.
///
/// Validates specs, plans input shards over the alive nodes, spawns one agent per node,
/// owns the meta-sort barrier and answers abort and metrics requests.
pub struct SortCoordinator {
    cluster: Arc<ClusterMap>,
    store: Arc<dyn ObjectStore>,
    metrics: Arc<MetricsRegistry>,
    jobs: DashMap<SortUuid, Arc<SortJob>>,
    config: SortConfig,
}

impl SortCoordinator {
    pub fn new(cluster: Arc<ClusterMap>, store: Arc<dyn ObjectStore>, config: SortConfig) -> Arc<Self> {
        Arc::new(Self {
            cluster,
            store,
            metrics: MetricsRegistry::new(),
            jobs: DashMap::new(),
            config,
        })
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Validates `spec` and starts the operation in the background.
    ///
    /// On return every node already has a metrics slot with no phase finished.
    pub async fn start_sort(&self, spec: SortSpec) -> Result<SortUuid> {
        let parsed = ParsedSpec::parse(spec, &self.config)?;

        for bucket in [parsed.input_bucket(), parsed.output_bucket()] {
            if !self.store.bucket_exists(bucket).await? {
                return Err(SortError::invalid_spec(format!(
                    "bucket '{}' does not exist",
                    bucket
                )));
            }
        }

        let nodes: Vec<NodeId> = self
            .cluster
            .get_alive_members()
            .into_iter()
            .map(|node| node.id)
            .collect();
        if nodes.is_empty() {
            return Err(SortError::NoTargets);
        }

        let blocks = plan_input_shards(parsed.input.iter(), nodes.len());
        let input_count: usize = blocks.iter().map(Vec::len).sum();

        let uuid = SortUuid::new();
        let operation = self.metrics.register(&uuid, &nodes);
        let control = JobControl::new(nodes.len());
        let (exchange, barrier) = exchange::channel(&nodes);
        let (hub, mut inboxes) = TransferHub::new(&nodes, self.config.transfer_buffer);

        let ctx = Arc::new(OperationContext {
            uuid: uuid.clone(),
            parsed,
            store: self.store.clone(),
            exchange,
            hub,
            control,
            config: self.config.clone(),
        });

        self.jobs.insert(
            uuid.clone(),
            Arc::new(SortJob {
                ctx: ctx.clone(),
                metrics: operation.clone(),
                nodes: nodes.clone(),
                created_at: Utc::now(),
            }),
        );

        tokio::spawn(
            coordinate(barrier, ctx.clone(), nodes.clone())
                .instrument(tracing::info_span!("barrier", sort = %uuid)),
        );

        for (node, shards) in nodes.iter().zip(blocks) {
            let Some(inbox) = inboxes.remove(node) else {
                continue;
            };
            let agent = NodeAgent::new(
                node.clone(),
                shards,
                ctx.clone(),
                NodeMetrics::new(operation.clone(), node.clone()),
            );
            tokio::spawn(
                agent
                    .run(inbox)
                    .instrument(tracing::info_span!("node_agent", sort = %uuid, node = %node)),
            );
        }

        tracing::info!(
            "Started sort {} over {} nodes ({} input shards, cluster map v{})",
            uuid,
            nodes.len(),
            input_count,
            self.cluster.version()
        );
        Ok(uuid)
    }

    /// Requests an abort and returns immediately. A no-op once the operation has ended.
    pub fn abort_sort(&self, uuid: &SortUuid) -> Result<()> {
        let job = self.job(uuid)?;
        if job.ctx.control.abort() {
            // Agents stamp their own slots when they notice the cancel; this makes it visible now
            job.metrics.abort_all();
            tracing::info!("Abort requested for sort {}", uuid);
        } else {
            tracing::debug!(
                "Sort {} already ended ({:?}), abort ignored",
                uuid,
                job.ctx.control.state()
            );
        }
        Ok(())
    }

    pub fn get_sort_metrics(&self, uuid: &SortUuid) -> Result<SortMetrics> {
        self.metrics
            .snapshot(uuid)
            .ok_or_else(|| SortError::not_found(uuid))
    }

    pub fn get_sort(&self, uuid: &SortUuid) -> Result<SortJobInfo> {
        Ok(self.job(uuid)?.info())
    }

    pub fn sort_state(&self, uuid: &SortUuid) -> Result<SortState> {
        Ok(self.job(uuid)?.ctx.control.state())
    }

    /// All known operations, oldest first.
    pub fn list_sorts(&self) -> Vec<SortJobInfo> {
        let mut infos: Vec<SortJobInfo> = self.jobs.iter().map(|entry| entry.value().info()).collect();
        infos.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.uuid.cmp(&b.uuid)));
        infos
    }

    /// Forgets an ended operation and its metrics.
    pub fn remove_sort(&self, uuid: &SortUuid) -> Result<()> {
        let job = self.job(uuid)?;
        if !job.ctx.control.state().is_terminal() {
            return Err(SortError::StillRunning {
                uuid: uuid.to_string(),
            });
        }
        self.jobs.remove(uuid);
        self.metrics.remove(uuid);
        tracing::info!("Removed sort {}", uuid);
        Ok(())
    }

    fn job(&self, uuid: &SortUuid) -> Result<Arc<SortJob>> {
        self.jobs
            .get(uuid)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| SortError::not_found(uuid))
    }
}

/// Runs the meta-sort barrier of one operation and broadcasts the outcome.
async fn coordinate(mut barrier: Barrier, ctx: Arc<OperationContext>, nodes: Vec<NodeId>) {
    let records = match barrier
        .wait(ctx.config.barrier_timeout, &ctx.control.cancel)
        .await
    {
        Ok(records) => records,
        Err(SortError::Aborted) => {
            barrier.fail("operation aborted");
            return;
        }
        Err(e) => {
            tracing::error!("Meta-sort barrier failed: {}", e);
            ctx.control.fail(e.to_string());
            barrier.fail(e.to_string());
            return;
        }
    };

    match ShardAssignment::compute(records, &ctx.parsed) {
        Ok(assignment) => {
            tracing::info!(
                "Assigned {} records to {} output shards",
                assignment.record_count(),
                assignment.shards.len()
            );
            barrier.broadcast(assignment.node_plans(&nodes));
        }
        Err(e) => {
            tracing::error!("Shard assignment failed: {}", e);
            ctx.control.fail(e.to_string());
            barrier.fail(e.to_string());
        }
    }
}
