//! Node Agent
//!
//! One agent per node and operation drives that node through
//! `Idle -> Extracting -> MetaSorting -> ShardBuilding -> Done`, with `Aborted` reachable
//! from every state before `Done`. The agent is the only writer of its node's metrics, except
//! for a user abort, which the coordinator stamps on every slot at once.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use super::builder::{Inbox, ShardBuilder};
use super::exchange::NodePlan;
use super::extract::{Extractor, LocalRecords};
use super::job::OperationContext;
use crate::config::FailurePolicy;
use crate::error::{Result, SortError};
use crate::membership::types::NodeId;
use crate::metrics::registry::NodeMetrics;
use crate::metrics::types::Phase;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Idle,
    Extracting,
    MetaSorting,
    ShardBuilding,
    Done,
    Aborted,
}

impl AgentState {
    pub fn can_transition(self, next: AgentState) -> bool {
        use AgentState::*;
        matches!(
            (self, next),
            (Idle, Extracting)
                | (Extracting, MetaSorting)
                | (MetaSorting, ShardBuilding)
                | (ShardBuilding, Done)
                | (Idle | Extracting | MetaSorting | ShardBuilding, Aborted)
        )
    }

    /// Metrics phase tracked while in this state.
    pub fn phase(self) -> Option<Phase> {
        match self {
            AgentState::Extracting => Some(Phase::LocalExtraction),
            AgentState::MetaSorting => Some(Phase::MetaSorting),
            AgentState::ShardBuilding => Some(Phase::ShardCreation),
            _ => None,
        }
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

pub struct NodeAgent {
    node: NodeId,
    state: AgentState,
    input_shards: Vec<String>,
    ctx: Arc<OperationContext>,
    metrics: NodeMetrics,
    published: bool,
    plan: Option<NodePlan>,
}

impl NodeAgent {
    pub fn new(
        node: NodeId,
        input_shards: Vec<String>,
        ctx: Arc<OperationContext>,
        metrics: NodeMetrics,
    ) -> Self {
        Self {
            node,
            state: AgentState::Idle,
            input_shards,
            ctx,
            metrics,
            published: false,
            plan: None,
        }
    }

    /// Runs the node to completion. Never fails: errors end up in the node's metrics.
    pub async fn run(mut self, mut inbox: Inbox) {
        tracing::info!("Agent started with {} input shards", self.input_shards.len());

        let outcome = self.drive(&mut inbox).await;
        match outcome {
            Ok(()) => {
                // Let peers see a closed inbox instead of a silent one
                drop(inbox);
                tracing::info!("Node finished all phases");
                self.ctx.control.node_settled(false);
                self.linger().await;
            }
            Err(SortError::Aborted) => self.abort(),
            Err(_) if self.ctx.control.cancel.is_cancelled() => self.abort(),
            Err(e) => {
                drop(inbox);
                self.fail(e).await;
            }
        }
    }

    async fn drive(&mut self, inbox: &mut Inbox) -> Result<()> {
        let ctx = self.ctx.clone();

        self.enter(AgentState::Extracting)?;
        let local = Extractor {
            node: &self.node,
            store: ctx.store.as_ref(),
            bucket: ctx.parsed.input_bucket(),
            extension: ctx.parsed.extension(),
            missing: ctx.config.missing_shards,
            cancel: &ctx.control.cancel,
            metrics: &self.metrics,
        }
        .run(&self.input_shards)
        .await?;
        self.leave();

        self.enter(AgentState::MetaSorting)?;
        let plan = self.meta_sort(&local).await?;
        self.leave();

        self.enter(AgentState::ShardBuilding)?;
        ShardBuilder {
            node: &self.node,
            store: ctx.store.as_ref(),
            bucket: ctx.parsed.output_bucket(),
            hub: ctx.hub.as_ref(),
            cancel: &ctx.control.cancel,
            transfer_timeout: ctx.config.transfer_timeout,
            metrics: &self.metrics,
        }
        .run(&plan, &local.data, inbox)
        .await?;
        self.leave();

        self.transition(AgentState::Done)
    }

    async fn meta_sort(&mut self, local: &LocalRecords) -> Result<NodePlan> {
        self.metrics
            .add(Phase::MetaSorting, 0, local.index.len() as u64, local.bytes());
        self.ctx.exchange.publish(&self.node, local.index.clone())?;
        self.published = true;

        let plan = self
            .ctx
            .exchange
            .wait_plan(&self.node, &self.ctx.control.cancel)
            .await?;
        tracing::debug!(
            "Plan received: build {} shards, send to {} peers, expect from {} peers",
            plan.build.len(),
            plan.send.len(),
            plan.expect.len()
        );
        self.plan = Some(plan.clone());
        Ok(plan)
    }

    fn transition(&mut self, next: AgentState) -> Result<()> {
        if !self.state.can_transition(next) {
            return Err(SortError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        tracing::debug!("{} -> {}", self.state, next);
        self.state = next;
        Ok(())
    }

    fn enter(&mut self, next: AgentState) -> Result<()> {
        if self.ctx.control.cancel.is_cancelled() {
            return Err(SortError::Aborted);
        }
        self.transition(next)?;
        if let Some(phase) = next.phase() {
            self.metrics.begin(phase);
        }
        Ok(())
    }

    fn leave(&self) {
        if let Some(phase) = self.state.phase() {
            self.metrics.finish(phase);
        }
    }

    fn abort(&mut self) {
        if self.state.can_transition(AgentState::Aborted) {
            self.state = AgentState::Aborted;
        }
        self.metrics.abort();
        tracing::info!("Node aborted");
    }

    async fn fail(&mut self, error: SortError) {
        tracing::error!("Node failed in {}: {}", self.state, error);
        self.metrics.error(error.to_string());

        match self.ctx.config.failure_policy {
            FailurePolicy::AbortCluster => {
                self.abort();
                self.ctx
                    .control
                    .fail(format!("node {} failed: {}", self.node, error));
            }
            FailurePolicy::NodeOnly => {
                if !self.published {
                    self.ctx.exchange.withdraw(&self.node);
                } else if let Some(plan) = &self.plan {
                    for peer in plan.send.keys() {
                        self.ctx
                            .hub
                            .abandon(peer, &self.node, self.ctx.config.transfer_timeout)
                            .await;
                    }
                }
                self.abort();
                self.ctx.control.node_settled(true);
            }
        }
    }

    /// Stays around after `Done` so a late abort still reaches this node's metrics.
    async fn linger(&mut self) {
        let control = self.ctx.control.clone();
        tokio::select! {
            _ = control.cancel.cancelled() => {
                self.metrics.abort();
                tracing::info!("Node aborted after finishing its work");
            }
            _ = control.completed.cancelled() => {
                tracing::debug!("Operation completed, agent exiting");
            }
        }
    }
}

/// Input shards for each node: contiguous, balanced blocks in node order.
///
/// With 100 shards over 3 nodes the blocks hold 34, 33 and 33 shards. Duplicate names
/// produced by the template are planned once.
pub fn plan_input_shards(names: impl IntoIterator<Item = String>, nodes: usize) -> Vec<Vec<String>> {
    let mut seen = HashSet::new();
    let names: Vec<String> = names
        .into_iter()
        .filter(|name| seen.insert(name.clone()))
        .collect();

    if nodes == 0 {
        return Vec::new();
    }
    let base = names.len() / nodes;
    let extra = names.len() % nodes;

    let mut blocks = Vec::with_capacity(nodes);
    let mut names = names.into_iter();
    for index in 0..nodes {
        let size = base + usize::from(index < extra);
        blocks.push(names.by_ref().take(size).collect());
    }
    blocks
}
