use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

use super::builder::TransferHub;
use super::exchange::MetaSortExchange;
use super::types::{ParsedSpec, SortState, SortUuid};
use crate::config::SortConfig;
use crate::storage::store::ObjectStore;

struct Lifecycle {
    state: SortState,
    ended_at: Option<DateTime<Utc>>,
}

/// Lifecycle of one sort operation.
///
/// All transitions go through one small mutex and only ever leave `Running`, so a user
/// abort, an internal failure and normal completion can race without a terminal state
/// ever being overwritten.
pub struct JobControl {
    lifecycle: Mutex<Lifecycle>,
    /// Cancelled on abort or failure; every agent watches it.
    pub cancel: CancellationToken,
    /// Cancelled once the operation finished normally.
    pub completed: CancellationToken,
    nodes: usize,
    remaining: AtomicUsize,
    failed_nodes: AtomicUsize,
}

impl JobControl {
    pub fn new(nodes: usize) -> Arc<Self> {
        Arc::new(Self {
            lifecycle: Mutex::new(Lifecycle {
                state: SortState::Running,
                ended_at: None,
            }),
            cancel: CancellationToken::new(),
            completed: CancellationToken::new(),
            nodes,
            remaining: AtomicUsize::new(nodes),
            failed_nodes: AtomicUsize::new(0),
        })
    }

    pub fn state(&self) -> SortState {
        self.lifecycle.lock().state.clone()
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.lifecycle.lock().ended_at
    }

    /// User abort. Returns `false` when the operation had already ended.
    pub fn abort(&self) -> bool {
        self.end(SortState::Aborted)
    }

    /// Internal failure. Returns `false` when the operation had already ended.
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        self.end(SortState::Failed {
            reason: reason.into(),
        })
    }

    /// Called once per node when it is done with the operation, either by finishing
    /// or by failing on its own. The last call completes the operation.
    pub fn node_settled(&self, failed: bool) {
        if failed {
            self.failed_nodes.fetch_add(1, Ordering::SeqCst);
        }
        if self.remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
            if self.failed_nodes.load(Ordering::SeqCst) == self.nodes {
                self.fail("every node failed");
            } else {
                self.end(SortState::Finished);
            }
        }
    }

    fn end(&self, next: SortState) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.state.is_terminal() {
            return false;
        }
        let finished = next == SortState::Finished;
        lifecycle.state = next;
        lifecycle.ended_at = Some(Utc::now());
        drop(lifecycle);

        if finished {
            self.completed.cancel();
        } else {
            self.cancel.cancel();
        }
        true
    }
}

/// Everything the node agents of one operation share.
pub struct OperationContext {
    pub uuid: SortUuid,
    pub parsed: ParsedSpec,
    pub store: Arc<dyn ObjectStore>,
    pub exchange: Arc<MetaSortExchange>,
    pub hub: Arc<TransferHub>,
    pub control: Arc<JobControl>,
    pub config: SortConfig,
}
