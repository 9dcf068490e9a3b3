//! Runtime configuration for the sort service.
//!
//! The binary builds these values from command line flags (see `main.rs`);
//! library users and tests construct them directly or start from `Default`.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::membership::types::NodeId;

/// What happens to the rest of the cluster when one node hits an
/// unrecoverable error (I/O failure, lost peer, missing input shard).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// The operation becomes `Failed` and every node is cancelled.
    #[default]
    AbortCluster,
    /// Only the failing node stops; the others carry on with what they have.
    NodeOnly,
}

/// Zero-padding width used when expanding brace-range templates.
///
/// Padding is only applied when one of the range literals has a leading zero;
/// this setting decides how wide the padded number is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum PadWidth {
    /// Width of the widest literal (`{0000..10000}` -> `00000`).
    #[default]
    Widest,
    /// Width of the start literal (`{0000..10000}` -> `0000` ... `10000`).
    Start,
}

/// Action taken when an input shard named by the template does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum MissingShardsAction {
    Ignore,
    /// Skip the shard and record a warning in the node's metrics.
    #[default]
    Warn,
    /// Treat the missing shard as a node failure.
    Abort,
}

/// Knobs of the distributed sort itself.
#[derive(Debug, Clone)]
pub struct SortConfig {
    /// How long the coordinator waits for every node at the meta-sort barrier.
    pub barrier_timeout: Duration,
    /// Maximum silence tolerated while a node waits for incoming records.
    pub transfer_timeout: Duration,
    /// Capacity of each node's record inbox.
    pub transfer_buffer: usize,
    pub failure_policy: FailurePolicy,
    pub pad_width: PadWidth,
    pub missing_shards: MissingShardsAction,
    /// Upper bound on the number of names an input template may expand to.
    pub max_input_shards: u64,
}

impl Default for SortConfig {
    fn default() -> Self {
        Self {
            barrier_timeout: Duration::from_secs(60),
            transfer_timeout: Duration::from_secs(30),
            transfer_buffer: 1024,
            failure_policy: FailurePolicy::default(),
            pad_width: PadWidth::default(),
            missing_shards: MissingShardsAction::default(),
            max_input_shards: 1_000_000,
        }
    }
}

/// Everything `serve` needs to bring a cluster up.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Number of storage targets (node agents) hosted by this process.
    pub targets: usize,
    /// Targets marked dead at startup; sorts are planned over the rest.
    pub offline: Vec<NodeId>,
    /// Root directory of the local object store; `None` keeps objects in memory.
    pub data_dir: Option<PathBuf>,
    pub sort: SortConfig,
}
