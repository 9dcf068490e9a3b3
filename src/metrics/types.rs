use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The three phases every node walks through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    LocalExtraction,
    MetaSorting,
    ShardCreation,
}

impl Phase {
    pub const ALL: [Phase; 3] = [
        Phase::LocalExtraction,
        Phase::MetaSorting,
        Phase::ShardCreation,
    ];

    pub fn previous(self) -> Option<Phase> {
        match self {
            Phase::LocalExtraction => None,
            Phase::MetaSorting => Some(Phase::LocalExtraction),
            Phase::ShardCreation => Some(Phase::MetaSorting),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::LocalExtraction => "local_extraction",
            Phase::MetaSorting => "meta_sorting",
            Phase::ShardCreation => "shard_creation",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of a node within one phase.
///
/// `shards`, `records` and `bytes` mean what the phase processed: input shards read during
/// extraction, records indexed during meta-sorting, output shards written during creation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseMetrics {
    pub started: bool,
    pub finished: bool,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub elapsed_ms: u64,
    pub shards: u64,
    pub records: u64,
    pub bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub local_extraction: PhaseMetrics,
    pub meta_sorting: PhaseMetrics,
    pub shard_creation: PhaseMetrics,
    pub aborted: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl MetricsRecord {
    pub fn phase(&self, phase: Phase) -> &PhaseMetrics {
        match phase {
            Phase::LocalExtraction => &self.local_extraction,
            Phase::MetaSorting => &self.meta_sorting,
            Phase::ShardCreation => &self.shard_creation,
        }
    }

    fn phase_mut(&mut self, phase: Phase) -> &mut PhaseMetrics {
        match phase {
            Phase::LocalExtraction => &mut self.local_extraction,
            Phase::MetaSorting => &mut self.meta_sorting,
            Phase::ShardCreation => &mut self.shard_creation,
        }
    }

    fn previous_finished(&self, phase: Phase) -> bool {
        phase
            .previous()
            .map(|prev| self.phase(prev).finished)
            .unwrap_or(true)
    }

    /// Marks `phase` as started. Refused once aborted, or while the previous phase is unfinished.
    pub fn begin(&mut self, phase: Phase) -> bool {
        if self.aborted || !self.previous_finished(phase) || self.phase(phase).started {
            return false;
        }
        let metrics = self.phase_mut(phase);
        metrics.started = true;
        metrics.start_time = Some(Utc::now());
        true
    }

    pub fn finish(&mut self, phase: Phase) -> bool {
        if self.aborted || !self.previous_finished(phase) {
            return false;
        }
        let metrics = self.phase_mut(phase);
        if !metrics.started || metrics.finished {
            return false;
        }
        let now = Utc::now();
        metrics.finished = true;
        metrics.end_time = Some(now);
        metrics.elapsed_ms = elapsed_ms(metrics.start_time, now);
        true
    }

    pub fn add(&mut self, phase: Phase, shards: u64, records: u64, bytes: u64) {
        let metrics = self.phase_mut(phase);
        metrics.shards += shards;
        metrics.records += records;
        metrics.bytes += bytes;
    }

    /// Sets `aborted`. A phase caught in flight keeps `finished = false` but gets its end time.
    pub fn abort(&mut self) {
        if self.aborted {
            return;
        }
        self.aborted = true;
        let now = Utc::now();
        for phase in Phase::ALL {
            let metrics = self.phase_mut(phase);
            if metrics.started && !metrics.finished {
                metrics.end_time = Some(now);
                metrics.elapsed_ms = elapsed_ms(metrics.start_time, now);
            }
        }
    }

    pub fn all_finished(&self) -> bool {
        Phase::ALL.iter().all(|phase| self.phase(*phase).finished)
    }

    /// Phase currently in flight, if any.
    pub fn current_phase(&self) -> Option<Phase> {
        Phase::ALL.into_iter().find(|phase| {
            let metrics = self.phase(*phase);
            metrics.started && !metrics.finished
        })
    }

    /// No later phase finished while an earlier one did not, unless aborted.
    pub fn phases_ordered(&self) -> bool {
        if self.aborted {
            return true;
        }
        Phase::ALL
            .iter()
            .all(|phase| !self.phase(*phase).finished || self.previous_finished(*phase))
    }
}

fn elapsed_ms(start: Option<DateTime<Utc>>, end: DateTime<Utc>) -> u64 {
    start
        .map(|start| (end - start).num_milliseconds().max(0) as u64)
        .unwrap_or(0)
}

/// `{node_id: MetricsRecord}` as returned by `GET /sort/{uuid}/metrics`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SortMetrics(pub BTreeMap<String, MetricsRecord>);

impl SortMetrics {
    pub fn get(&self, node: &str) -> Option<&MetricsRecord> {
        self.0.get(node)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = &MetricsRecord> {
        self.0.values()
    }

    /// Every node finished all three phases.
    pub fn all_finished(&self) -> bool {
        !self.0.is_empty() && self.0.values().all(MetricsRecord::all_finished)
    }

    /// The operation counts as aborted as soon as a single node reports it.
    pub fn any_aborted(&self) -> bool {
        self.0.values().any(|record| record.aborted)
    }

    pub fn all_aborted(&self) -> bool {
        !self.0.is_empty() && self.0.values().all(|record| record.aborted)
    }

    /// What a polling client waits for: either everything finished or something aborted.
    pub fn settled(&self) -> bool {
        self.all_finished() || self.any_aborted()
    }
}
