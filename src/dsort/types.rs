use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::template::Template;
use crate::config::SortConfig;
use crate::error::{Result, SortError};

/// Unique identifier of a sort operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct SortUuid(pub String);

impl SortUuid {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SortUuid {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SortUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SortUuid {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Target byte size of an output shard, given either as a number or a string such as
/// `"1024"`, `"10KiB"` or `"1MB"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputShardSize {
    Bytes(u64),
    Text(String),
}

impl OutputShardSize {
    pub fn bytes(&self) -> Result<u64> {
        match self {
            OutputShardSize::Bytes(bytes) => Ok(*bytes),
            OutputShardSize::Text(text) => parse_size(text),
        }
    }
}

impl From<u64> for OutputShardSize {
    fn from(value: u64) -> Self {
        OutputShardSize::Bytes(value)
    }
}

/// Parses `<digits>[unit]`; K, M and G units (with or without `B`/`iB`) are powers of 1024.
pub fn parse_size(text: &str) -> Result<u64> {
    let re = Regex::new(r"^\s*(\d+)\s*([a-zA-Z]*)\s*$")
        .map_err(|e| SortError::invalid_spec(e.to_string()))?;
    let caps = re
        .captures(text)
        .ok_or_else(|| SortError::invalid_spec(format!("invalid size '{}'", text)))?;

    let value: u64 = caps[1]
        .parse()
        .map_err(|_| SortError::invalid_spec(format!("size '{}' out of range", text)))?;

    let multiplier: u64 = match caps[2].to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" | "kib" => 1 << 10,
        "m" | "mb" | "mib" => 1 << 20,
        "g" | "gb" | "gib" => 1 << 30,
        unit => {
            return Err(SortError::invalid_spec(format!(
                "unknown size unit '{}' in '{}'",
                unit, text
            )));
        }
    };

    value
        .checked_mul(multiplier)
        .ok_or_else(|| SortError::invalid_spec(format!("size '{}' out of range", text)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmKind {
    /// Lexicographic order of record keys.
    #[default]
    Alphanumeric,
    /// Deterministic pseudo-random order driven by `seed`.
    Shuffle,
    /// Keep the order in which nodes published their records.
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SortAlgorithm {
    #[serde(default)]
    pub kind: AlgorithmKind,
    #[serde(default)]
    pub decreasing: bool,
    #[serde(default)]
    pub seed: Option<u64>,
}

/// What a client submits to `POST /sort`. Immutable once accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortSpec {
    pub bucket: String,
    #[serde(default)]
    pub provider: String,
    pub extension: String,
    pub output_shard_size: OutputShardSize,
    /// Brace-range pattern naming the input shards, without extension.
    pub input_format: String,
    /// Brace-range pattern naming the output shards, without extension.
    pub output_format: String,
    /// Where output shards are written; defaults to `bucket`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_bucket: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub algorithm: SortAlgorithm,
}

/// Lifecycle of a sort operation. Every state but `Running` is terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SortState {
    Running,
    /// Stopped by a user request.
    Aborted,
    /// Stopped by the service itself (barrier timeout, node failure).
    Failed { reason: String },
    Finished,
}

impl SortState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SortState::Running)
    }
}

/// Summary row returned by `GET /sort`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortJobInfo {
    pub uuid: SortUuid,
    #[serde(flatten)]
    pub state: SortState,
    pub description: String,
    pub bucket: String,
    pub output_bucket: String,
    pub nodes: usize,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// A `SortSpec` that passed validation, with its templates and size resolved.
#[derive(Debug, Clone)]
pub struct ParsedSpec {
    pub spec: SortSpec,
    pub input: Template,
    pub output: Template,
    pub shard_size: u64,
}

impl ParsedSpec {
    /// Checks everything that does not need the object store.
    pub fn parse(spec: SortSpec, config: &SortConfig) -> Result<Self> {
        if spec.bucket.is_empty() {
            return Err(SortError::invalid_spec("bucket is required"));
        }
        if !matches!(spec.provider.as_str(), "" | "ais") {
            return Err(SortError::invalid_spec(format!(
                "unsupported provider '{}'",
                spec.provider
            )));
        }
        if spec.extension != ".tar" {
            return Err(SortError::invalid_spec(format!(
                "unsupported extension '{}', expected '.tar'",
                spec.extension
            )));
        }

        let shard_size = spec.output_shard_size.bytes()?;
        if shard_size == 0 {
            return Err(SortError::invalid_spec("output_shard_size must be positive"));
        }

        let input = Template::parse(&spec.input_format, config.pad_width)?;
        let output = Template::parse(&spec.output_format, config.pad_width)?;

        // Input names are expanded up front, output names lazily
        if input.count() > config.max_input_shards {
            return Err(SortError::invalid_spec(format!(
                "input_format '{}' names {} shards, at most {} allowed",
                input.source(),
                input.count(),
                config.max_input_shards
            )));
        }

        Ok(Self {
            spec,
            input,
            output,
            shard_size,
        })
    }

    pub fn input_bucket(&self) -> &str {
        &self.spec.bucket
    }

    pub fn output_bucket(&self) -> &str {
        self.spec.output_bucket.as_deref().unwrap_or(&self.spec.bucket)
    }

    pub fn extension(&self) -> &str {
        &self.spec.extension
    }
}
