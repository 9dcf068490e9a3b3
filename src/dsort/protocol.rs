//! Sort API Protocol
//!
//! Endpoints and DTOs of the public sort API. Bodies are JSON; `SortSpec`,
//! `SortMetrics` and `SortJobInfo` travel as they are.

use serde::{Deserialize, Serialize};

use super::types::SortUuid;

// --- API Endpoints ---

/// `POST` starts a sort, `GET` lists known sorts.
pub const ENDPOINT_SORT: &str = "/sort";
/// `DELETE` aborts the sort, `GET` describes it.
pub const ENDPOINT_SORT_ITEM: &str = "/sort/:uuid";
/// `GET` returns `{node_id: MetricsRecord}`.
pub const ENDPOINT_SORT_METRICS: &str = "/sort/:uuid/metrics";
/// `POST` forgets an ended sort.
pub const ENDPOINT_SORT_REMOVE: &str = "/sort/:uuid/remove";

pub fn sort_path(uuid: &SortUuid) -> String {
    format!("/sort/{}", uuid)
}

pub fn metrics_path(uuid: &SortUuid) -> String {
    format!("/sort/{}/metrics", uuid)
}

pub fn remove_path(uuid: &SortUuid) -> String {
    format!("/sort/{}/remove", uuid)
}

// --- Data Transfer Objects ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartSortResponse {
    pub uuid: SortUuid,
}
