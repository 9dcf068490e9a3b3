use axum::{
    Extension, Json,
    extract::{Path, rejection::JsonRejection},
    http::StatusCode,
};
use std::sync::Arc;

use super::coordinator::SortCoordinator;
use super::protocol::StartSortResponse;
use super::types::{SortJobInfo, SortSpec, SortUuid};
use crate::error::{Result, SortError};
use crate::metrics::types::SortMetrics;

pub async fn handle_start_sort(
    Extension(coordinator): Extension<Arc<SortCoordinator>>,
    body: std::result::Result<Json<SortSpec>, JsonRejection>,
) -> Result<Json<StartSortResponse>> {
    let Json(spec) = body.map_err(|rejection| SortError::invalid_spec(rejection.body_text()))?;
    let uuid = coordinator.start_sort(spec).await?;
    Ok(Json(StartSortResponse { uuid }))
}

pub async fn handle_abort_sort(
    Extension(coordinator): Extension<Arc<SortCoordinator>>,
    Path(uuid): Path<String>,
) -> Result<StatusCode> {
    coordinator.abort_sort(&SortUuid(uuid))?;
    Ok(StatusCode::OK)
}

pub async fn handle_get_metrics(
    Extension(coordinator): Extension<Arc<SortCoordinator>>,
    Path(uuid): Path<String>,
) -> Result<Json<SortMetrics>> {
    Ok(Json(coordinator.get_sort_metrics(&SortUuid(uuid))?))
}

pub async fn handle_get_sort(
    Extension(coordinator): Extension<Arc<SortCoordinator>>,
    Path(uuid): Path<String>,
) -> Result<Json<SortJobInfo>> {
    Ok(Json(coordinator.get_sort(&SortUuid(uuid))?))
}

pub async fn handle_list_sorts(
    Extension(coordinator): Extension<Arc<SortCoordinator>>,
) -> Json<Vec<SortJobInfo>> {
    Json(coordinator.list_sorts())
}

pub async fn handle_remove_sort(
    Extension(coordinator): Extension<Arc<SortCoordinator>>,
    Path(uuid): Path<String>,
) -> Result<StatusCode> {
    coordinator.remove_sort(&SortUuid(uuid))?;
    Ok(StatusCode::OK)
}
