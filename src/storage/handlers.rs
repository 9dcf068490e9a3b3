use axum::{
    Json,
    body::Bytes,
    extract::{Extension, Path, Query},
    http::StatusCode,
};
use std::sync::Arc;

use super::protocol::{ListObjectsQuery, ListObjectsResponse};
use super::store::ObjectStore;
use crate::error::{Result, StoreError};

pub async fn handle_create_bucket(
    Extension(store): Extension<Arc<dyn ObjectStore>>,
    Path(bucket): Path<String>,
) -> Result<StatusCode> {
    store.create_bucket(&bucket).await?;
    tracing::info!("Bucket {} created", bucket);
    Ok(StatusCode::CREATED)
}

pub async fn handle_destroy_bucket(
    Extension(store): Extension<Arc<dyn ObjectStore>>,
    Path(bucket): Path<String>,
) -> Result<StatusCode> {
    store.destroy_bucket(&bucket).await?;
    tracing::info!("Bucket {} destroyed", bucket);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn handle_list_objects(
    Extension(store): Extension<Arc<dyn ObjectStore>>,
    Path(bucket): Path<String>,
    Query(query): Query<ListObjectsQuery>,
) -> Result<Json<ListObjectsResponse>> {
    let objects = store.list(&bucket, &query.prefix).await?;
    Ok(Json(ListObjectsResponse { bucket, objects }))
}

pub async fn handle_put_object(
    Extension(store): Extension<Arc<dyn ObjectStore>>,
    Path((bucket, name)): Path<(String, String)>,
    body: Bytes,
) -> Result<StatusCode> {
    let size = body.len();
    store.put(&bucket, &name, body.to_vec()).await?;
    tracing::debug!("Stored object {}/{} ({} bytes)", bucket, name, size);
    Ok(StatusCode::CREATED)
}

pub async fn handle_get_object(
    Extension(store): Extension<Arc<dyn ObjectStore>>,
    Path((bucket, name)): Path<(String, String)>,
) -> Result<Vec<u8>> {
    match store.get(&bucket, &name).await? {
        Some(data) => Ok(data),
        None => Err(StoreError::ObjectNotFound { bucket, name }.into()),
    }
}

pub async fn handle_delete_object(
    Extension(store): Extension<Arc<dyn ObjectStore>>,
    Path((bucket, name)): Path<(String, String)>,
) -> Result<StatusCode> {
    if store.delete(&bucket, &name).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(StoreError::ObjectNotFound { bucket, name }.into())
    }
}
