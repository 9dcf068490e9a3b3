//! HTTP surface of the service: the sort API plus the minimal blob endpoints needed to
//! stage inputs and fetch outputs.

use axum::{
    Router,
    extract::Extension,
    routing::{get, post, put},
};
use std::sync::Arc;

use crate::dsort::coordinator::SortCoordinator;
use crate::dsort::handlers::*;
use crate::dsort::protocol::*;
use crate::storage::handlers::*;
use crate::storage::protocol::*;
use crate::storage::store::ObjectStore;

pub fn router(coordinator: Arc<SortCoordinator>, store: Arc<dyn ObjectStore>) -> Router {
    Router::new()
        .route(ENDPOINT_SORT, post(handle_start_sort).get(handle_list_sorts))
        .route(
            ENDPOINT_SORT_ITEM,
            get(handle_get_sort).delete(handle_abort_sort),
        )
        .route(ENDPOINT_SORT_METRICS, get(handle_get_metrics))
        .route(ENDPOINT_SORT_REMOVE, post(handle_remove_sort))
        .route(
            ENDPOINT_BUCKET,
            put(handle_create_bucket)
                .get(handle_list_objects)
                .delete(handle_destroy_bucket),
        )
        .route(
            ENDPOINT_OBJECT,
            put(handle_put_object)
                .get(handle_get_object)
                .delete(handle_delete_object),
        )
        .layer(Extension(coordinator))
        .layer(Extension(store))
}
