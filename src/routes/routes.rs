//! Defines routes for all bucket and object operations.
//!
//! ## Structure
//! - **Service-level endpoints**
//!   - `GET    /` — list buckets
//!
//! - **Bucket-level endpoints**
//!   - `PUT    /{bucket}` — create bucket
//!   - `GET    /{bucket}` — list objects
//!   - `DELETE /{bucket}` — delete bucket (must be empty)
//!
//! - **Object-level endpoints**
//!   - `PUT    /{bucket}/{key}` — upload object
//!   - `GET    /{bucket}/{key}` — download object
//!   - `HEAD   /{bucket}/{key}` — retrieve metadata only
//!   - `DELETE /{bucket}/{key}` — delete object
//!
//! Keys are a single path segment; deeper paths do not match any route.

use crate::{
    handlers::{
        bucket_handlers::{create_bucket, delete_bucket, list_buckets, list_objects},
        health_handlers::{healthz, readyz},
        object_handlers::{delete_object, get_object, head_object, put_object},
    },
    services::storage_service::StorageService,
};
use axum::{
    Router,
    routing::{get, put},
};
use tower_http::trace::TraceLayer;

/// Build and return the router for all routes.
///
/// The router carries shared state (`StorageService`) to all handlers.
pub fn routes() -> Router<StorageService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/", get(list_buckets))
        // Object-level routes
        .route(
            "/{bucket}/{key}",
            put(put_object)
                .get(get_object)
                .head(head_object)
                .delete(delete_object),
        )
        // Bucket-level routes
        .route(
            "/{bucket}",
            get(list_objects).put(create_bucket).delete(delete_bucket),
        )
        .layer(TraceLayer::new_for_http())
}
