//! HTTP handlers for bucket operations.

use super::xml::{build_bucket_list_xml, build_object_list_xml, message_response, xml_response};
use crate::{errors::AppError, services::storage_service::StorageService};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// GET `/` — list all buckets.
pub async fn list_buckets(State(service): State<StorageService>) -> Result<Response, AppError> {
    let buckets = service.list_buckets().await?;
    Ok(xml_response(StatusCode::OK, build_bucket_list_xml(&buckets)))
}

/// PUT `/{bucket}` — create bucket.
pub async fn create_bucket(
    State(service): State<StorageService>,
    Path(bucket): Path<String>,
) -> Result<Response, AppError> {
    service.create_bucket(&bucket).await?;
    Ok(message_response(
        StatusCode::CREATED,
        "Bucket created successfully",
    ))
}

/// GET `/{bucket}` — list the objects recorded for a bucket.
pub async fn list_objects(
    State(service): State<StorageService>,
    Path(bucket): Path<String>,
) -> Result<Response, AppError> {
    let objects = service.list_objects(&bucket).await?;
    Ok(xml_response(
        StatusCode::OK,
        build_object_list_xml(&bucket, &objects),
    ))
}

/// DELETE `/{bucket}` — delete an empty bucket.
pub async fn delete_bucket(
    State(service): State<StorageService>,
    Path(bucket): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    service.delete_bucket(&bucket).await?;
    Ok(StatusCode::NO_CONTENT)
}
