//! Liveness and readiness.
//!
//! `/healthz` never touches the disk. `/readyz` parses the bucket registry
//! and round-trips a scratch file through the storage root.

use crate::services::storage_service::StorageService;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::{collections::BTreeMap, path::Path};
use tokio::fs;
use uuid::Uuid;

const PROBE_BYTES: &[u8] = b"readyz";

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    checks: BTreeMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<Result<(), String>> for CheckStatus {
    fn from(result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self { ok: true, error: None },
            Err(error) => Self {
                ok: false,
                error: Some(error),
            },
        }
    }
}

/// `GET /healthz`
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

/// `GET /readyz`
///
/// 200 when every check passes, 503 otherwise. The body lists each check.
pub async fn readyz(State(service): State<StorageService>) -> impl IntoResponse {
    let mut checks = BTreeMap::new();
    checks.insert("registry", CheckStatus::from(registry_readable(&service).await));
    checks.insert("disk", CheckStatus::from(disk_writable(&service.base_path).await));

    let ready = checks.values().all(|check| check.ok);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = ReadyResponse {
        status: if ready { "ok" } else { "error" },
        checks,
    };
    (status, Json(body))
}

async fn registry_readable(service: &StorageService) -> Result<(), String> {
    service
        .metadata
        .list_bucket_records()
        .await
        .map(|_| ())
        .map_err(|err| err.to_string())
}

/// Write, read back and remove a scratch file under `root`.
async fn disk_writable(root: &Path) -> Result<(), String> {
    let scratch = root.join(format!(".readyz-{}", Uuid::new_v4()));
    fs::write(&scratch, PROBE_BYTES)
        .await
        .map_err(|err| format!("could not write scratch file: {err}"))?;

    let read_back = fs::read(&scratch).await;
    // A leftover scratch file is harmless; the read result decides.
    let _ = fs::remove_file(&scratch).await;
    match read_back {
        Ok(bytes) if bytes == PROBE_BYTES => Ok(()),
        Ok(_) => Err("scratch file content mismatch".to_string()),
        Err(err) => Err(format!("could not read scratch file: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn disk_check_cleans_up_after_itself() {
        let dir = TempDir::new().unwrap();
        disk_writable(dir.path()).await.unwrap();
        let mut entries = fs::read_dir(dir.path()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn disk_check_reports_missing_root() {
        let dir = TempDir::new().unwrap();
        let err = disk_writable(&dir.path().join("gone")).await.unwrap_err();
        assert!(err.contains("could not write"), "{err}");
    }

    #[tokio::test]
    async fn corrupt_registry_fails_readiness() {
        let dir = TempDir::new().unwrap();
        let service = StorageService::open(dir.path()).await.unwrap();
        assert!(registry_readable(&service).await.is_ok());

        fs::write(service.metadata.bucket_registry_path(), "x,bad,bad\n")
            .await
            .unwrap();
        assert!(registry_readable(&service).await.is_err());
    }
}
