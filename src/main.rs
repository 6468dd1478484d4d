use anyhow::{Context, Result};
use axum::Router;
use object_store::{StorageService, config::AppConfig, routes};
use std::io::ErrorKind;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + reconcile flag ---
    let (cfg, reconcile) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting object-store with config: {:?}", cfg);

    // --- Prepare storage root; failures here abort startup ---
    let storage = StorageService::open(&cfg.storage_dir)
        .await
        .with_context(|| format!("initializing storage directory `{}`", cfg.storage_dir))?;

    // --- Handle reconcile mode ---
    if reconcile {
        let report = storage.reconcile().await?;
        println!(
            "scanned {} buckets: bucket records +{} -{}, object records +{} -{}",
            report.buckets_scanned,
            report.bucket_records_added,
            report.bucket_records_dropped,
            report.object_records_added,
            report.object_records_dropped
        );
        return Ok(()); // exit after reconciliation
    }

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(storage);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!(
        "Server listening on http://{} with storage at {}",
        listener.local_addr()?,
        cfg.storage_dir
    );
    axum::serve(listener, app).await?;

    Ok(())
}
