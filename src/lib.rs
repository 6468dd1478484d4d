//! Filesystem-backed object storage.
//!
//! Buckets are directories under a storage root, objects are files inside
//! them, and metadata lives in flat comma-separated registries next to them
//! (`buckets.csv` at the root, `objects.csv` per bucket).

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;

pub use services::storage_service::{ReconcileReport, StorageError, StorageService};
