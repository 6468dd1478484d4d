//! src/services/storage_service.rs
//!
//! StorageService — bucket and object operations backed by plain directories
//! and files under `base_path`, with metadata kept in flat-file registries
//! (see `metadata_store`). Buckets live at `base_path/{bucket}` and objects at
//! `base_path/{bucket}/{key}`. Uploads and registry rewrites are staged in
//! `base_path/.staging` and renamed into place.
//!
//! Bucket operations live in `bucket_service.rs`, object operations in
//! `object_service.rs`; this file holds the shared state, errors, startup and
//! the reconciliation pass.

use super::{
    locks::KeyedLocks,
    metadata_store::{MetadataError, MetadataStore},
    records,
    validation::{OBJECT_REGISTRY_FILE, validate_bucket_name, validate_object_key},
};
use crate::models::{
    bucket::Bucket,
    object::{DEFAULT_CONTENT_TYPE, Object},
};
use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Hidden directory for in-flight uploads and registry rewrites. Bucket names
/// cannot start with a dot, so it never collides with a bucket.
pub const STAGING_DIR: &str = ".staging";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid name `{name}`: {reason}")]
    InvalidName { name: String, reason: String },
    #[error("bucket `{0}` already exists")]
    BucketAlreadyExists(String),
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("object `{key}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, key: String },
    #[error("bucket `{0}` is not empty")]
    BucketNotEmpty(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    /// The filesystem change went through but its registry update did not.
    /// The change is not rolled back; `reconcile` repairs the registry.
    #[error("{operation} succeeded but its registry update failed: {source}")]
    Metadata {
        operation: String,
        #[source]
        source: MetadataError,
    },
}

/// Registry reads that happen before any mutation surface as plain I/O errors.
impl From<MetadataError> for StorageError {
    fn from(err: MetadataError) -> Self {
        StorageError::Io(err.into())
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Build the error for a registry update that failed after its filesystem
/// mutation, logging the resulting inconsistency.
pub(crate) fn metadata_gap(operation: String) -> impl FnOnce(MetadataError) -> StorageError {
    move |source| {
        warn!(
            "registry out of sync after {}: {}; run reconciliation to repair",
            operation, source
        );
        StorageError::Metadata { operation, source }
    }
}

/// Counts of repairs made by [`StorageService::reconcile`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub buckets_scanned: usize,
    pub bucket_records_added: usize,
    pub bucket_records_dropped: usize,
    pub object_records_added: usize,
    pub object_records_dropped: usize,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.bucket_records_added == 0
            && self.bucket_records_dropped == 0
            && self.object_records_added == 0
            && self.object_records_dropped == 0
    }
}

/// StorageService provides the bucket and object operations:
/// - create / list / delete buckets (directories + bucket registry)
/// - put / get / head / list / delete objects (files + object registries)
/// - reconcile registries against the filesystem
///
/// Cloning is cheap; all clones share the same locks and metadata store.
#[derive(Clone)]
pub struct StorageService {
    /// Root directory holding bucket directories and the bucket registry.
    pub base_path: PathBuf,

    /// Flat-file registries for bucket and object metadata.
    pub metadata: Arc<MetadataStore>,

    staging_path: PathBuf,

    /// Per bucket name: writers create/delete the directory, readers are
    /// object operations that need the directory to stay put.
    pub(crate) bucket_locks: Arc<KeyedLocks>,

    /// Per `bucket/key`: serializes the file swap and registry update of one object.
    pub(crate) object_locks: Arc<KeyedLocks>,
}

impl StorageService {
    /// Prepare `base_path` for serving and build the service.
    ///
    /// Creates the directory if missing, rejects a non-directory, probes that
    /// it is writable, and resets the staging directory. Any failure here is
    /// fatal for startup.
    pub async fn open(base_path: impl Into<PathBuf>) -> io::Result<Self> {
        let base_path = base_path.into();

        match fs::metadata(&base_path).await {
            Ok(meta) if !meta.is_dir() => {
                return Err(io::Error::new(
                    ErrorKind::NotADirectory,
                    format!("{} is not a directory", base_path.display()),
                ));
            }
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {
                fs::create_dir_all(&base_path).await?;
                info!("Created storage directory at {}", base_path.display());
            }
            Err(err) => return Err(err),
        }

        let probe = base_path.join(format!(".probe-{}", Uuid::new_v4()));
        fs::write(&probe, b"probe").await.map_err(|err| {
            io::Error::new(
                err.kind(),
                format!("storage directory {} is not writable: {}", base_path.display(), err),
            )
        })?;
        fs::remove_file(&probe).await?;

        let staging_path = base_path.join(STAGING_DIR);
        match fs::remove_dir_all(&staging_path).await {
            Ok(()) => debug!("cleared leftover staging files"),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err),
        }
        fs::create_dir(&staging_path).await?;

        Ok(Self {
            metadata: Arc::new(MetadataStore::new(&base_path, &staging_path)),
            base_path,
            staging_path,
            bucket_locks: Arc::new(KeyedLocks::new()),
            object_locks: Arc::new(KeyedLocks::new()),
        })
    }

    /// Physical directory of a bucket. Does not check for existence.
    pub(crate) fn bucket_root(&self, bucket: &str) -> PathBuf {
        self.base_path.join(bucket)
    }

    /// Physical payload path of an object. Does not check for existence.
    pub(crate) fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.bucket_root(bucket).join(key)
    }

    /// A fresh, unused path inside the staging directory.
    pub(crate) fn staging_file(&self) -> PathBuf {
        self.staging_path.join(format!("upload-{}", Uuid::new_v4()))
    }

    /// Repair mismatches between the filesystem and the registries.
    ///
    /// The filesystem decides what exists; the registries keep the attributes
    /// of everything that still exists:
    /// - bucket directories without a record get one (timestamps = now)
    /// - bucket records without a directory are dropped; duplicates keep the first
    /// - object files without a record get one (size from the file, default
    ///   content type, stored now)
    /// - object records without a file are dropped; duplicates keep the last
    ///
    /// Expects exclusive access to the storage root (startup or `--reconcile`):
    /// a bucket created while the pass runs may lose its fresh record.
    pub async fn reconcile(&self) -> StorageResult<ReconcileReport> {
        let mut report = ReconcileReport::default();
        let now = records::now();

        let bucket_dirs = self.scan_bucket_dirs().await?;
        report.buckets_scanned = bucket_dirs.len();

        for bucket in &bucket_dirs {
            let _guard = self.bucket_locks.write(bucket).await;
            let files = self.scan_object_files(bucket).await?;

            let (added, dropped) = self
                .metadata
                .update_object_records(bucket, |objects| {
                    let before = objects.len();
                    let mut seen = HashSet::new();
                    let mut kept: Vec<Object> = objects
                        .drain(..)
                        .rev()
                        .filter(|o| files.contains_key(&o.key) && seen.insert(o.key.clone()))
                        .collect();
                    kept.reverse();
                    let dropped = before - kept.len();

                    let mut added = 0;
                    for (key, size) in &files {
                        if !seen.contains(key) {
                            kept.push(Object {
                                bucket: bucket.clone(),
                                key: key.clone(),
                                size_bytes: *size,
                                content_type: DEFAULT_CONTENT_TYPE.to_string(),
                                stored_at: now,
                            });
                            added += 1;
                        }
                    }
                    *objects = kept;
                    (added, dropped)
                })
                .await?;
            report.object_records_added += added;
            report.object_records_dropped += dropped;
        }

        let (added, dropped) = self
            .metadata
            .update_bucket_records(|buckets| {
                let before = buckets.len();
                let mut seen = HashSet::new();
                buckets.retain(|b| bucket_dirs.contains(&b.name) && seen.insert(b.name.clone()));
                let dropped = before - buckets.len();

                let mut added = 0;
                for name in &bucket_dirs {
                    if !seen.contains(name) {
                        buckets.push(Bucket::new(name.clone(), now));
                        added += 1;
                    }
                }
                (added, dropped)
            })
            .await?;
        report.bucket_records_added = added;
        report.bucket_records_dropped = dropped;

        if report.is_clean() {
            info!("reconciliation found no mismatches");
        } else {
            warn!("reconciliation repaired registries: {:?}", report);
        }
        Ok(report)
    }

    /// Names of all directories under the root that are valid bucket names.
    async fn scan_bucket_dirs(&self) -> StorageResult<BTreeSet<String>> {
        let mut names = BTreeSet::new();
        let mut entries = fs::read_dir(&self.base_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if name == STAGING_DIR {
                continue;
            }
            if validate_bucket_name(&name).is_ok() {
                names.insert(name);
            } else {
                debug!("ignoring directory {} with invalid bucket name", name);
            }
        }
        Ok(names)
    }

    /// Object files of a bucket with their on-disk sizes.
    async fn scan_object_files(&self, bucket: &str) -> StorageResult<BTreeMap<String, u64>> {
        let mut files = BTreeMap::new();
        let mut entries = fs::read_dir(self.bucket_root(bucket)).await?;
        while let Some(entry) = entries.next_entry().await? {
            let Some(key) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if key == OBJECT_REGISTRY_FILE {
                continue;
            }
            let meta = entry.metadata().await?;
            if meta.is_file() && validate_object_key(&key).is_ok() {
                files.insert(key, meta.len());
            } else {
                debug!("ignoring entry {} in bucket {}", key, bucket);
            }
        }
        Ok(files)
    }
}

/// Whether `path` is an existing directory. Unreadable paths count as absent.
pub(crate) async fn is_dir(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|meta| meta.is_dir())
        .unwrap_or(false)
}

/// Whether `path` is an existing regular file. Unreadable paths count as absent.
pub(crate) async fn is_file(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}
