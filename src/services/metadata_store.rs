//! src/services/metadata_store.rs
//!
//! MetadataStore — flat-file registries for bucket and object metadata.
//!
//! The bucket registry (`{root}/buckets.csv`) holds one record per bucket:
//! `name, created_at, last_modified`. Each bucket directory holds an object
//! registry (`{root}/{bucket}/objects.csv`) with one record per object:
//! `key, size, content_type, stored_at`. The object registry is removed as
//! soon as it would become empty.
//!
//! Every mutation reads the full record set, transforms it, and writes the
//! full set back through a staging file + rename. Each registry file has its
//! own lock, so a rewrite never interleaves with another read or rewrite of
//! the same file.

use super::{
    locks::KeyedLocks,
    records::{self, RawRecord, RecordError},
    validation::{BUCKET_REGISTRY_FILE, OBJECT_REGISTRY_FILE},
};
use crate::models::{bucket::Bucket, object::Object};
use chrono::{DateTime, Utc};
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("failed to access registry {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("registry {path:?} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: RecordError,
    },
}

impl From<MetadataError> for io::Error {
    fn from(err: MetadataError) -> Self {
        match err {
            MetadataError::Io { source, .. } => source,
            corrupt @ MetadataError::Corrupt { .. } => {
                io::Error::new(ErrorKind::InvalidData, corrupt)
            }
        }
    }
}

pub type MetadataResult<T> = Result<T, MetadataError>;

const BUCKET_FIELDS: usize = 3;
const OBJECT_FIELDS: usize = 4;

pub struct MetadataStore {
    root: PathBuf,
    staging: PathBuf,
    locks: KeyedLocks,
}

impl MetadataStore {
    /// `staging` must live on the same filesystem as `root` so renames are atomic.
    pub fn new(root: impl Into<PathBuf>, staging: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            staging: staging.into(),
            locks: KeyedLocks::new(),
        }
    }

    pub fn bucket_registry_path(&self) -> PathBuf {
        self.root.join(BUCKET_REGISTRY_FILE)
    }

    pub fn object_registry_path(&self, bucket: &str) -> PathBuf {
        self.root.join(bucket).join(OBJECT_REGISTRY_FILE)
    }

    // ---- bucket registry ----

    /// Add a record for `name` with `at` as both timestamps.
    ///
    /// A stale record for the same name is replaced rather than duplicated.
    pub async fn append_bucket_record(
        &self,
        name: &str,
        at: DateTime<Utc>,
    ) -> MetadataResult<Bucket> {
        let bucket = Bucket::new(name, at);
        let record = bucket.clone();
        self.update_bucket_records(move |buckets| {
            let before = buckets.len();
            buckets.retain(|b| b.name != record.name);
            if buckets.len() != before {
                warn!("replacing stale registry record for bucket {}", record.name);
            }
            buckets.push(record);
        })
        .await?;
        Ok(bucket)
    }

    /// Remove the record for `name`. Returns whether a record was dropped.
    pub async fn remove_bucket_record(&self, name: &str) -> MetadataResult<bool> {
        self.update_bucket_records(|buckets| {
            let before = buckets.len();
            buckets.retain(|b| b.name != name);
            buckets.len() != before
        })
        .await
    }

    /// Bump the modification timestamp of `name` to `at`, keeping its
    /// creation timestamp. The timestamp never moves backwards.
    pub async fn touch_bucket_record(
        &self,
        name: &str,
        at: DateTime<Utc>,
    ) -> MetadataResult<Option<Bucket>> {
        self.update_bucket_records(|buckets| {
            let mut touched = None;
            for bucket in buckets.iter_mut().filter(|b| b.name == name) {
                bucket.last_modified = bucket.last_modified.max(at);
                touched = Some(bucket.clone());
            }
            touched
        })
        .await
    }

    /// All bucket records in file order. Empty if the registry does not exist.
    pub async fn list_bucket_records(&self) -> MetadataResult<Vec<Bucket>> {
        let path = self.bucket_registry_path();
        let _guard = self.locks.read(&lock_key(&path)).await;
        Ok(read_buckets(&path).await?.unwrap_or_default())
    }

    pub async fn find_bucket_record(&self, name: &str) -> MetadataResult<Option<Bucket>> {
        Ok(self
            .list_bucket_records()
            .await?
            .into_iter()
            .find(|b| b.name == name))
    }

    /// Read-modify-write the bucket registry under its lock.
    ///
    /// The registry is only created when the transformed set is non-empty;
    /// an existing registry is rewritten even when it ends up empty.
    pub async fn update_bucket_records<F, T>(&self, f: F) -> MetadataResult<T>
    where
        F: FnOnce(&mut Vec<Bucket>) -> T,
    {
        let path = self.bucket_registry_path();
        let _guard = self.locks.write(&lock_key(&path)).await;

        let existing = read_buckets(&path).await?;
        let existed = existing.is_some();
        let mut buckets = existing.unwrap_or_default();
        let out = f(&mut buckets);

        if existed || !buckets.is_empty() {
            let body: String = buckets.iter().map(encode_bucket).collect();
            self.write_registry(&path, body.as_bytes()).await?;
        }
        Ok(out)
    }

    // ---- object registries ----

    /// Replace any record for `object.key` with `object`, or add it.
    pub async fn upsert_object_record(&self, object: &Object) -> MetadataResult<()> {
        let record = object.clone();
        self.update_object_records(&object.bucket, move |objects| {
            objects.retain(|o| o.key != record.key);
            objects.push(record);
        })
        .await
    }

    /// Remove the record for `key`. Returns whether a record was dropped.
    pub async fn remove_object_record(&self, bucket: &str, key: &str) -> MetadataResult<bool> {
        self.update_object_records(bucket, |objects| {
            let before = objects.len();
            objects.retain(|o| o.key != key);
            objects.len() != before
        })
        .await
    }

    pub async fn object_record_exists(&self, bucket: &str, key: &str) -> MetadataResult<bool> {
        Ok(self.find_object_record(bucket, key).await?.is_some())
    }

    /// The latest record for `key`, if any.
    pub async fn find_object_record(
        &self,
        bucket: &str,
        key: &str,
    ) -> MetadataResult<Option<Object>> {
        Ok(self
            .list_object_records(bucket)
            .await?
            .into_iter()
            .rev()
            .find(|o| o.key == key))
    }

    /// All object records of `bucket` in file order. Empty if the registry
    /// does not exist.
    pub async fn list_object_records(&self, bucket: &str) -> MetadataResult<Vec<Object>> {
        let path = self.object_registry_path(bucket);
        let _guard = self.locks.read(&lock_key(&path)).await;
        Ok(read_objects(&path, bucket).await?.unwrap_or_default())
    }

    /// Read-modify-write one bucket's object registry under its lock.
    ///
    /// An empty result removes the registry file instead of writing it.
    pub async fn update_object_records<F, T>(&self, bucket: &str, f: F) -> MetadataResult<T>
    where
        F: FnOnce(&mut Vec<Object>) -> T,
    {
        let path = self.object_registry_path(bucket);
        let _guard = self.locks.write(&lock_key(&path)).await;

        let existing = read_objects(&path, bucket).await?;
        let existed = existing.is_some();
        let mut objects = existing.unwrap_or_default();
        let out = f(&mut objects);

        if objects.is_empty() {
            if existed {
                remove_registry(&path).await?;
                debug!("removed empty object registry {}", path.display());
            }
        } else {
            let body: String = objects.iter().map(encode_object).collect();
            self.write_registry(&path, body.as_bytes()).await?;
        }
        Ok(out)
    }

    /// Write `body` to a staging file, sync it, and rename it over `path`.
    async fn write_registry(&self, path: &Path, body: &[u8]) -> MetadataResult<()> {
        let tmp_path = self.staging.join(format!("registry-{}", Uuid::new_v4()));
        let result: io::Result<()> = async {
            let mut file = File::create(&tmp_path).await?;
            file.write_all(body).await?;
            file.sync_all().await?;
            fs::rename(&tmp_path, path).await
        }
        .await;

        if let Err(source) = result {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(MetadataError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
        Ok(())
    }
}

fn lock_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Read and parse a registry. `Ok(None)` when the file does not exist.
async fn read_registry(path: &Path) -> MetadataResult<Option<Vec<RawRecord>>> {
    let text = match fs::read_to_string(path).await {
        Ok(text) => text,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(MetadataError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    records::parse_records(&text)
        .map(Some)
        .map_err(|source| MetadataError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
}

async fn remove_registry(path: &Path) -> MetadataResult<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(MetadataError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

async fn read_buckets(path: &Path) -> MetadataResult<Option<Vec<Bucket>>> {
    let Some(raw) = read_registry(path).await? else {
        return Ok(None);
    };
    raw.iter()
        .map(decode_bucket)
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
        .map_err(|source| MetadataError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
}

async fn read_objects(path: &Path, bucket: &str) -> MetadataResult<Option<Vec<Object>>> {
    let Some(raw) = read_registry(path).await? else {
        return Ok(None);
    };
    raw.iter()
        .map(|r| decode_object(r, bucket))
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
        .map_err(|source| MetadataError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
}

fn encode_bucket(bucket: &Bucket) -> String {
    records::encode_record(&[
        bucket.name.clone(),
        records::format_timestamp(&bucket.created_at),
        records::format_timestamp(&bucket.last_modified),
    ])
}

fn decode_bucket(record: &RawRecord) -> Result<Bucket, RecordError> {
    record.expect_fields(BUCKET_FIELDS)?;
    Ok(Bucket {
        name: record.fields[0].clone(),
        created_at: record.timestamp(1, "creation timestamp")?,
        last_modified: record.timestamp(2, "modification timestamp")?,
    })
}

fn encode_object(object: &Object) -> String {
    records::encode_record(&[
        object.key.clone(),
        object.size_bytes.to_string(),
        object.content_type.clone(),
        records::format_timestamp(&object.stored_at),
    ])
}

fn decode_object(record: &RawRecord, bucket: &str) -> Result<Object, RecordError> {
    record.expect_fields(OBJECT_FIELDS)?;
    let size_bytes = record.fields[1]
        .parse::<u64>()
        .map_err(|_| RecordError::InvalidField {
            line: record.line,
            field: "size",
            value: record.fields[1].clone(),
        })?;
    Ok(Object {
        bucket: bucket.to_string(),
        key: record.fields[0].clone(),
        size_bytes,
        content_type: record.fields[2].clone(),
        stored_at: record.timestamp(3, "stored timestamp")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::records::parse_timestamp;
    use tempfile::TempDir;

    async fn store() -> (TempDir, MetadataStore) {
        let dir = TempDir::new().unwrap();
        let staging = dir.path().join(".staging");
        fs::create_dir(&staging).await.unwrap();
        let store = MetadataStore::new(dir.path(), staging);
        (dir, store)
    }

    fn ts(value: &str) -> DateTime<Utc> {
        parse_timestamp(value).unwrap()
    }

    fn object(bucket: &str, key: &str, size: u64, at: &str) -> Object {
        Object {
            bucket: bucket.into(),
            key: key.into(),
            size_bytes: size,
            content_type: "text/plain".into(),
            stored_at: ts(at),
        }
    }

    #[tokio::test]
    async fn missing_bucket_registry_lists_empty() {
        let (_dir, store) = store().await;
        assert!(store.list_bucket_records().await.unwrap().is_empty());
        assert!(!store.remove_bucket_record("nope").await.unwrap());
        assert!(!store.bucket_registry_path().exists());
    }

    #[tokio::test]
    async fn append_writes_one_line_per_bucket_in_order() {
        let (_dir, store) = store().await;
        store
            .append_bucket_record("alpha", ts("2024-01-01T00:00:00Z"))
            .await
            .unwrap();
        store
            .append_bucket_record("beta", ts("2024-01-02T00:00:00Z"))
            .await
            .unwrap();

        let text = fs::read_to_string(store.bucket_registry_path())
            .await
            .unwrap();
        assert_eq!(
            text,
            "alpha,2024-01-01T00:00:00Z,2024-01-01T00:00:00Z\n\
             beta,2024-01-02T00:00:00Z,2024-01-02T00:00:00Z\n"
        );

        let names: Vec<_> = store
            .list_bucket_records()
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert_eq!(names, vec!["alpha", "beta"]);
    }

    #[tokio::test]
    async fn append_replaces_stale_record() {
        let (_dir, store) = store().await;
        store
            .append_bucket_record("alpha", ts("2024-01-01T00:00:00Z"))
            .await
            .unwrap();
        store
            .append_bucket_record("alpha", ts("2024-02-01T00:00:00Z"))
            .await
            .unwrap();
        let buckets = store.list_bucket_records().await.unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].created_at, ts("2024-02-01T00:00:00Z"));
    }

    #[tokio::test]
    async fn remove_matches_whole_name_only() {
        let (_dir, store) = store().await;
        let at = ts("2024-01-01T00:00:00Z");
        store.append_bucket_record("logs", at).await.unwrap();
        store.append_bucket_record("logs-2024", at).await.unwrap();

        assert!(store.remove_bucket_record("logs").await.unwrap());
        let buckets = store.list_bucket_records().await.unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].name, "logs-2024");

        assert!(store.remove_bucket_record("logs-2024").await.unwrap());
        assert!(store.list_bucket_records().await.unwrap().is_empty());
        // An emptied bucket registry stays on disk.
        assert!(store.bucket_registry_path().exists());
    }

    #[tokio::test]
    async fn touch_preserves_creation_and_other_records() {
        let (_dir, store) = store().await;
        let created = ts("2024-01-01T00:00:00Z");
        store.append_bucket_record("alpha", created).await.unwrap();
        store.append_bucket_record("beta", created).await.unwrap();

        let later = ts("2024-03-01T10:00:00Z");
        let touched = store
            .touch_bucket_record("alpha", later)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(touched.created_at, created);
        assert_eq!(touched.last_modified, later);

        let beta = store.find_bucket_record("beta").await.unwrap().unwrap();
        assert_eq!(beta.last_modified, created);

        // Never moves backwards.
        let again = store
            .touch_bucket_record("alpha", created)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(again.last_modified, later);

        assert!(
            store
                .touch_bucket_record("missing", later)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn corrupt_bucket_registry_is_reported() {
        let (_dir, store) = store().await;
        fs::write(store.bucket_registry_path(), "alpha,not-a-time,also-not\n")
            .await
            .unwrap();
        let err = store.list_bucket_records().await.unwrap_err();
        assert!(matches!(err, MetadataError::Corrupt { .. }));
        assert_eq!(io::Error::from(err).kind(), ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn upsert_replaces_existing_key() {
        let (dir, store) = store().await;
        fs::create_dir(dir.path().join("bkt")).await.unwrap();

        store
            .upsert_object_record(&object("bkt", "a.txt", 2, "2024-01-01T00:00:00Z"))
            .await
            .unwrap();
        store
            .upsert_object_record(&object("bkt", "b.txt", 5, "2024-01-01T00:00:01Z"))
            .await
            .unwrap();
        store
            .upsert_object_record(&object("bkt", "a.txt", 7, "2024-01-01T00:00:02Z"))
            .await
            .unwrap();

        let objects = store.list_object_records("bkt").await.unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].key, "b.txt");
        assert_eq!(objects[1].key, "a.txt");
        assert_eq!(objects[1].size_bytes, 7);
        assert!(store.object_record_exists("bkt", "a.txt").await.unwrap());
        assert!(!store.object_record_exists("bkt", "c.txt").await.unwrap());
    }

    #[tokio::test]
    async fn removing_last_object_deletes_registry_file() {
        let (dir, store) = store().await;
        fs::create_dir(dir.path().join("bkt")).await.unwrap();
        store
            .upsert_object_record(&object("bkt", "a.txt", 2, "2024-01-01T00:00:00Z"))
            .await
            .unwrap();
        let path = store.object_registry_path("bkt");
        assert_eq!(
            fs::read_to_string(&path).await.unwrap(),
            "a.txt,2,text/plain,2024-01-01T00:00:00Z\n"
        );

        assert!(!store.remove_object_record("bkt", "other").await.unwrap());
        assert!(path.exists());
        assert!(store.remove_object_record("bkt", "a.txt").await.unwrap());
        assert!(!path.exists());
        // Removing from a missing registry is a no-op.
        assert!(!store.remove_object_record("bkt", "a.txt").await.unwrap());
    }

    #[tokio::test]
    async fn keys_with_commas_survive_a_rewrite() {
        let (dir, store) = store().await;
        fs::create_dir(dir.path().join("bkt")).await.unwrap();
        let mut odd = object("bkt", "report, final \"v2\".txt", 9, "2024-01-01T00:00:00Z");
        odd.content_type = "text/plain; charset=utf-8".into();
        store.upsert_object_record(&odd).await.unwrap();

        let found = store
            .find_object_record("bkt", &odd.key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found, odd);
    }

    #[tokio::test]
    async fn concurrent_upserts_do_not_lose_records() {
        let (dir, store) = store().await;
        fs::create_dir(dir.path().join("bkt")).await.unwrap();
        let store = std::sync::Arc::new(store);

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .upsert_object_record(&object(
                        "bkt",
                        &format!("obj-{i}"),
                        i,
                        "2024-01-01T00:00:00Z",
                    ))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(store.list_object_records("bkt").await.unwrap().len(), 16);
    }
}
