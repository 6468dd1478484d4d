//! Object operations: put, get, head, list, delete.
//!
//! Object payloads live at `base_path/{bucket}/{key}`. Uploads stream into
//! the staging directory first and are renamed into place, so a failed
//! transfer never leaves a partial object behind. The rename and the
//! registry update of one key run under that key's lock, and under the
//! bucket's read lock so the directory cannot disappear midway.

use super::{
    records,
    storage_service::{
        StorageError, StorageResult, StorageService, is_dir, is_file, metadata_gap,
    },
    validation::{validate_bucket_name, validate_object_key},
};
use crate::models::object::{DEFAULT_CONTENT_TYPE, Object};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt, pin_mut};
use std::io::{self, ErrorKind};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::{debug, info};

fn object_lock_key(bucket: &str, key: &str) -> String {
    format!("{bucket}/{key}")
}

impl StorageService {
    /// Stream-upload an object and record it.
    ///
    /// - Writes the body to a staging file, counting bytes.
    /// - Renames it over `bucket/key` (overwrites replace content in full).
    /// - Upserts the object record and bumps the bucket's `last_modified`.
    ///
    /// A registry failure after the rename is reported as
    /// `StorageError::Metadata`; the new content stays in place.
    pub async fn put_object<S>(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<String>,
        stream: S,
    ) -> StorageResult<Object>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        validate_bucket_name(bucket)?;
        validate_object_key(key)?;
        if !is_dir(&self.bucket_root(bucket)).await {
            return Err(StorageError::BucketNotFound(bucket.to_string()));
        }

        let tmp_path = self.staging_file();
        let size_bytes = match write_stream(&tmp_path, stream).await {
            Ok(size) => size,
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
        };

        let _bucket_guard = self.bucket_locks.read(bucket).await;
        let _object_guard = self.object_locks.write(&object_lock_key(bucket, key)).await;

        // The bucket may have been deleted while the body was in flight.
        if !is_dir(&self.bucket_root(bucket)).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::BucketNotFound(bucket.to_string()));
        }

        let file_path = self.object_path(bucket, key);
        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        debug!("stored {} bytes at {}", size_bytes, file_path.display());

        let object = Object {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size_bytes,
            content_type: content_type
                .filter(|ct| !ct.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            stored_at: records::now(),
        };

        let operation = format!("writing object `{key}` in bucket `{bucket}`");
        self.metadata
            .upsert_object_record(&object)
            .await
            .map_err(metadata_gap(operation.clone()))?;
        self.metadata
            .touch_bucket_record(bucket, object.stored_at)
            .await
            .map_err(metadata_gap(operation))?;

        info!("put object {}/{} ({} bytes)", bucket, key, size_bytes);
        Ok(object)
    }

    /// Open an object for reading.
    ///
    /// Existence is decided by the file alone. The record, when present,
    /// supplies the content type and timestamp; otherwise the defaults and
    /// the file's modification time are used. The size always comes from
    /// the opened file.
    pub async fn get_object(&self, bucket: &str, key: &str) -> StorageResult<(Object, File)> {
        validate_bucket_name(bucket)?;
        validate_object_key(key)?;
        let not_found = || StorageError::ObjectNotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        };

        let _bucket_guard = self.bucket_locks.read(bucket).await;
        let _object_guard = self.object_locks.read(&object_lock_key(bucket, key)).await;

        let file = File::open(self.object_path(bucket, key))
            .await
            .map_err(|err| match err.kind() {
                ErrorKind::NotFound => not_found(),
                _ => StorageError::Io(err),
            })?;
        let file_meta = file.metadata().await?;
        if !file_meta.is_file() {
            return Err(not_found());
        }

        let record = self.metadata.find_object_record(bucket, key).await?;
        let stored_at = match &record {
            Some(record) => record.stored_at,
            None => file_meta
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| records::now()),
        };

        let object = Object {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size_bytes: file_meta.len(),
            content_type: record
                .map(|r| r.content_type)
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            stored_at,
        };
        Ok((object, file))
    }

    /// Fetch only the object record. Both the record and the file must exist.
    pub async fn head_object(&self, bucket: &str, key: &str) -> StorageResult<Object> {
        validate_bucket_name(bucket)?;
        validate_object_key(key)?;
        let _bucket_guard = self.bucket_locks.read(bucket).await;
        let _object_guard = self.object_locks.read(&object_lock_key(bucket, key)).await;

        let record = self.metadata.find_object_record(bucket, key).await?;
        let file_present = is_file(&self.object_path(bucket, key)).await;
        match record {
            Some(object) if file_present => Ok(object),
            _ => Err(StorageError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
        }
    }

    /// All object records of a bucket, in registry order.
    pub async fn list_objects(&self, bucket: &str) -> StorageResult<Vec<Object>> {
        validate_bucket_name(bucket)?;
        let _bucket_guard = self.bucket_locks.read(bucket).await;
        if !is_dir(&self.bucket_root(bucket)).await {
            return Err(StorageError::BucketNotFound(bucket.to_string()));
        }
        Ok(self.metadata.list_object_records(bucket).await?)
    }

    /// Delete an object file and its record.
    ///
    /// The record decides whether the object exists; the file must exist too.
    /// Removing the last record deletes the bucket's object registry, and the
    /// bucket's `last_modified` is bumped.
    pub async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        validate_bucket_name(bucket)?;
        validate_object_key(key)?;
        let not_found = || StorageError::ObjectNotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        };

        let _bucket_guard = self.bucket_locks.read(bucket).await;
        let _object_guard = self.object_locks.write(&object_lock_key(bucket, key)).await;

        if !self.metadata.object_record_exists(bucket, key).await? {
            return Err(not_found());
        }

        let file_path = self.object_path(bucket, key);
        match fs::remove_file(&file_path).await {
            Ok(()) => debug!("removed physical file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => return Err(not_found()),
            Err(err) => return Err(StorageError::Io(err)),
        }

        let operation = format!("deleting object `{key}` in bucket `{bucket}`");
        self.metadata
            .remove_object_record(bucket, key)
            .await
            .map_err(metadata_gap(operation.clone()))?;
        self.metadata
            .touch_bucket_record(bucket, records::now())
            .await
            .map_err(metadata_gap(operation))?;

        info!("deleted object {}/{}", bucket, key);
        Ok(())
    }
}

/// Copy `stream` into a new file at `path`, returning the byte count.
async fn write_stream<S>(path: &std::path::Path, stream: S) -> io::Result<u64>
where
    S: Stream<Item = io::Result<Bytes>>,
{
    let mut file = File::create(path).await?;
    let mut size_bytes: u64 = 0;
    pin_mut!(stream);
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        size_bytes += chunk.len() as u64;
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    file.sync_all().await?;
    Ok(size_bytes)
}
