//! Bucket operations: create, list, delete.
//!
//! A bucket is a directory under the storage root plus one record in the
//! bucket registry. Directory changes happen under the bucket's write lock.

use super::{
    records,
    storage_service::{StorageError, StorageResult, StorageService, is_dir, metadata_gap},
    validation::validate_bucket_name,
};
use crate::models::bucket::Bucket;
use std::io::ErrorKind;
use tokio::fs;
use tracing::{debug, info};

impl StorageService {
    /// Create a bucket directory and its registry record.
    ///
    /// Uses an exclusive directory create, so a concurrent create of the same
    /// name sees `BucketAlreadyExists` instead of racing a separate check.
    pub async fn create_bucket(&self, name: &str) -> StorageResult<Bucket> {
        validate_bucket_name(name)?;
        let _guard = self.bucket_locks.write(name).await;

        let bucket_root = self.bucket_root(name);
        match fs::create_dir(&bucket_root).await {
            Ok(()) => debug!("created bucket directory {}", bucket_root.display()),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(StorageError::BucketAlreadyExists(name.to_string()));
            }
            Err(err) => return Err(StorageError::Io(err)),
        }

        let bucket = self
            .metadata
            .append_bucket_record(name, records::now())
            .await
            .map_err(metadata_gap(format!("creating bucket `{name}`")))?;

        info!("created bucket {}", name);
        Ok(bucket)
    }

    /// All buckets known to the registry, in registry order.
    ///
    /// This does not cross-check the filesystem; `reconcile` does that.
    pub async fn list_buckets(&self) -> StorageResult<Vec<Bucket>> {
        Ok(self.metadata.list_bucket_records().await?)
    }

    /// Delete an empty bucket.
    ///
    /// - `BucketNotFound` if either the record or the directory is missing
    /// - `BucketNotEmpty` if the directory has any entry left
    pub async fn delete_bucket(&self, name: &str) -> StorageResult<()> {
        validate_bucket_name(name)?;
        let _guard = self.bucket_locks.write(name).await;

        if self.metadata.find_bucket_record(name).await?.is_none() {
            return Err(StorageError::BucketNotFound(name.to_string()));
        }

        let bucket_root = self.bucket_root(name);
        if !is_dir(&bucket_root).await {
            return Err(StorageError::BucketNotFound(name.to_string()));
        }

        let mut entries = fs::read_dir(&bucket_root).await?;
        if entries.next_entry().await?.is_some() {
            return Err(StorageError::BucketNotEmpty(name.to_string()));
        }

        fs::remove_dir(&bucket_root).await?;

        self.metadata
            .remove_bucket_record(name)
            .await
            .map_err(metadata_gap(format!("deleting bucket `{name}`")))?;

        info!("deleted bucket {}", name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn service() -> (TempDir, StorageService) {
        let dir = TempDir::new().unwrap();
        let service = StorageService::open(dir.path().join("data")).await.unwrap();
        (dir, service)
    }

    #[tokio::test]
    async fn create_makes_directory_and_record() {
        let (_dir, service) = service().await;
        let bucket = service.create_bucket("photos").await.unwrap();
        assert_eq!(bucket.name, "photos");
        assert_eq!(bucket.created_at, bucket.last_modified);
        assert!(service.bucket_root("photos").is_dir());

        let listed = service.list_buckets().await.unwrap();
        assert_eq!(listed, vec![bucket]);
    }

    #[tokio::test]
    async fn invalid_name_touches_nothing() {
        let (_dir, service) = service().await;
        let err = service.create_bucket("Bad_Name").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidName { .. }));
        assert!(!service.bucket_root("Bad_Name").exists());
        assert!(!service.metadata.bucket_registry_path().exists());
    }

    #[tokio::test]
    async fn create_with_corrupt_registry_keeps_directory() {
        let (_dir, service) = service().await;
        fs::write(service.metadata.bucket_registry_path(), "x,bad,bad\n")
            .await
            .unwrap();

        let err = service.create_bucket("abc").await.unwrap_err();
        assert!(
            matches!(err, StorageError::Metadata { ref operation, .. } if operation.contains("abc")),
            "{err:?}"
        );
        assert!(service.bucket_root("abc").is_dir());
        assert_eq!(
            fs::read_to_string(service.metadata.bucket_registry_path())
                .await
                .unwrap(),
            "x,bad,bad\n"
        );
    }

    #[tokio::test]
    async fn duplicate_create_leaves_one_record() {
        let (_dir, service) = service().await;
        service.create_bucket("photos").await.unwrap();
        let err = service.create_bucket("photos").await.unwrap_err();
        assert!(matches!(err, StorageError::BucketAlreadyExists(ref n) if n == "photos"));
        assert_eq!(service.list_buckets().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_creates_of_same_name_yield_one_bucket() {
        let (_dir, service) = service().await;
        let (a, b) = tokio::join!(
            service.create_bucket("racer"),
            service.create_bucket("racer")
        );
        assert!(a.is_ok() != b.is_ok());
        assert_eq!(service.list_buckets().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_is_empty_without_registry() {
        let (_dir, service) = service().await;
        assert!(service.list_buckets().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_requires_record_and_directory() {
        let (_dir, service) = service().await;
        assert!(matches!(
            service.delete_bucket("ghost").await,
            Err(StorageError::BucketNotFound(_))
        ));

        // Record without a directory.
        service
            .metadata
            .append_bucket_record("orphan", records::now())
            .await
            .unwrap();
        assert!(matches!(
            service.delete_bucket("orphan").await,
            Err(StorageError::BucketNotFound(_))
        ));

        // Directory without a record.
        fs::create_dir(service.bucket_root("stray")).await.unwrap();
        assert!(matches!(
            service.delete_bucket("stray").await,
            Err(StorageError::BucketNotFound(_))
        ));
        assert!(service.bucket_root("stray").is_dir());
    }

    #[tokio::test]
    async fn delete_refuses_non_empty_bucket() {
        let (_dir, service) = service().await;
        let created = service.create_bucket("full").await.unwrap();
        fs::write(service.bucket_root("full").join("leftover"), b"x")
            .await
            .unwrap();

        assert!(matches!(
            service.delete_bucket("full").await,
            Err(StorageError::BucketNotEmpty(_))
        ));
        assert!(service.bucket_root("full").is_dir());
        assert_eq!(service.list_buckets().await.unwrap(), vec![created]);
    }

    #[tokio::test]
    async fn delete_removes_directory_and_record() {
        let (_dir, service) = service().await;
        service.create_bucket("keep").await.unwrap();
        service.create_bucket("drop").await.unwrap();

        service.delete_bucket("drop").await.unwrap();
        assert!(!service.bucket_root("drop").exists());
        let names: Vec<_> = service
            .list_buckets()
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert_eq!(names, vec!["keep"]);
    }
}
