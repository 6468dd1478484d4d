//! Represents an object (file) stored in a bucket.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Content type recorded when the client does not declare one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Metadata for a single object within a bucket.
///
/// The payload lives in `{root}/{bucket}/{key}`; this struct is the matching
/// record of the bucket's object registry, not the content bytes.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Object {
    /// Name of the owning bucket.
    pub bucket: String,

    /// Object key, unique within the bucket.
    pub key: String,

    /// Size in bytes, as written.
    pub size_bytes: u64,

    /// Content type (MIME type).
    pub content_type: String,

    /// Time of the most recent write.
    pub stored_at: DateTime<Utc>,
}
