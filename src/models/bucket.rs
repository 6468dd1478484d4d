//! Represents a logical bucket — a top-level container for objects.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A storage bucket, backed by a directory under the storage root.
///
/// The descriptor mirrors one record of the bucket registry. A bucket exists
/// only while both its directory and its registry record exist.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Bucket {
    /// Globally unique bucket name (doubles as the directory name).
    pub name: String,

    /// When this bucket was created. Never changes afterwards.
    pub created_at: DateTime<Utc>,

    /// Last time an object inside the bucket was added or removed.
    pub last_modified: DateTime<Utc>,
}

impl Bucket {
    pub fn new(name: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            created_at: at,
            last_modified: at,
        }
    }
}
