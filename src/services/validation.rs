//! Name rules for buckets and object keys.
//!
//! Both checks are pure and run before any filesystem mutation.

use super::storage_service::{StorageError, StorageResult};

pub const BUCKET_NAME_MIN_LEN: usize = 3;
pub const BUCKET_NAME_MAX_LEN: usize = 63;
/// Keys are stored as single file names, so they share the filesystem's
/// `NAME_MAX` limit.
pub const MAX_OBJECT_KEY_LEN: usize = 255;

/// File name of the bucket registry inside the storage root.
pub const BUCKET_REGISTRY_FILE: &str = "buckets.csv";
/// File name of the per-bucket object registry.
pub const OBJECT_REGISTRY_FILE: &str = "objects.csv";

/// Validate bucket name format.
///
/// - 3–63 characters
/// - lowercase letters, digits, dots, hyphens only
/// - must start and end with a letter or digit
/// - cannot contain consecutive dots
pub fn validate_bucket_name(name: &str) -> StorageResult<()> {
    let invalid = |reason: &str| StorageError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let len = name.len();
    if !(BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&len) {
        return Err(invalid("must be between 3 and 63 characters"));
    }

    if !name
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
    {
        return Err(invalid(
            "allowed characters are lowercase letters, digits, dots, and hyphens",
        ));
    }

    let alnum = |c: Option<char>| c.is_some_and(|c| c.is_ascii_alphanumeric());
    if !alnum(name.chars().next()) || !alnum(name.chars().last()) {
        return Err(invalid("must start and end with a lowercase letter or digit"));
    }

    if name.contains("..") {
        return Err(invalid("cannot contain consecutive dots"));
    }

    if name == BUCKET_REGISTRY_FILE {
        return Err(invalid("name is reserved for the bucket registry"));
    }

    Ok(())
}

/// Object keys are single path segments stored directly inside the bucket
/// directory, so anything that could escape it or shadow the registry is
/// rejected.
pub fn validate_object_key(key: &str) -> StorageResult<()> {
    let invalid = |reason: &str| StorageError::InvalidName {
        name: key.to_string(),
        reason: reason.to_string(),
    };

    if key.is_empty() {
        return Err(invalid("object key is required"));
    }
    if key.len() > MAX_OBJECT_KEY_LEN {
        return Err(invalid("object key exceeds 255 bytes"));
    }
    if key == "." || key == ".." {
        return Err(invalid("object key cannot be a relative path component"));
    }
    if key
        .chars()
        .any(|c| c == '/' || c == '\\' || c.is_control())
    {
        return Err(invalid(
            "object key cannot contain slashes or control characters",
        ));
    }
    if key == OBJECT_REGISTRY_FILE {
        return Err(invalid("object key is reserved for the object registry"));
    }
    Ok(())
}
