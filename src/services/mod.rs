//! Storage engine: name rules, flat-file registries, and the bucket/object
//! operations built on them.

pub mod bucket_service;
pub mod locks;
pub mod metadata_store;
pub mod object_service;
pub mod records;
pub mod storage_service;
pub mod validation;
