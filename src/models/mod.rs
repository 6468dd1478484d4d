//! Core data models for the object storage service.
//!
//! These entities mirror the records kept in the bucket and object
//! registries and serialize naturally via `serde`.

pub mod bucket;
pub mod object;
