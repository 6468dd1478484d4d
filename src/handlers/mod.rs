//! HTTP handlers. They translate requests into `StorageService` calls and
//! results into XML (or streamed) responses.

pub mod bucket_handlers;
pub mod health_handlers;
pub mod object_handlers;
pub mod xml;
