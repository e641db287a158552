//! Data models for the upload service.
//!
//! `upload` holds the per-request values of the upload pipeline; `blob` is the
//! metadata row the local blob store persists through `sqlx`.

pub mod blob;
pub mod upload;
