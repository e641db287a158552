//! Service layer: blob storage, content fetching, AI analysis, study chat and
//! the upload pipeline that ties them together.

pub mod analysis;
pub mod blob_store;
pub mod chat;
pub mod fetcher;
pub mod prompts;
pub mod upload_service;
