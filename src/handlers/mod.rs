//! HTTP handlers, grouped by route family.

pub mod ai_handlers;
pub mod blob_handlers;
pub mod chat_handlers;
pub mod health_handlers;
pub mod upload_handlers;
