//! Values flowing through the upload pipeline.

use bytes::Bytes;
use serde::Serialize;

/// Mime type accepted alongside any `image/*` type.
pub const PDF_MIME: &str = "application/pdf";

/// A single file pulled out of the multipart request body.
#[derive(Clone, Debug)]
pub struct FilePayload {
    /// Raw file contents, fully buffered.
    pub bytes: Bytes,

    /// Filename as sent by the client.
    pub original_name: String,

    /// Content type declared by the client for this part.
    pub mime_type: String,
}

impl FilePayload {
    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_image(&self) -> bool {
        is_image_mime(&self.mime_type)
    }
}

/// Outcome of one upload request. Never persisted by the pipeline itself.
///
/// `analyzed` is only ever true for images, and `analysis_text` is never empty:
/// when no generated text is available it carries a fixed fallback message.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    /// Identifier assigned by the blob store.
    pub blob_id: String,

    /// Durable address of the stored content.
    pub url: String,

    pub mime_type: String,

    pub size_bytes: u64,

    pub is_image: bool,

    /// True only when the AI call completed within the deadline.
    pub analyzed: bool,

    pub analysis_text: String,

    pub original_name: String,
}

/// Lowercased `type/subtype` of a content type, parameters dropped.
///
/// `None` unless both halves are present and free of whitespace.
pub fn mime_essence(raw: &str) -> Option<String> {
    let essence = raw.split(';').next()?.trim().to_ascii_lowercase();
    let (kind, subtype) = essence.split_once('/')?;
    let well_formed = |part: &str| !part.is_empty() && !part.contains(char::is_whitespace);
    (well_formed(kind) && well_formed(subtype)).then_some(essence)
}

/// `image/png`, `IMAGE/JPEG; q=1` and friends. A bare `image/` is not an image.
pub fn is_image_mime(mime: &str) -> bool {
    mime_essence(mime).is_some_and(|essence| essence.starts_with("image/"))
}

/// Images and PDFs are the only uploads the service accepts.
pub fn is_accepted_mime(mime: &str) -> bool {
    mime_essence(mime).is_some_and(|essence| essence.starts_with("image/") || essence == PDF_MIME)
}
