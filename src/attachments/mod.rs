//! Attachment handling
//!
//! Local files are validated against count and size ceilings before any
//! network traffic, then uploaded one by one to obtain the URLs a query
//! references.

mod upload;
mod validate;

pub use upload::{AttachmentUploader, UploadSlot, UPLOAD_URL_PATH};
pub use validate::{validate_files, AttachmentDescriptor};
