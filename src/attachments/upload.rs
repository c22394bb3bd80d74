//! Attachment upload
//!
//! Each file is uploaded in two steps: the service hands out a pre-signed
//! destination for a fresh uuid, then the file is posted there as a
//! multipart form. The object URL is what goes into the query.

use super::validate::{validate_files, AttachmentDescriptor};
use crate::config::LimitSettings;
use crate::error::{Error, Result};
use crate::network::{HttpRequest, MultipartForm, Transport};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Path of the upload-URL endpoint
pub const UPLOAD_URL_PATH: &str = "/rest/uploads/batch_create_upload_urls";

#[derive(Debug, Deserialize)]
struct UploadUrlResponse {
    #[serde(default)]
    results: HashMap<String, UploadSlot>,
}

/// Pre-signed destination for one file
#[derive(Debug, Clone, Deserialize)]
pub struct UploadSlot {
    pub s3_bucket_url: String,
    pub s3_object_url: String,
    #[serde(default)]
    pub fields: HashMap<String, String>,
}

/// Validates local files and uploads them over the shared session
#[derive(Clone)]
pub struct AttachmentUploader {
    transport: Arc<dyn Transport>,
    base_url: String,
    limits: LimitSettings,
}

impl AttachmentUploader {
    pub fn new(
        transport: Arc<dyn Transport>,
        base_url: impl Into<String>,
        limits: LimitSettings,
    ) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
            limits,
        }
    }

    /// Validate `paths` against the configured limits
    pub fn validate<P: AsRef<Path>>(&self, paths: &[P]) -> Result<Vec<AttachmentDescriptor>> {
        validate_files(paths, &self.limits)
    }

    /// Validate every path, then upload them in order.
    ///
    /// The first failure aborts the batch; no partial list is returned.
    pub async fn upload_all<P: AsRef<Path>>(&self, paths: &[P]) -> Result<Vec<String>> {
        let descriptors = self.validate(paths)?;
        if descriptors.is_empty() {
            return Ok(Vec::new());
        }

        info!("Uploading {} attachment(s)", descriptors.len());
        let mut urls = Vec::with_capacity(descriptors.len());
        for descriptor in &descriptors {
            urls.push(self.upload(descriptor).await?);
        }
        Ok(urls)
    }

    /// Upload one validated file and return its object URL
    pub async fn upload(&self, descriptor: &AttachmentDescriptor) -> Result<String> {
        self.try_upload(descriptor)
            .await
            .map_err(|source| Error::Upload {
                path: descriptor.path.clone(),
                source: Box::new(source),
            })
    }

    async fn try_upload(&self, descriptor: &AttachmentDescriptor) -> Result<String> {
        let file_id = Uuid::new_v4().to_string();
        let slot = self.request_slot(&file_id, descriptor).await?;

        let content = tokio::fs::read(&descriptor.path).await?;
        let form = MultipartForm {
            fields: slot.fields.into_iter().collect(),
            file_field: "file".to_string(),
            file_name: descriptor.file_name(),
            content_type: descriptor.mime_type.clone(),
            content,
        };

        self.transport
            .execute(HttpRequest::post(&slot.s3_bucket_url).multipart(form))
            .await?
            .error_for_status()?;

        debug!("Uploaded {} as {}", descriptor.path.display(), slot.s3_object_url);
        Ok(slot.s3_object_url)
    }

    /// Ask the service for a destination bound to `file_id`
    pub async fn request_slot(
        &self,
        file_id: &str,
        descriptor: &AttachmentDescriptor,
    ) -> Result<UploadSlot> {
        let mut files = serde_json::Map::new();
        files.insert(
            file_id.to_string(),
            json!({
                "filename": descriptor.file_name(),
                "content_type": descriptor.mime_type,
                "source": "default",
                "file_size": descriptor.size,
                "force_image": descriptor.is_image,
            }),
        );
        let body = json!({ "files": files });

        let response = self
            .transport
            .execute(HttpRequest::post(format!("{}{}", self.base_url, UPLOAD_URL_PATH)).json(body))
            .await?
            .error_for_status()?;

        let mut parsed: UploadUrlResponse = response.json()?;
        parsed.results.remove(file_id).ok_or_else(|| {
            Error::UnexpectedResponse(format!("no upload destination for file {}", file_id))
        })
    }
}
