//! Transport seam between the protocol client and the HTTP session

use crate::error::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::HashMap;

/// Body chunks of a streaming response
pub type ByteStream = BoxStream<'static, Result<Vec<u8>>>;

/// HTTP request to be made against the service
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// URL to request
    pub url: String,
    /// HTTP method
    pub method: HttpMethod,
    /// Request headers
    pub headers: HashMap<String, String>,
    /// Query parameters, in order
    pub params: Vec<(String, String)>,
    /// Request body
    pub data: Option<RequestBody>,
}

impl HttpRequest {
    /// Create a GET request
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(url, HttpMethod::Get)
    }

    /// Create a POST request
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(url, HttpMethod::Post)
    }

    fn new(url: impl Into<String>, method: HttpMethod) -> Self {
        Self {
            url: url.into(),
            method,
            headers: HashMap::new(),
            params: Vec::new(),
            data: None,
        }
    }

    /// Add a header
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Add a query parameter
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Add JSON body
    pub fn json(mut self, data: serde_json::Value) -> Self {
        self.data = Some(RequestBody::Json(data));
        self
    }

    /// Add a multipart form body
    pub fn multipart(mut self, form: MultipartForm) -> Self {
        self.data = Some(RequestBody::Multipart(form));
        self
    }
}

/// HTTP method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// Request body types
#[derive(Debug, Clone)]
pub enum RequestBody {
    Json(serde_json::Value),
    Multipart(MultipartForm),
}

/// Text fields followed by a single file part
#[derive(Debug, Clone)]
pub struct MultipartForm {
    pub fields: Vec<(String, String)>,
    pub file_field: String,
    pub file_name: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

/// Fully read HTTP response
#[derive(Debug)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body as text
    pub text: String,
    /// Response URL (after redirects)
    pub url: String,
}

impl HttpResponse {
    /// Parse response as JSON
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.text)?)
    }

    /// Check if response is successful (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Fail with the classified status error unless 2xx
    pub fn error_for_status(self) -> Result<Self> {
        crate::error::check_status(self.status, &self.url)?;
        Ok(self)
    }
}

/// Response whose body is consumed incrementally.
///
/// Dropping `body` releases the underlying connection.
pub struct StreamingResponse {
    pub status: u16,
    pub url: String,
    pub body: ByteStream,
}

impl std::fmt::Debug for StreamingResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingResponse")
            .field("status", &self.status)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

/// Something that can carry requests over the authenticated session.
///
/// Implementations must be safe to share between concurrent calls.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute a request and read the whole body
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;

    /// Execute a request and hand back the body as a stream
    async fn open_stream(&self, request: HttpRequest) -> Result<StreamingResponse>;
}
