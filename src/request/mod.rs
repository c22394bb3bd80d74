//! Query request construction
//!
//! [`RequestBuilder`] turns a query, a model and a [`SearchConfig`] into an
//! immutable [`QueryRequest`] whose [`QueryRequest::payload`] is the exact JSON
//! body posted to the ask endpoint.

use crate::error::{Error, Result};
use crate::models::ModelDescriptor;
use crate::query::SearchConfig;
use serde::Serialize;

/// Protocol version announced in every payload
pub const PAYLOAD_VERSION: &str = "2.18";

/// Default ceiling on attachment URLs per query
pub const DEFAULT_MAX_ATTACHMENT_URLS: usize = 10;

/// A fully specified query, ready to submit
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub query_text: String,
    pub model: ModelDescriptor,
    pub search: SearchConfig,
    pub attachment_urls: Vec<String>,
    /// Save the thread to the account library (sent as `!is_incognito`)
    pub persist_result: bool,
    pub use_schematized_api: bool,
}

impl QueryRequest {
    /// Wire payload for the ask endpoint
    pub fn payload(&self) -> AskPayload<'_> {
        AskPayload {
            params: AskParams {
                attachments: &self.attachment_urls,
                language: &self.search.language,
                timezone: self.search.timezone.as_deref(),
                client_coordinates: self.search.coordinates.map(|c| ClientCoordinates {
                    location_lat: c.lat,
                    location_lng: c.lng,
                    name: "",
                }),
                sources: self.search.sources.wire_values(),
                model_preference: self.model.identifier,
                mode: self.model.mode,
                search_focus: self.search.search_focus.as_str(),
                search_recency_filter: self.search.time_range.as_filter(),
                is_incognito: !self.persist_result,
                use_schematized_api: self.use_schematized_api,
                local_search_enabled: true,
                prompt_source: "user",
                send_back_text_in_streaming_api: true,
                version: PAYLOAD_VERSION,
            },
            query_str: &self.query_text,
        }
    }

    /// Payload as a JSON value
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self.payload())?)
    }
}

/// Body of the ask request
#[derive(Debug, Serialize)]
pub struct AskPayload<'a> {
    pub params: AskParams<'a>,
    pub query_str: &'a str,
}

#[derive(Debug, Serialize)]
pub struct AskParams<'a> {
    pub attachments: &'a [String],
    pub language: &'a str,
    pub timezone: Option<&'a str>,
    pub client_coordinates: Option<ClientCoordinates>,
    pub sources: Vec<&'static str>,
    pub model_preference: &'static str,
    pub mode: &'static str,
    pub search_focus: &'static str,
    pub search_recency_filter: Option<&'static str>,
    pub is_incognito: bool,
    pub use_schematized_api: bool,
    pub local_search_enabled: bool,
    pub prompt_source: &'static str,
    pub send_back_text_in_streaming_api: bool,
    pub version: &'static str,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ClientCoordinates {
    pub location_lat: f64,
    pub location_lng: f64,
    pub name: &'static str,
}

/// Assembles [`QueryRequest`]s
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    max_attachment_urls: usize,
    use_schematized_api: bool,
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self {
            max_attachment_urls: DEFAULT_MAX_ATTACHMENT_URLS,
            use_schematized_api: true,
        }
    }
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the attachment URL ceiling
    pub fn with_max_attachment_urls(mut self, max: usize) -> Self {
        self.max_attachment_urls = max;
        self
    }

    pub fn with_schematized_api(mut self, enabled: bool) -> Self {
        self.use_schematized_api = enabled;
        self
    }

    pub fn max_attachment_urls(&self) -> usize {
        self.max_attachment_urls
    }

    /// Fail if `count` attachments would exceed the ceiling
    pub fn check_attachment_count(&self, count: usize) -> Result<()> {
        if count > self.max_attachment_urls {
            return Err(Error::Validation(format!(
                "at most {} attachments allowed, got {}",
                self.max_attachment_urls, count
            )));
        }
        Ok(())
    }

    /// Build a request, rejecting an oversized attachment list
    pub fn build(
        &self,
        query_text: impl Into<String>,
        attachment_urls: Vec<String>,
        model: ModelDescriptor,
        persist_result: bool,
        search: SearchConfig,
    ) -> Result<QueryRequest> {
        self.check_attachment_count(attachment_urls.len())?;

        Ok(QueryRequest {
            query_text: query_text.into(),
            model,
            search,
            attachment_urls,
            persist_result,
            use_schematized_api: self.use_schematized_api,
        })
    }
}
