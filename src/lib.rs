//! pplx-client: a streaming client for the Perplexity web query protocol
//!
//! A query is built into an immutable [`request::QueryRequest`], submitted
//! through a [`PerplexityClient`] and consumed from the returned
//! [`CallHandle`], either to completion with [`CallHandle::run`] or as a lazy
//! stream of [`ResponseState`] snapshots with [`CallHandle::stream`].

pub mod attachments;
pub mod citations;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod network;
pub mod query;
pub mod request;
pub mod response;

pub use citations::{format_citations, CitationMode};
pub use client::{AskOptions, CallHandle, PerplexityClient};
pub use config::Settings;
pub use error::{Error, Result};
pub use models::{ModelDescriptor, ModelRegistry};
pub use query::{SearchConfig, SearchFocus, SourceFocus, TimeRange};
pub use response::{ResponseState, SearchResultItem};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
