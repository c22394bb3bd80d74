//! HTTP networking module
//!
//! Provides the shared authenticated session, browser headers, SSE line
//! decoding and the [`Transport`] seam the protocol client talks through.

mod client;
mod headers;
pub mod sse;
mod transport;

pub use client::HttpClient;
pub use headers::{accept_event_stream, accept_language, browser_headers, DEFAULT_USER_AGENT};
pub use transport::*;
