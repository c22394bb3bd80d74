//! Settings structures for the query client

use crate::citations::CitationMode;
use crate::models::DEFAULT_MODEL;
use crate::query::{SearchConfig, SearchFocus, Sources, TimeRange};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Default upstream service
pub const DEFAULT_BASE_URL: &str = "https://www.perplexity.ai";

/// Cookie carrying the session token
pub const SESSION_COOKIE: &str = "__Secure-next-auth.session-token";

/// Main settings structure, loaded from `settings.yml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub session: SessionSettings,
    pub outgoing: OutgoingSettings,
    pub limits: LimitSettings,
    pub query: QuerySettings,
}

impl Settings {
    /// Load settings from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = serde_yaml::from_str(&content)?;
        Ok(settings)
    }

    /// Merge with environment variables (PPLX_* prefix)
    pub fn merge_env(&mut self) {
        if let Ok(val) = std::env::var("PPLX_SESSION_TOKEN") {
            self.session.token = Some(val);
        }
        if let Ok(val) = std::env::var("PPLX_BASE_URL") {
            self.session.base_url = val;
        }
        if let Ok(val) = std::env::var("PPLX_LANGUAGE") {
            self.query.language = val;
        }
        if let Ok(val) = std::env::var("PPLX_TIMEZONE") {
            self.query.timezone = Some(val);
        }
        if let Ok(val) = std::env::var("PPLX_MODEL") {
            self.query.model = val;
        }
        if let Ok(val) = std::env::var("PPLX_CITATION_MODE") {
            if let Ok(mode) = val.parse() {
                self.query.citation_mode = mode;
            }
        }
    }
}

/// Upstream service and credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Scheme and host of the service, without trailing slash
    pub base_url: String,
    /// Session token cookie value
    pub token: Option<String>,
    /// Name of the session cookie
    pub cookie_name: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: None,
            cookie_name: SESSION_COOKIE.to_string(),
        }
    }
}

impl SessionSettings {
    /// Base URL with any trailing slash removed
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

/// Outgoing request settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutgoingSettings {
    /// Overall request timeout in seconds; bounds the whole SSE stream
    pub request_timeout: f64,
    /// Connect timeout in seconds
    pub connect_timeout: f64,
    /// Pool max idle connections per host
    pub pool_maxsize: usize,
    /// Verify SSL certificates
    pub verify_ssl: bool,
    /// Proxy settings
    pub proxies: ProxySettings,
    /// User agent string (none = built-in browser UA)
    pub user_agent: Option<String>,
    /// Extra headers to send
    pub extra_headers: HashMap<String, String>,
}

impl Default for OutgoingSettings {
    fn default() -> Self {
        Self {
            request_timeout: 1800.0,
            connect_timeout: 30.0,
            pool_maxsize: 20,
            verify_ssl: true,
            proxies: ProxySettings::default(),
            user_agent: None,
            extra_headers: HashMap::new(),
        }
    }
}

/// Proxy settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    pub http: Option<String>,
    pub https: Option<String>,
    pub all: Option<String>,
}

/// Attachment ceilings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitSettings {
    /// Attachment URLs accepted in one request
    pub max_attachment_urls: usize,
    /// Local files accepted in one upload batch
    pub max_files: usize,
    /// Largest accepted file, in bytes
    pub max_file_size: u64,
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            max_attachment_urls: 10,
            max_files: 30,
            max_file_size: 50 * 1024 * 1024,
        }
    }
}

/// Defaults applied to queries
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
    /// Model registry key
    pub model: String,
    pub citation_mode: CitationMode,
    pub language: String,
    pub timezone: Option<String>,
    pub search_focus: SearchFocus,
    pub sources: Sources,
    pub time_range: TimeRange,
    /// Keep threads in the account library
    pub save_to_library: bool,
    pub use_schematized_api: bool,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            citation_mode: CitationMode::Clean,
            language: "en-US".to_string(),
            timezone: None,
            search_focus: SearchFocus::Web,
            sources: Sources::default(),
            time_range: TimeRange::All,
            save_to_library: false,
            use_schematized_api: true,
        }
    }
}

impl QuerySettings {
    /// Search configuration built from these defaults
    pub fn search_config(&self) -> SearchConfig {
        SearchConfig {
            search_focus: self.search_focus,
            sources: self.sources.clone(),
            time_range: self.time_range,
            language: self.language.clone(),
            timezone: self.timezone.clone(),
            coordinates: None,
        }
    }
}
