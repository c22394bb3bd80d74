//! Error types for the query client

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building, uploading or streaming a query
#[derive(Debug, Error)]
pub enum Error {
    /// Bad call arguments (too many attachment URLs, empty session token, ...)
    #[error("validation error: {0}")]
    Validation(String),

    /// More local files than the configured ceiling
    #[error("too many files: {count} given, at most {max} allowed")]
    TooManyFiles { count: usize, max: usize },

    /// A local attachment could not be used
    #[error(transparent)]
    FileAccess(#[from] FileAccessError),

    /// HTTP 403 from the upstream service
    #[error("authentication failed: session token invalid or expired")]
    Authentication,

    /// HTTP 429 from the upstream service
    #[error("rate limited by the upstream service")]
    RateLimit,

    /// Any other non-2xx status
    #[error("HTTP {status} from {url}")]
    Protocol { status: u16, url: String },

    /// A failed attachment upload
    #[error("upload of {} failed: {source}", path.display())]
    Upload {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },

    /// A 2xx response whose body did not have the expected shape
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Problems with a local file referenced as an attachment
#[derive(Debug, Error)]
pub enum FileAccessError {
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("not a regular file: {}", .0.display())]
    NotAFile(PathBuf),

    #[error("file is empty: {}", .0.display())]
    Empty(PathBuf),

    #[error("file too large: {} is {size} bytes, limit is {max} bytes", path.display())]
    TooLarge { path: PathBuf, size: u64, max: u64 },
}

impl Error {
    /// Map a non-2xx HTTP status onto the error taxonomy
    pub fn from_status(status: u16, url: impl Into<String>) -> Self {
        match status {
            403 => Error::Authentication,
            429 => Error::RateLimit,
            _ => Error::Protocol {
                status,
                url: url.into(),
            },
        }
    }

    /// True for a rejected session token, including one surfaced by an upload
    pub fn is_authentication(&self) -> bool {
        match self {
            Error::Authentication => true,
            Error::Upload { source, .. } => source.is_authentication(),
            _ => false,
        }
    }

    /// True when the caller should back off before retrying
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Error::RateLimit => true,
            Error::Upload { source, .. } => source.is_rate_limited(),
            _ => false,
        }
    }
}

/// Fail with the classified error unless `status` is 2xx
pub fn check_status(status: u16, url: &str) -> Result<()> {
    if (200..300).contains(&status) {
        Ok(())
    } else {
        Err(Error::from_status(status, url))
    }
}
