//! Browser-like request headers

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::HashMap;

/// User agent sent when none is configured
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/136.0.0.0 Safari/537.36";

/// Accept header for the event stream
pub fn accept_event_stream() -> &'static str {
    "text/event-stream"
}

/// Standard accept-language header
pub fn accept_language(lang: &str) -> String {
    if lang.is_empty() {
        "en-US,en;q=0.9".to_string()
    } else {
        format!("{},en-US;q=0.9,en;q=0.8", lang)
    }
}

/// Default headers for every request to `base_url`.
///
/// Invalid extra headers are skipped.
pub fn browser_headers(
    base_url: &str,
    user_agent: Option<&str>,
    extra: &HashMap<String, String>,
) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let mut insert = |name: &str, value: &str| {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.insert(name, value);
        }
    };

    insert("User-Agent", user_agent.unwrap_or(DEFAULT_USER_AGENT));
    insert("Referer", &format!("{}/", base_url));
    insert("Origin", base_url);
    insert("Accept-Language", &accept_language("en-US"));
    insert(
        "Sec-Ch-Ua",
        r#""Google Chrome";v="136", "Chromium";v="136", "Not.A/Brand";v="24""#,
    );
    insert("Sec-Ch-Ua-Mobile", "?0");
    insert("Sec-Ch-Ua-Platform", r#""Windows""#);
    insert("Sec-Fetch-Dest", "empty");
    insert("Sec-Fetch-Mode", "cors");
    insert("Sec-Fetch-Site", "same-origin");
    insert("DNT", "1");

    for (key, value) in extra {
        insert(key, value);
    }

    headers
}
