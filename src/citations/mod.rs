//! Citation marker rewriting
//!
//! Answers reference search results with inline `[n]` markers. Depending on
//! the [`CitationMode`] these are left alone, turned into markdown links or
//! stripped.

use crate::response::SearchResultItem;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Matches `[n]` with one or two digits. The "not followed by a word
/// character" half is checked by hand since `regex` has no lookahead.
static CITATION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(\d{1,2})\]").unwrap());

/// How citation markers are rendered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CitationMode {
    /// Keep the service's `[n]` markers
    Default,
    /// `[n]` becomes `[n](url)`
    Markdown,
    /// Remove markers
    #[default]
    Clean,
}

impl CitationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CitationMode::Default => "default",
            CitationMode::Markdown => "markdown",
            CitationMode::Clean => "clean",
        }
    }
}

impl fmt::Display for CitationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CitationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(CitationMode::Default),
            "markdown" => Ok(CitationMode::Markdown),
            "clean" => Ok(CitationMode::Clean),
            other => Err(format!("unknown citation mode: {}", other)),
        }
    }
}

/// Rewrite citation markers in `text` according to `mode`
pub fn format_citations(mode: CitationMode, text: &str, results: &[SearchResultItem]) -> String {
    if mode == CitationMode::Default || text.is_empty() {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for cap in CITATION_RE.captures_iter(text) {
        let whole = cap.get(0).unwrap();
        if followed_by_word_char(text, whole.end()) {
            continue;
        }

        out.push_str(&text[last..whole.start()]);
        last = whole.end();

        match mode {
            CitationMode::Clean => {}
            CitationMode::Markdown => {
                let num = &cap[1];
                match citation_url(num, results) {
                    Some(url) => {
                        out.push('[');
                        out.push_str(num);
                        out.push_str("](");
                        out.push_str(url);
                        out.push(')');
                    }
                    None => out.push_str(whole.as_str()),
                }
            }
            CitationMode::Default => out.push_str(whole.as_str()),
        }
    }

    out.push_str(&text[last..]);
    out
}

/// URL of the 1-based result `num`, if it exists and is non-empty
fn citation_url<'a>(num: &str, results: &'a [SearchResultItem]) -> Option<&'a str> {
    let n: usize = num.parse().ok()?;
    let item = results.get(n.checked_sub(1)?)?;
    item.url.as_deref().filter(|u| !u.is_empty())
}

fn followed_by_word_char(text: &str, at: usize) -> bool {
    text[at..]
        .chars()
        .next()
        .map(|c| c.is_alphanumeric() || c == '_')
        .unwrap_or(false)
}
