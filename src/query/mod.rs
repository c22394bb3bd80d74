//! Search configuration
//!
//! Per-call options describing where and how the service should search:
//! - Search focus: web search or writing-only
//! - Source focus: one or several source sets
//! - Time range: recency filter (absent for all time)
//! - Locale: language, timezone and optional coordinates

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Whether the answer is grounded in a web search
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchFocus {
    #[default]
    Web,
    Writing,
}

impl SearchFocus {
    /// Wire value
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchFocus::Web => "internet",
            SearchFocus::Writing => "writing",
        }
    }
}

/// Source set to search
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFocus {
    /// The entire internet
    #[default]
    Web,
    /// Academic papers
    Academic,
    /// Discussions and opinions
    Social,
    /// SEC filings
    Finance,
}

impl SourceFocus {
    /// Wire value
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFocus::Web => "web",
            SourceFocus::Academic => "scholar",
            SourceFocus::Social => "social",
            SourceFocus::Finance => "edgar",
        }
    }
}

impl FromStr for SourceFocus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "web" => Ok(SourceFocus::Web),
            "academic" | "scholar" => Ok(SourceFocus::Academic),
            "social" => Ok(SourceFocus::Social),
            "finance" | "edgar" => Ok(SourceFocus::Finance),
            other => Err(format!("unknown source focus: {}", other)),
        }
    }
}

/// One source or an ordered set of sources
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Sources {
    One(SourceFocus),
    Many(Vec<SourceFocus>),
}

impl Sources {
    /// Wire values, always as a list
    pub fn wire_values(&self) -> Vec<&'static str> {
        match self {
            Sources::One(source) => vec![source.as_str()],
            Sources::Many(sources) => sources.iter().map(SourceFocus::as_str).collect(),
        }
    }
}

impl Default for Sources {
    fn default() -> Self {
        Sources::One(SourceFocus::Web)
    }
}

impl From<SourceFocus> for Sources {
    fn from(source: SourceFocus) -> Self {
        Sources::One(source)
    }
}

impl From<Vec<SourceFocus>> for Sources {
    fn from(sources: Vec<SourceFocus>) -> Self {
        Sources::Many(sources)
    }
}

/// Recency filter for search results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeRange {
    #[default]
    All,
    Today,
    LastWeek,
    LastMonth,
    LastYear,
}

impl TimeRange {
    /// Wire value; `None` for all time, which the service expects as `null`
    pub fn as_filter(&self) -> Option<&'static str> {
        match self {
            TimeRange::All => None,
            TimeRange::Today => Some("DAY"),
            TimeRange::LastWeek => Some("WEEK"),
            TimeRange::LastMonth => Some("MONTH"),
            TimeRange::LastYear => Some("YEAR"),
        }
    }
}

impl FromStr for TimeRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(TimeRange::All),
            "day" | "today" => Ok(TimeRange::Today),
            "week" | "last_week" => Ok(TimeRange::LastWeek),
            "month" | "last_month" => Ok(TimeRange::LastMonth),
            "year" | "last_year" => Ok(TimeRange::LastYear),
            other => Err(format!("unknown time range: {}", other)),
        }
    }
}

/// Client location
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// Search options for one call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    pub search_focus: SearchFocus,
    pub sources: Sources,
    pub time_range: TimeRange,
    pub language: String,
    pub timezone: Option<String>,
    pub coordinates: Option<Coordinates>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            search_focus: SearchFocus::Web,
            sources: Sources::default(),
            time_range: TimeRange::All,
            language: "en-US".to_string(),
            timezone: None,
            coordinates: None,
        }
    }
}

impl SearchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search_focus(mut self, focus: SearchFocus) -> Self {
        self.search_focus = focus;
        self
    }

    pub fn sources(mut self, sources: impl Into<Sources>) -> Self {
        self.sources = sources.into();
        self
    }

    pub fn time_range(mut self, range: TimeRange) -> Self {
        self.time_range = range;
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    pub fn coordinates(mut self, lat: f64, lng: f64) -> Self {
        self.coordinates = Some(Coordinates { lat, lng });
        self
    }
}
