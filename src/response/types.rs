//! Response type definitions

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One decoded `data: ` frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SseEvent(pub Map<String, Value>);

impl SseEvent {
    /// Decode the JSON remainder of a data line. Non-object JSON is rejected.
    pub fn parse(data: &str) -> serde_json::Result<Self> {
        serde_json::from_str::<Map<String, Value>>(data).map(SseEvent)
    }

    /// Backend/session identifier of the thread
    pub fn backend_uuid(&self) -> Option<&str> {
        self.0.get("backend_uuid").and_then(Value::as_str)
    }

    pub fn thread_title(&self) -> Option<&str> {
        self.0.get("thread_title").and_then(Value::as_str)
    }

    pub fn text(&self) -> Option<&Value> {
        self.0.get("text")
    }

    /// True when the frame ends the exchange
    pub fn is_final(&self) -> bool {
        match self.0.get("final") {
            Some(Value::Bool(b)) => *b,
            Some(Value::Null) | None => false,
            Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Array(a)) => !a.is_empty(),
            Some(Value::Object(o)) => !o.is_empty(),
        }
    }
}

impl From<Map<String, Value>> for SseEvent {
    fn from(map: Map<String, Value>) -> Self {
        SseEvent(map)
    }
}

/// A web result cited by the answer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResultItem {
    pub title: Option<String>,
    pub snippet: Option<String>,
    pub url: Option<String>,
}

impl SearchResultItem {
    /// Map a `web_results` entry (`name`/`snippet`/`url`); non-objects yield `None`
    pub fn from_web_result(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let field = |key: &str| obj.get(key).and_then(Value::as_str).map(str::to_string);
        Some(Self {
            title: field("name"),
            snippet: field("snippet"),
            url: field("url"),
        })
    }
}

/// Accumulated response at one point of the stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseState {
    pub title: Option<String>,
    pub answer: Option<String>,
    pub chunks: Vec<String>,
    /// Always the last element of `chunks`
    pub last_chunk: Option<String>,
    pub search_results: Vec<SearchResultItem>,
    /// Identifier of the thread, from the first frame carrying one
    pub conversation_id: Option<String>,
    /// The resolved answer payload
    pub raw_payload: Value,
}

impl Default for ResponseState {
    fn default() -> Self {
        Self {
            title: None,
            answer: None,
            chunks: Vec::new(),
            last_chunk: None,
            search_results: Vec::new(),
            conversation_id: None,
            raw_payload: Value::Object(Map::new()),
        }
    }
}

impl ResponseState {
    /// True when no frame has contributed anything yet
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.answer.is_none()
            && self.chunks.is_empty()
            && self.search_results.is_empty()
            && self.conversation_id.is_none()
    }
}
