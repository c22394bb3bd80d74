//! Merges successive SSE frames into a response snapshot

use super::types::{ResponseState, SearchResultItem, SseEvent};
use serde_json::{Map, Value};
use tracing::debug;

/// Step type marking the completed answer in a step list
const FINAL_STEP: &str = "FINAL";

/// Per-call response state machine.
///
/// Each call owns its own accumulator; nothing here is shared between calls.
#[derive(Debug, Clone, Default)]
pub struct ResponseAccumulator {
    state: ResponseState,
}

impl ResponseAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop everything accumulated so far
    pub fn reset(&mut self) {
        self.state = ResponseState::default();
    }

    /// Current state
    pub fn state(&self) -> &ResponseState {
        &self.state
    }

    /// Fold one frame into the state and return a snapshot of the result
    pub fn apply(&mut self, event: &SseEvent) -> ResponseState {
        if self.state.conversation_id.is_none() {
            if let Some(id) = event.backend_uuid() {
                self.state.conversation_id = Some(id.to_string());
            }
        }

        if let Some(text) = event.text() {
            if let Some(payload) = resolve_payload(text) {
                self.replace_answer(event.thread_title(), payload);
            }
        }

        self.state.clone()
    }

    /// Replace every answer-derived field from `payload`
    fn replace_answer(&mut self, event_title: Option<&str>, payload: Map<String, Value>) {
        let state = &mut self.state;

        state.title = event_title
            .or_else(|| payload.get("thread_title").and_then(Value::as_str))
            .map(str::to_string);
        state.answer = payload
            .get("answer")
            .and_then(Value::as_str)
            .map(str::to_string);
        state.chunks = payload
            .get("chunks")
            .and_then(Value::as_array)
            .map(|chunks| {
                chunks
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        state.last_chunk = state.chunks.last().cloned();
        state.search_results = payload
            .get("web_results")
            .and_then(Value::as_array)
            .map(|results| {
                results
                    .iter()
                    .filter_map(SearchResultItem::from_web_result)
                    .collect()
            })
            .unwrap_or_default();
        state.raw_payload = Value::Object(payload);
    }
}

/// Resolve a frame's `text` field into an answer payload.
///
/// The field is a JSON string holding either a list of steps or an answer
/// object. Returns `None` when nothing should be updated.
fn resolve_payload(text: &Value) -> Option<Map<String, Value>> {
    let decoded = match text {
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(value) => value,
            Err(e) => {
                debug!("Skipping undecodable text field: {}", e);
                return None;
            }
        },
        other => other.clone(),
    };

    match decoded {
        Value::Array(steps) => final_step_payload(&steps),
        Value::Object(payload) => Some(payload),
        _ => None,
    }
}

/// Payload of the first `FINAL` step, if any
fn final_step_payload(steps: &[Value]) -> Option<Map<String, Value>> {
    let step = steps
        .iter()
        .find(|step| step.get("step_type").and_then(Value::as_str) == Some(FINAL_STEP))?;

    let content = step
        .get("content")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    if let Some(Value::String(answer)) = content.get("answer") {
        if let Some(nested) = decode_embedded_answer(answer) {
            return Some(nested);
        }
    }

    Some(content)
}

/// Decode an answer that is itself a JSON-encoded payload.
///
/// Detection is a brace heuristic: a string starting with `{` and ending
/// with `}` is tried as a JSON object. Anything else, or a failed decode, is
/// literal answer text.
pub fn decode_embedded_answer(answer: &str) -> Option<Map<String, Value>> {
    if !(answer.starts_with('{') && answer.ends_with('}')) {
        return None;
    }
    serde_json::from_str::<Map<String, Value>>(answer).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(value: Value) -> SseEvent {
        SseEvent(value.as_object().unwrap().clone())
    }

    fn steps_event(steps: Value) -> SseEvent {
        event(json!({ "text": steps.to_string() }))
    }

    fn final_step(answer: &str) -> Value {
        json!({"step_type": "FINAL", "content": {"answer": answer}})
    }

    #[test]
    fn test_only_final_step_sets_answer() {
        let mut acc = ResponseAccumulator::new();
        let events = vec![
            steps_event(json!([{"step_type": "INITIAL_QUERY", "content": {}}])),
            steps_event(json!([{"step_type": "SEARCH_WEB", "content": {"queries": ["q"]}}])),
            steps_event(json!([
                {"step_type": "SEARCH_WEB", "content": {}},
                final_step(r#"{"answer": "Done[1]", "chunks": ["Do", "ne"], "web_results": [{"name": "A", "url": "https://a"}]}"#),
            ])),
        ];

        let snapshots: Vec<_> = events.iter().map(|e| acc.apply(e)).collect();

        assert!(snapshots[0].answer.is_none());
        assert!(snapshots[1].answer.is_none());
        assert!(snapshots[1].search_results.is_empty());
        let last = &snapshots[2];
        assert_eq!(last.answer.as_deref(), Some("Done[1]"));
        assert_eq!(last.chunks, vec!["Do", "ne"]);
        assert_eq!(last.last_chunk.as_deref(), Some("ne"));
        assert_eq!(last.search_results.len(), 1);
        assert_eq!(last.search_results[0].title.as_deref(), Some("A"));
        assert_eq!(last.raw_payload["answer"], "Done[1]");
    }

    #[test]
    fn test_literal_answer_uses_content() {
        let mut acc = ResponseAccumulator::new();
        let snapshot = acc.apply(&steps_event(json!([final_step("plain text answer")])));

        assert_eq!(snapshot.answer.as_deref(), Some("plain text answer"));
        assert!(snapshot.chunks.is_empty());
        assert!(snapshot.last_chunk.is_none());
    }

    #[test]
    fn test_brace_wrapped_but_invalid_json_is_literal() {
        let mut acc = ResponseAccumulator::new();
        let snapshot = acc.apply(&steps_event(json!([final_step("{not json}")])));
        assert_eq!(snapshot.answer.as_deref(), Some("{not json}"));
    }

    #[test]
    fn test_first_backend_uuid_wins() {
        let mut acc = ResponseAccumulator::new();
        acc.apply(&event(json!({"backend_uuid": "first"})));
        let snapshot = acc.apply(&event(json!({"backend_uuid": "second"})));
        assert_eq!(snapshot.conversation_id.as_deref(), Some("first"));

        acc.reset();
        let snapshot = acc.apply(&event(json!({"backend_uuid": "second"})));
        assert_eq!(snapshot.conversation_id.as_deref(), Some("second"));
    }

    #[test]
    fn test_dict_payload_without_answer_keys() {
        let mut acc = ResponseAccumulator::new();
        let snapshot = acc.apply(&event(json!({"text": "{\"thread_title\":\"T\"}"})));

        assert_eq!(snapshot.title.as_deref(), Some("T"));
        assert!(snapshot.answer.is_none());
        assert!(snapshot.chunks.is_empty());
        assert!(snapshot.search_results.is_empty());
        assert_eq!(snapshot.raw_payload, json!({"thread_title": "T"}));
    }

    #[test]
    fn test_event_title_takes_precedence() {
        let mut acc = ResponseAccumulator::new();
        let snapshot = acc.apply(&event(json!({
            "thread_title": "From event",
            "text": "{\"thread_title\":\"From payload\",\"answer\":\"x\"}"
        })));
        assert_eq!(snapshot.title.as_deref(), Some("From event"));
    }

    #[test]
    fn test_later_event_replaces_not_merges() {
        let mut acc = ResponseAccumulator::new();
        acc.apply(&event(json!({
            "text": "{\"answer\":\"a\",\"chunks\":[\"a\"],\"web_results\":[{\"url\":\"u\"}]}"
        })));
        let snapshot = acc.apply(&event(json!({"text": "{\"answer\":\"b\"}"})));

        assert_eq!(snapshot.answer.as_deref(), Some("b"));
        assert!(snapshot.chunks.is_empty());
        assert!(snapshot.search_results.is_empty());
    }

    #[test]
    fn test_non_object_web_results_dropped() {
        let mut acc = ResponseAccumulator::new();
        let snapshot = acc.apply(&event(json!({
            "text": "{\"web_results\":[\"junk\", 3, {\"name\":\"ok\",\"snippet\":\"s\"}]}"
        })));
        assert_eq!(snapshot.search_results.len(), 1);
        assert_eq!(snapshot.search_results[0].snippet.as_deref(), Some("s"));
        assert!(snapshot.search_results[0].url.is_none());
    }

    #[test]
    fn test_undecodable_text_is_skipped() {
        let mut acc = ResponseAccumulator::new();
        acc.apply(&event(json!({"text": "{\"answer\":\"kept\"}"})));
        let snapshot = acc.apply(&event(json!({"text": "{broken", "backend_uuid": "id"})));

        assert_eq!(snapshot.answer.as_deref(), Some("kept"));
        assert_eq!(snapshot.conversation_id.as_deref(), Some("id"));
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut acc = ResponseAccumulator::new();
        let first = acc.apply(&event(json!({"text": "{\"answer\":\"one\"}"})));
        acc.apply(&event(json!({"text": "{\"answer\":\"two\"}"})));

        assert_eq!(first.answer.as_deref(), Some("one"));
        assert_eq!(acc.state().answer.as_deref(), Some("two"));
    }

    #[test]
    fn test_embedded_answer_heuristic() {
        assert!(decode_embedded_answer("{\"answer\":\"x\"}").is_some());
        assert!(decode_embedded_answer("answer {x}").is_none());
        assert!(decode_embedded_answer(" {\"a\":1}").is_none());
    }
}
