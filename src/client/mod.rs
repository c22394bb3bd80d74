//! Streaming protocol client
//!
//! [`PerplexityClient`] owns the shared authenticated session. Queries are
//! turned into [`CallHandle`]s, which run the two-phase exchange (session
//! priming, then the SSE POST) either to completion or as a lazy stream of
//! snapshots.

mod call;

pub use call::{CallHandle, ASK_PATH, SEARCH_NEW_PATH};

use crate::attachments::AttachmentUploader;
use crate::citations::CitationMode;
use crate::config::{QuerySettings, Settings};
use crate::error::{Error, Result};
use crate::models::{ModelDescriptor, ModelRegistry};
use crate::network::{HttpClient, Transport};
use crate::query::SearchConfig;
use crate::request::{QueryRequest, RequestBuilder};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Per-query options
#[derive(Debug, Clone, PartialEq)]
pub struct AskOptions {
    pub model: ModelDescriptor,
    pub citation_mode: CitationMode,
    /// Keep the thread in the account library
    pub save_to_library: bool,
    pub search: SearchConfig,
}

impl Default for AskOptions {
    fn default() -> Self {
        Self {
            model: ModelRegistry::default_model(),
            citation_mode: CitationMode::default(),
            save_to_library: false,
            search: SearchConfig::default(),
        }
    }
}

impl AskOptions {
    /// Options from configured defaults; fails on an unknown model key
    pub fn from_settings(query: &QuerySettings) -> Result<Self> {
        let model = ModelRegistry::get(&query.model)
            .ok_or_else(|| Error::Validation(format!("unknown model: {}", query.model)))?;

        Ok(Self {
            model,
            citation_mode: query.citation_mode,
            save_to_library: query.save_to_library,
            search: query.search_config(),
        })
    }

    pub fn model(mut self, model: ModelDescriptor) -> Self {
        self.model = model;
        self
    }

    pub fn citation_mode(mut self, mode: CitationMode) -> Self {
        self.citation_mode = mode;
        self
    }

    pub fn save_to_library(mut self, save: bool) -> Self {
        self.save_to_library = save;
        self
    }

    pub fn search(mut self, search: SearchConfig) -> Self {
        self.search = search;
        self
    }
}

/// Client for the query/response protocol.
///
/// Cheap to clone; clones share the session. Response state lives in each
/// call, never on the client, so concurrent calls do not interfere.
#[derive(Clone)]
pub struct PerplexityClient {
    transport: Arc<dyn Transport>,
    base_url: String,
    builder: RequestBuilder,
    uploader: AttachmentUploader,
    defaults: QuerySettings,
}

impl PerplexityClient {
    /// Create a client with a fresh authenticated session
    pub fn new(settings: &Settings) -> Result<Self> {
        let http = HttpClient::with_settings(&settings.session, &settings.outgoing)?;
        Ok(Self::with_transport(Arc::new(http), settings))
    }

    /// Create a client over an existing transport
    pub fn with_transport(transport: Arc<dyn Transport>, settings: &Settings) -> Self {
        let base_url = settings.session.base_url().to_string();
        let builder = RequestBuilder::new()
            .with_max_attachment_urls(settings.limits.max_attachment_urls)
            .with_schematized_api(settings.query.use_schematized_api);
        let uploader =
            AttachmentUploader::new(transport.clone(), base_url.clone(), settings.limits);

        Self {
            transport,
            base_url,
            builder,
            uploader,
            defaults: settings.query.clone(),
        }
    }

    /// Options built from the configured query defaults
    pub fn default_options(&self) -> Result<AskOptions> {
        AskOptions::from_settings(&self.defaults)
    }

    pub fn request_builder(&self) -> &RequestBuilder {
        &self.builder
    }

    pub fn uploader(&self) -> &AttachmentUploader {
        &self.uploader
    }

    /// Wrap a built request in a handle. No network traffic happens here.
    pub fn submit(&self, request: QueryRequest, citation_mode: CitationMode) -> CallHandle {
        CallHandle::new(
            self.transport.clone(),
            self.base_url.clone(),
            request,
            citation_mode,
        )
    }

    /// Validate and upload `files`, build the request and return its handle.
    ///
    /// Validation errors surface before any request is made; an upload
    /// failure aborts the whole query.
    pub async fn ask<P: AsRef<Path>>(
        &self,
        query: &str,
        files: &[P],
        options: AskOptions,
    ) -> Result<CallHandle> {
        let descriptors = self.uploader.validate(files)?;
        self.builder.check_attachment_count(descriptors.len())?;

        let mut attachment_urls = Vec::with_capacity(descriptors.len());
        for descriptor in &descriptors {
            attachment_urls.push(self.uploader.upload(descriptor).await?);
        }
        if !attachment_urls.is_empty() {
            info!("Attached {} file(s)", attachment_urls.len());
        }

        let request = self.builder.build(
            query,
            attachment_urls,
            options.model,
            options.save_to_library,
            options.search,
        )?;
        Ok(self.submit(request, options.citation_mode))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachments::UPLOAD_URL_PATH;
    use crate::config::{OutgoingSettings, SessionSettings, SESSION_COOKIE};
    use crate::network::{HttpRequest, HttpResponse, RequestBody, StreamingResponse};
    use crate::response::ResponseState;
    use async_trait::async_trait;
    use futures::stream::{self, StreamExt};
    use futures::TryStreamExt;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    const BASE: &str = "https://svc.test";

    type Responder = Box<dyn Fn(&HttpRequest) -> (u16, String) + Send + Sync>;

    /// Flags the connection as closed when the body stream is dropped
    struct CloseSignal(Arc<AtomicBool>);

    impl Drop for CloseSignal {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    struct FakeTransport {
        respond: Responder,
        stream_status: u16,
        chunks: Vec<Vec<u8>>,
        requests: Mutex<Vec<HttpRequest>>,
        streams_opened: AtomicUsize,
        closed: Arc<AtomicBool>,
    }

    impl FakeTransport {
        fn new(chunks: Vec<String>) -> Self {
            Self {
                respond: Box::new(|_| (200, String::new())),
                stream_status: 200,
                chunks: chunks.into_iter().map(String::into_bytes).collect(),
                requests: Mutex::new(Vec::new()),
                streams_opened: AtomicUsize::new(0),
                closed: Arc::new(AtomicBool::new(false)),
            }
        }

        fn respond_with(
            mut self,
            respond: impl Fn(&HttpRequest) -> (u16, String) + Send + Sync + 'static,
        ) -> Self {
            self.respond = Box::new(respond);
            self
        }

        fn stream_status(mut self, status: u16) -> Self {
            self.stream_status = status;
            self
        }

        fn requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().unwrap().clone()
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
            let (status, text) = (self.respond)(&request);
            let url = request.url.clone();
            self.requests.lock().unwrap().push(request);
            Ok(HttpResponse { status, text, url })
        }

        async fn open_stream(&self, request: HttpRequest) -> Result<StreamingResponse> {
            let url = request.url.clone();
            self.requests.lock().unwrap().push(request);
            self.streams_opened.fetch_add(1, Ordering::SeqCst);
            self.closed.store(false, Ordering::SeqCst);

            let state = (self.chunks.clone().into_iter(), CloseSignal(self.closed.clone()));
            let body = stream::unfold(state, |(mut chunks, signal)| async move {
                chunks.next().map(|chunk| (Ok(chunk), (chunks, signal)))
            })
            .boxed();

            Ok(StreamingResponse {
                status: self.stream_status,
                url,
                body,
            })
        }
    }

    fn frame(value: Value) -> String {
        format!("data: {}\n\n", value)
    }

    fn progress_frame(uuid: &str) -> String {
        frame(json!({
            "backend_uuid": uuid,
            "text": json!([{"step_type": "SEARCH_WEB", "content": {"queries": ["rust"]}}])
                .to_string(),
        }))
    }

    fn final_frame(uuid: &str) -> String {
        let answer = json!({
            "answer": "Rust is fast[1].",
            "chunks": ["Rust ", "is fast[1]."],
            "web_results": [{"name": "Rust", "snippet": "lang", "url": "https://rust-lang.org"}],
        });
        frame(json!({
            "backend_uuid": uuid,
            "thread_title": "Rust",
            "final": true,
            "text": json!([
                {"step_type": "SEARCH_WEB", "content": {}},
                {"step_type": "FINAL", "content": {"answer": answer.to_string()}},
            ]).to_string(),
        }))
    }

    fn full_exchange() -> Vec<String> {
        vec![
            progress_frame("thread-1"),
            ": keep-alive\n\n".to_string(),
            "data: {broken\n\n".to_string(),
            final_frame("thread-2"),
            frame(json!({"text": "{\"answer\":\"IGNORED\"}"})),
        ]
    }

    fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.session.base_url = BASE.to_string();
        settings
    }

    fn client(fake: &Arc<FakeTransport>) -> PerplexityClient {
        PerplexityClient::with_transport(fake.clone(), &settings())
    }

    fn handle(client: &PerplexityClient, mode: CitationMode) -> CallHandle {
        let request = client
            .request_builder()
            .build(
                "what is rust",
                vec![],
                ModelRegistry::default_model(),
                false,
                SearchConfig::default(),
            )
            .unwrap();
        client.submit(request, mode)
    }

    #[tokio::test]
    async fn test_run_primes_then_streams() {
        let fake = Arc::new(FakeTransport::new(full_exchange()));
        let call = handle(&client(&fake), CitationMode::Markdown);

        let state = call.run().await.unwrap();

        assert_eq!(state.answer.as_deref(), Some("Rust is fast[1](https://rust-lang.org)."));
        assert_eq!(state.title.as_deref(), Some("Rust"));
        assert_eq!(state.conversation_id.as_deref(), Some("thread-1"));
        assert_eq!(state.last_chunk.as_deref(), Some("is fast[1]."));
        assert_eq!(state.search_results.len(), 1);

        let requests = fake.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].url, format!("{}{}", BASE, SEARCH_NEW_PATH));
        assert_eq!(requests[0].params, vec![("q".to_string(), "what is rust".to_string())]);
        assert_eq!(requests[1].url, format!("{}{}", BASE, ASK_PATH));
        match &requests[1].data {
            Some(RequestBody::Json(body)) => {
                assert_eq!(body["query_str"], "what is rust");
                assert_eq!(body["params"]["model_preference"], "pplx_pro");
            }
            other => panic!("unexpected body: {other:?}"),
        }
        assert!(fake.is_closed());
    }

    #[tokio::test]
    async fn test_stream_yields_per_frame_and_stops_at_final() {
        let fake = Arc::new(FakeTransport::new(full_exchange()));
        let call = handle(&client(&fake), CitationMode::Clean);

        let snapshots: Vec<ResponseState> = call.stream().try_collect().await.unwrap();

        assert_eq!(snapshots.len(), 2);
        assert!(snapshots[0].answer.is_none());
        assert_eq!(snapshots[0].conversation_id.as_deref(), Some("thread-1"));
        assert_eq!(snapshots[1].answer.as_deref(), Some("Rust is fast."));
        assert!(fake.is_closed());
    }

    #[tokio::test]
    async fn test_cancellation_closes_connection() {
        let chunks = vec![
            progress_frame("a"),
            progress_frame("a"),
            progress_frame("a"),
        ];
        let fake = Arc::new(FakeTransport::new(chunks));
        let call = handle(&client(&fake), CitationMode::Clean);

        let mut snapshots = call.stream();
        let first = snapshots.next().await.unwrap().unwrap();
        assert_eq!(first.conversation_id.as_deref(), Some("a"));
        assert!(!fake.is_closed());

        drop(snapshots);
        assert!(fake.is_closed());
    }

    #[tokio::test]
    async fn test_stream_is_lazy() {
        let fake = Arc::new(FakeTransport::new(full_exchange()));
        let call = handle(&client(&fake), CitationMode::Clean);

        let snapshots = call.stream();
        assert!(fake.requests().is_empty());
        drop(snapshots);
        assert!(fake.requests().is_empty());
    }

    #[tokio::test]
    async fn test_natural_end_without_final() {
        let fake = Arc::new(FakeTransport::new(vec![
            progress_frame("x"),
            frame(json!({"text": "{\"answer\":\"partial\"}"})),
        ]));
        let state = handle(&client(&fake), CitationMode::Clean).run().await.unwrap();

        assert_eq!(state.answer.as_deref(), Some("partial"));
        assert_eq!(state.conversation_id.as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn test_empty_stream_returns_empty_state() {
        let fake = Arc::new(FakeTransport::new(vec![]));
        let state = handle(&client(&fake), CitationMode::Clean).run().await.unwrap();
        assert!(state.is_empty());
    }

    #[tokio::test]
    async fn test_priming_forbidden_aborts_before_post() {
        let fake = Arc::new(
            FakeTransport::new(full_exchange()).respond_with(|_| (403, String::new())),
        );
        let err = handle(&client(&fake), CitationMode::Clean).run().await.unwrap_err();

        assert!(matches!(err, Error::Authentication));
        assert_eq!(fake.streams_opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_ask_status_classification() {
        let fake = Arc::new(FakeTransport::new(full_exchange()).stream_status(429));
        let mut snapshots = handle(&client(&fake), CitationMode::Clean).stream();

        let err = snapshots.next().await.unwrap().unwrap_err();
        assert!(matches!(err, Error::RateLimit));
        assert!(snapshots.next().await.is_none());
        assert!(fake.is_closed());

        let fake = Arc::new(FakeTransport::new(full_exchange()).stream_status(502));
        let err = handle(&client(&fake), CitationMode::Clean).run().await.unwrap_err();
        assert!(matches!(err, Error::Protocol { status: 502, .. }));
    }

    #[tokio::test]
    async fn test_each_run_is_a_fresh_exchange() {
        let fake = Arc::new(FakeTransport::new(full_exchange()));
        let call = handle(&client(&fake), CitationMode::Default);

        let first = call.run().await.unwrap();
        let second = call.run().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(second.answer.as_deref(), Some("Rust is fast[1]."));
        assert_eq!(fake.requests().len(), 4);
    }

    #[tokio::test]
    async fn test_concurrent_calls_do_not_share_state() {
        let fake = Arc::new(FakeTransport::new(full_exchange()));
        let client = client(&fake);
        let a = handle(&client, CitationMode::Clean);
        let b = handle(&client, CitationMode::Default);

        let (a, b) = futures::join!(a.run(), b.run());
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.answer.as_deref(), Some("Rust is fast."));
        assert_eq!(b.answer.as_deref(), Some("Rust is fast[1]."));
        assert_eq!(a.conversation_id, b.conversation_id);
        assert_eq!(fake.streams_opened.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_ask_rejects_too_many_files_before_network() {
        let dir = tempfile::TempDir::new().unwrap();
        let files: Vec<_> = (0..3)
            .map(|i| {
                let path = dir.path().join(format!("f{}.txt", i));
                std::fs::write(&path, b"x").unwrap();
                path
            })
            .collect();

        let fake = Arc::new(FakeTransport::new(vec![]));
        let mut settings = settings();
        settings.limits.max_attachment_urls = 2;
        let client = PerplexityClient::with_transport(fake.clone(), &settings);

        let err = client
            .ask("q", &files, AskOptions::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Validation(_)));
        assert!(fake.requests().is_empty());
    }

    #[tokio::test]
    async fn test_ask_uploads_then_attaches() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("diagram.png");
        std::fs::write(&path, b"\x89PNG").unwrap();

        let bucket = format!("{}/bucket", BASE);
        let bucket_url = bucket.clone();
        let fake = Arc::new(FakeTransport::new(full_exchange()).respond_with(move |request| {
            if request.url.ends_with(UPLOAD_URL_PATH) {
                let Some(RequestBody::Json(body)) = &request.data else {
                    return (400, String::new());
                };
                let id = body["files"].as_object().unwrap().keys().next().unwrap().clone();
                let mut results = serde_json::Map::new();
                results.insert(
                    id,
                    json!({"s3_bucket_url": bucket_url, "s3_object_url": "https://cdn.test/obj"}),
                );
                (200, json!({ "results": results }).to_string())
            } else if request.url == bucket_url {
                (204, String::new())
            } else {
                (200, String::new())
            }
        }));

        let call = client(&fake)
            .ask("describe", &[&path], AskOptions::default())
            .await
            .unwrap();
        assert_eq!(call.request().attachment_urls, vec!["https://cdn.test/obj"]);

        call.run().await.unwrap();
        let requests = fake.requests();
        assert!(requests[0].url.ends_with(UPLOAD_URL_PATH));
        assert_eq!(requests[1].url, bucket);
        assert!(matches!(requests[1].data, Some(RequestBody::Multipart(_))));
        match &requests[3].data {
            Some(RequestBody::Json(body)) => {
                assert_eq!(body["params"]["attachments"], json!(["https://cdn.test/obj"]))
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ask_upload_failure_aborts_query() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"x").unwrap();

        let fake = Arc::new(
            FakeTransport::new(full_exchange()).respond_with(|_| (403, String::new())),
        );
        let err = client(&fake)
            .ask("q", &[&path], AskOptions::default())
            .await
            .err()
            .unwrap();

        assert!(err.is_authentication());
        assert_eq!(fake.requests().len(), 1);
        assert_eq!(fake.streams_opened.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_options_from_settings() {
        let mut query = QuerySettings::default();
        query.model = "research".to_string();
        query.citation_mode = CitationMode::Markdown;
        let options = AskOptions::from_settings(&query).unwrap();
        assert_eq!(options.model.identifier, "pplx_alpha");
        assert_eq!(options.citation_mode, CitationMode::Markdown);

        query.model = "missing".to_string();
        assert!(matches!(AskOptions::from_settings(&query), Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_http_end_to_end() {
        use wiremock::matchers::{body_partial_json, header, method, path, query_param};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let cookie = format!("{}=token", SESSION_COOKIE);
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(SEARCH_NEW_PATH))
            .and(header("cookie", cookie.as_str()))
            .and(query_param("q", "what is rust"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(ASK_PATH))
            .and(header("cookie", cookie.as_str()))
            .and(body_partial_json(json!({"query_str": "what is rust"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(full_exchange().concat(), "text/event-stream"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let settings = Settings {
            session: SessionSettings {
                base_url: server.uri(),
                token: Some("token".to_string()),
                ..Default::default()
            },
            outgoing: OutgoingSettings::default(),
            ..Default::default()
        };
        let client = PerplexityClient::new(&settings).unwrap();
        let state = handle(&client, CitationMode::Clean).run().await.unwrap();

        assert_eq!(state.answer.as_deref(), Some("Rust is fast."));
        assert_eq!(state.conversation_id.as_deref(), Some("thread-1"));
    }

    #[tokio::test]
    async fn test_http_priming_cookies_replayed_on_ask() {
        use wiremock::matchers::{header, header_regex, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let session = format!("{}=tok123", SESSION_COOKIE);
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(SEARCH_NEW_PATH))
            .and(header("cookie", session.as_str()))
            .respond_with(
                ResponseTemplate::new(200).insert_header("set-cookie", "visitor=abc; Path=/"),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(ASK_PATH))
            .and(header_regex("cookie", &regex::escape(&session)))
            .and(header_regex("cookie", "visitor=abc"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(full_exchange().concat(), "text/event-stream"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut settings = Settings::default();
        settings.session.base_url = server.uri();
        settings.session.token = Some("tok123".to_string());
        let client = PerplexityClient::new(&settings).unwrap();

        let state = handle(&client, CitationMode::Clean).run().await.unwrap();
        assert_eq!(state.answer.as_deref(), Some("Rust is fast."));
    }

    #[tokio::test]
    async fn test_http_forbidden_ask() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(SEARCH_NEW_PATH))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(ASK_PATH))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let mut settings = Settings::default();
        settings.session.base_url = server.uri();
        settings.session.token = Some("expired".to_string());
        let client = PerplexityClient::new(&settings).unwrap();

        let err = handle(&client, CitationMode::Clean).run().await.unwrap_err();
        assert!(err.is_authentication());
    }
}
