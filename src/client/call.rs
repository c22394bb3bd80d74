//! One query exchange: session priming, SSE POST and frame accumulation

use crate::citations::{format_citations, CitationMode};
use crate::error::{check_status, Result};
use crate::network::sse::{parse_event_line, LineDecoder};
use crate::network::{accept_event_stream, ByteStream, HttpRequest, Transport};
use crate::request::QueryRequest;
use crate::response::{ResponseAccumulator, ResponseState, SseEvent};
use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info};

/// Path of the session-priming endpoint
pub const SEARCH_NEW_PATH: &str = "/search/new";

/// Path of the streaming ask endpoint
pub const ASK_PATH: &str = "/rest/sse/perplexity_ask";

/// A submitted query.
///
/// Every call to [`CallHandle::run`] or [`CallHandle::stream`] performs a
/// fresh exchange with its own response state.
#[derive(Clone)]
pub struct CallHandle {
    transport: Arc<dyn Transport>,
    base_url: String,
    request: Arc<QueryRequest>,
    citation_mode: CitationMode,
}

impl CallHandle {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        base_url: String,
        request: QueryRequest,
        citation_mode: CitationMode,
    ) -> Self {
        Self {
            transport,
            base_url,
            request: Arc::new(request),
            citation_mode,
        }
    }

    pub fn request(&self) -> &QueryRequest {
        &self.request
    }

    /// Run the exchange to completion and return the final snapshot.
    ///
    /// Returns an empty state if the stream carried no usable frame.
    pub async fn run(&self) -> Result<ResponseState> {
        let mut snapshots = self.stream();
        let mut last = ResponseState::default();
        while let Some(snapshot) = snapshots.try_next().await? {
            last = snapshot;
        }
        Ok(last)
    }

    /// Lazily stream one snapshot per accepted frame.
    ///
    /// Nothing is sent until the first poll. Dropping the stream closes the
    /// connection.
    pub fn stream(&self) -> BoxStream<'static, Result<ResponseState>> {
        let exchange = Exchange {
            transport: self.transport.clone(),
            base_url: self.base_url.clone(),
            request: self.request.clone(),
            citation_mode: self.citation_mode,
            phase: Phase::Pending,
        };

        stream::try_unfold(exchange, |mut exchange| async move {
            let next = exchange.next_snapshot().await?;
            Ok(next.map(|snapshot| (snapshot, exchange)))
        })
        .boxed()
    }
}

enum Phase {
    Pending,
    Open(EventReader),
    Finished,
}

struct Exchange {
    transport: Arc<dyn Transport>,
    base_url: String,
    request: Arc<QueryRequest>,
    citation_mode: CitationMode,
    phase: Phase,
}

impl Exchange {
    async fn next_snapshot(&mut self) -> Result<Option<ResponseState>> {
        if let Phase::Pending = self.phase {
            let body = open(&self.transport, &self.base_url, &self.request).await?;
            self.phase = Phase::Open(EventReader::new(body));
        }

        let Phase::Open(reader) = &mut self.phase else {
            return Ok(None);
        };

        match reader.next_event().await? {
            Some(event) => {
                let snapshot = reader.accumulator.apply(&event);
                if event.is_final() {
                    debug!("Final frame received, closing stream");
                    self.phase = Phase::Finished;
                }
                Ok(Some(render(snapshot, self.citation_mode)))
            }
            None => {
                debug!("Stream ended without a final frame");
                self.phase = Phase::Finished;
                Ok(None)
            }
        }
    }
}

/// Prime the session, then open the SSE POST
async fn open(
    transport: &Arc<dyn Transport>,
    base_url: &str,
    request: &QueryRequest,
) -> Result<ByteStream> {
    let prime = HttpRequest::get(format!("{}{}", base_url, SEARCH_NEW_PATH))
        .param("q", request.query_text.as_str());
    transport.execute(prime).await?.error_for_status()?;
    debug!("Session primed");

    let ask = HttpRequest::post(format!("{}{}", base_url, ASK_PATH))
        .header("Accept", accept_event_stream())
        .json(request.to_json()?);
    let response = transport.open_stream(ask).await?;
    check_status(response.status, &response.url)?;

    info!("Streaming answer from model {}", request.model.identifier);
    Ok(response.body)
}

/// Pulls decoded events off the response body
struct EventReader {
    body: ByteStream,
    decoder: LineDecoder,
    lines: VecDeque<String>,
    body_done: bool,
    accumulator: ResponseAccumulator,
}

impl EventReader {
    fn new(body: ByteStream) -> Self {
        Self {
            body,
            decoder: LineDecoder::new(),
            lines: VecDeque::new(),
            body_done: false,
            accumulator: ResponseAccumulator::new(),
        }
    }

    async fn next_event(&mut self) -> Result<Option<SseEvent>> {
        loop {
            while let Some(line) = self.lines.pop_front() {
                if let Some(event) = parse_event_line(&line) {
                    return Ok(Some(event));
                }
            }

            if self.body_done {
                return Ok(None);
            }

            match self.body.next().await {
                Some(chunk) => {
                    let chunk = chunk?;
                    self.lines.extend(self.decoder.push(&chunk));
                }
                None => {
                    self.body_done = true;
                    self.lines.extend(self.decoder.finish());
                }
            }
        }
    }
}

/// Apply the call's citation mode to a snapshot's answer
fn render(mut snapshot: ResponseState, mode: CitationMode) -> ResponseState {
    if let Some(answer) = snapshot.answer.take() {
        snapshot.answer = Some(format_citations(mode, &answer, &snapshot.search_results));
    }
    snapshot
}
