use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use reqwest::header::ACCEPT;
use tracing::debug;

use crate::error::StreamError;
use crate::request::PhaseRequest;

/// Raw response body, chunked however the network delivered it.
pub type ByteStream = BoxStream<'static, Result<Bytes, StreamError>>;

const MAX_REJECTION_BODY: usize = 512;

// ─── PhaseTransport ───────────────────────────────────────────────────────

/// Opens the byte stream for one phase execution.
///
/// The returned future resolves once the backend has accepted the request
/// (or refused it); the stream then yields body chunks until the server
/// closes the connection. Dropping either aborts the underlying request.
pub trait PhaseTransport: Send + Sync + 'static {
    fn open(&self, request: PhaseRequest) -> BoxFuture<'static, Result<ByteStream, StreamError>>;
}

// ─── HttpTransport ────────────────────────────────────────────────────────

/// `POST`s the request as JSON to a single execute-phase endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), endpoint)
    }

    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl PhaseTransport for HttpTransport {
    fn open(&self, request: PhaseRequest) -> BoxFuture<'static, Result<ByteStream, StreamError>> {
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        async move {
            debug!(endpoint = %endpoint, phase = request.phase_number, "opening phase stream");
            let response = client
                .post(&endpoint)
                .header(ACCEPT, "text/event-stream")
                .json(&request)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(StreamError::Rejected {
                    status: status.as_u16(),
                    body: body.chars().take(MAX_REJECTION_BODY).collect(),
                });
            }
            if response.content_length() == Some(0) {
                return Err(StreamError::NoBody);
            }

            let stream: ByteStream = response
                .bytes_stream()
                .map(|chunk| chunk.map_err(StreamError::from))
                .boxed();
            Ok(stream)
        }
        .boxed()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::SseDecoder;
    use crate::event::StreamEvent;
    use mockito::Matcher;
    use phaserun_core::ModelConfig;
    use serde_json::json;

    fn request(phase: u32) -> PhaseRequest {
        PhaseRequest {
            plan: json!({"phases": [{"number": phase, "title": "Scaffold"}]}),
            phase_number: phase,
            project_name: "demo".into(),
            model_config: ModelConfig::default(),
        }
    }

    #[tokio::test]
    async fn streams_body_chunks() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/execute-phase")
            .match_body(Matcher::PartialJson(
                json!({"phaseNumber": 1, "projectName": "demo"}),
            ))
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body("data: {\"content\":\"hi\"}\n\ndata: {\"done\":true}\n\n")
            .create_async()
            .await;

        let transport = HttpTransport::new(format!("{}/api/execute-phase", server.url()));
        let mut stream = transport.open(request(1)).await.unwrap();

        let mut decoder = SseDecoder::new();
        let mut events = Vec::new();
        while let Some(chunk) = stream.next().await {
            events.extend(decoder.push(&chunk.unwrap()));
        }
        events.extend(decoder.finish());

        mock.assert_async().await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Content("hi".into()),
                StreamEvent::Done { result: None }
            ]
        );
    }

    #[tokio::test]
    async fn non_success_status_is_rejected_with_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/run")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let transport = HttpTransport::new(format!("{}/run", server.url()));
        match transport.open(request(2)).await {
            Err(StreamError::Rejected { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            Err(other) => panic!("expected rejection, got {other}"),
            Ok(_) => panic!("expected rejection, got a stream"),
        }
    }

    #[tokio::test]
    async fn empty_body_is_no_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/run")
            .with_status(200)
            .with_body("")
            .create_async()
            .await;

        let transport = HttpTransport::new(format!("{}/run", server.url()));
        let err = transport.open(request(1)).await.err().unwrap();
        assert!(matches!(err, StreamError::NoBody));
        assert!(err.is_rejection());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_http_error() {
        let transport = HttpTransport::new("http://127.0.0.1:1/run");
        let err = transport.open(request(1)).await.err().unwrap();
        assert!(matches!(err, StreamError::Http(_)));
        assert!(!err.is_rejection());
    }
}
