//! In-memory [`PhaseTransport`] that plays back scripted responses.
//!
//! Used to drive the orchestrator without a backend: each phase number gets a
//! queue of [`Script`]s, and every `open` for that phase consumes the next one.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::{stream, FutureExt, StreamExt};

use crate::error::StreamError;
use crate::request::PhaseRequest;
use crate::transport::{ByteStream, PhaseTransport};

#[derive(Debug, Clone)]
enum Step {
    Chunk { delay: Duration, data: Bytes },
    Fail(String),
}

/// One scripted response.
#[derive(Debug, Clone, Default)]
pub struct Script {
    connect_delay: Duration,
    rejection: Option<(u16, String)>,
    steps: Vec<Step>,
    hang: bool,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    /// The backend answers with a non-success status.
    pub fn rejected(status: u16, body: impl Into<String>) -> Self {
        Self {
            rejection: Some((status, body.into())),
            ..Self::default()
        }
    }

    /// Delay before the response is accepted.
    pub fn connect_after(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    /// Raw body bytes, delivered as one chunk.
    pub fn chunk(self, data: impl Into<Bytes>) -> Self {
        self.chunk_after(Duration::ZERO, data)
    }

    pub fn chunk_after(mut self, delay: Duration, data: impl Into<Bytes>) -> Self {
        self.steps.push(Step::Chunk {
            delay,
            data: data.into(),
        });
        self
    }

    /// A complete `data:` record wrapping `json`.
    pub fn record(self, json: &str) -> Self {
        self.chunk(format!("data: {json}\n\n"))
    }

    pub fn record_after(self, delay: Duration, json: &str) -> Self {
        self.chunk_after(delay, format!("data: {json}\n\n"))
    }

    /// The connection breaks mid-stream.
    pub fn fail(mut self, message: impl Into<String>) -> Self {
        self.steps.push(Step::Fail(message.into()));
        self
    }

    /// Keep the stream open after the last step instead of closing it.
    pub fn hang(mut self) -> Self {
        self.hang = true;
        self
    }

    fn into_stream(self) -> ByteStream {
        let steps = stream::iter(self.steps).then(|step| async move {
            match step {
                Step::Chunk { delay, data } => {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    Ok(data)
                }
                Step::Fail(message) => Err(StreamError::Transport(message)),
            }
        });
        if self.hang {
            steps.chain(stream::pending()).boxed()
        } else {
            steps.boxed()
        }
    }
}

#[derive(Debug, Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<u32, VecDeque<Script>>>,
    requests: Mutex<Vec<PhaseRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`ScriptedTransport::push`].
    pub fn script(self, phase: u32, script: Script) -> Self {
        self.push(phase, script);
        self
    }

    pub fn push(&self, phase: u32, script: Script) {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(phase)
            .or_default()
            .push_back(script);
    }

    /// Every request opened so far, in order.
    pub fn requests(&self) -> Vec<PhaseRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn open_count(&self, phase: u32) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| r.phase_number == phase)
            .count()
    }
}

impl PhaseTransport for ScriptedTransport {
    fn open(&self, request: PhaseRequest) -> BoxFuture<'static, Result<ByteStream, StreamError>> {
        let phase = request.phase_number;
        let script = self
            .scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&phase)
            .and_then(VecDeque::pop_front);
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);

        async move {
            let script = script
                .ok_or_else(|| StreamError::Transport(format!("no script for phase {phase}")))?;
            if !script.connect_delay.is_zero() {
                tokio::time::sleep(script.connect_delay).await;
            }
            if let Some((status, body)) = script.rejection {
                return Err(StreamError::Rejected { status, body });
            }
            Ok(script.into_stream())
        }
        .boxed()
    }
}
