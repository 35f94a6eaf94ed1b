use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use phaserun_core::PhaseStatus;
use phaserun_stream::{ByteStream, PhaseRequest, PhaseTransport, SseDecoder, StreamError, StreamEvent};
use serde_json::Value;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::buffer::OutputBuffer;

pub const PAUSED_MARKER: &str = "\n\n[Paused]";

pub fn error_annotation(message: &str) -> String {
    format!("\n\n[Error: {message}]")
}

// ─── Reporting ────────────────────────────────────────────────────────────

/// A state change one controller asks its owner to apply to its phase.
#[derive(Debug, Clone, PartialEq)]
pub enum PhaseUpdate {
    /// Debounced content flush.
    Output(String),
    Completed { output: String, detail: Option<Value> },
    Failed { output: String, error: String },
    /// User cancellation: back to `queued`, output ends with the pause marker.
    Paused { output: String },
}

impl PhaseUpdate {
    /// The status this update moves the phase to; `None` for output flushes,
    /// which leave it running.
    pub fn target_status(&self) -> Option<PhaseStatus> {
        match self {
            PhaseUpdate::Output(_) => None,
            PhaseUpdate::Completed { .. } => Some(PhaseStatus::Complete),
            PhaseUpdate::Failed { .. } => Some(PhaseStatus::Failed),
            PhaseUpdate::Paused { .. } => Some(PhaseStatus::Queued),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PhaseUpdate::Output(_) => "output",
            PhaseUpdate::Completed { .. } => "completed",
            PhaseUpdate::Failed { .. } => "failed",
            PhaseUpdate::Paused { .. } => "paused",
        }
    }
}

/// The only channel from a controller back to whoever owns the phase list.
pub trait PhaseReporter: Send + Sync + 'static {
    fn report(&self, update: PhaseUpdate);
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    pub phase: u32,
    pub status: PhaseStatus,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct ControllerSettings {
    pub debounce: Duration,
    /// Soft threshold: past this, a slow connection is logged but still awaited.
    pub connect_warning: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(50),
            connect_warning: Duration::from_secs(15),
        }
    }
}

// ─── TaskController ───────────────────────────────────────────────────────

/// Runs one phase execution from request to settlement.
///
/// The controller owns the byte stream, the decoder and the output buffer;
/// all of them are dropped when [`TaskController::run`] returns, whichever
/// path it returns on. Exactly one terminal update (`Completed`, `Failed` or
/// `Paused`) is reported per run.
pub struct TaskController<R> {
    request: PhaseRequest,
    transport: Arc<dyn PhaseTransport>,
    cancel: CancellationToken,
    reporter: R,
    settings: ControllerSettings,
}

enum Connection {
    Open(ByteStream),
    Cancelled,
    Failed(StreamError),
}

impl<R: PhaseReporter> TaskController<R> {
    pub fn new(
        request: PhaseRequest,
        transport: Arc<dyn PhaseTransport>,
        cancel: CancellationToken,
        reporter: R,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            request,
            transport,
            cancel,
            reporter,
            settings,
        }
    }

    fn phase(&self) -> u32 {
        self.request.phase_number
    }

    pub async fn run(self) -> TaskOutcome {
        info!(phase = self.phase(), "phase started");
        let mut buffer = OutputBuffer::new(self.settings.debounce);

        let stream = match self.connect().await {
            Connection::Open(stream) => stream,
            Connection::Cancelled => return self.pause(&mut buffer),
            Connection::Failed(e) => {
                if e.is_rejection() {
                    warn!(phase = self.phase(), error = %e, "backend rejected phase request");
                }
                return self.fail(&mut buffer, e.to_string());
            }
        };
        self.drive(stream, buffer).await
    }

    async fn connect(&self) -> Connection {
        let mut open = self.transport.open(self.request.clone());
        let slow = sleep(self.settings.connect_warning);
        tokio::pin!(slow);
        let mut warned = false;

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Connection::Cancelled,
                result = &mut open => {
                    return match result {
                        Ok(stream) => Connection::Open(stream),
                        Err(e) => Connection::Failed(e),
                    };
                }
                _ = &mut slow, if !warned => {
                    warned = true;
                    warn!(
                        phase = self.phase(),
                        threshold_secs = self.settings.connect_warning.as_secs(),
                        "phase connection is slow, still waiting"
                    );
                }
            }
        }
    }

    async fn drive(&self, mut stream: ByteStream, mut buffer: OutputBuffer) -> TaskOutcome {
        let mut decoder = SseDecoder::new();

        loop {
            let deadline = buffer.deadline();
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return self.pause(&mut buffer),
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if let Some(text) = buffer.take_due() {
                        self.reporter.report(PhaseUpdate::Output(text));
                    }
                }
                chunk = stream.next() => match chunk {
                    Some(Ok(bytes)) => {
                        if let Some(outcome) = self.apply_all(decoder.push(&bytes), &mut buffer) {
                            return outcome;
                        }
                    }
                    Some(Err(e)) => return self.fail(&mut buffer, e.to_string()),
                    None => {
                        if let Some(outcome) = self.apply_all(decoder.finish(), &mut buffer) {
                            return outcome;
                        }
                        warn!(
                            phase = self.phase(),
                            "stream closed without a terminal record, treating as complete (degraded)"
                        );
                        return self.complete(&mut buffer, None);
                    }
                },
            }
        }
    }

    /// Applies decoded events in arrival order; returns once one is terminal.
    fn apply_all(&self, events: Vec<StreamEvent>, buffer: &mut OutputBuffer) -> Option<TaskOutcome> {
        for event in events {
            if self.cancel.is_cancelled() {
                return Some(self.pause(buffer));
            }
            match event {
                StreamEvent::Content(text) => buffer.push(&text),
                StreamEvent::Error(message) => return Some(self.fail(buffer, message)),
                StreamEvent::Done { result } => return Some(self.complete(buffer, result)),
            }
        }
        None
    }

    fn complete(&self, buffer: &mut OutputBuffer, detail: Option<Value>) -> TaskOutcome {
        let output = buffer.flush();
        self.reporter.report(PhaseUpdate::Completed { output, detail });
        self.outcome(PhaseStatus::Complete, None)
    }

    fn fail(&self, buffer: &mut OutputBuffer, error: String) -> TaskOutcome {
        let mut output = buffer.flush();
        output.push_str(&error_annotation(&error));
        self.reporter.report(PhaseUpdate::Failed {
            output,
            error: error.clone(),
        });
        self.outcome(PhaseStatus::Failed, Some(error))
    }

    fn pause(&self, buffer: &mut OutputBuffer) -> TaskOutcome {
        debug!(phase = self.phase(), buffered = buffer.text().len(), "phase cancelled");
        let mut output = buffer.flush();
        output.push_str(PAUSED_MARKER);
        self.reporter.report(PhaseUpdate::Paused { output });
        self.outcome(PhaseStatus::Queued, None)
    }

    fn outcome(&self, status: PhaseStatus, error: Option<String>) -> TaskOutcome {
        TaskOutcome {
            phase: self.phase(),
            status,
            error,
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
