use serde::Deserialize;
use serde_json::Value;

// ─── StreamEvent ──────────────────────────────────────────────────────────

/// One decoded record from a phase stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// An incremental fragment of phase output.
    Content(String),
    /// The backend gave up on the phase.
    Error(String),
    /// The phase finished; `result` is the opaque payload the backend attached.
    Done { result: Option<Value> },
}

// ─── Wire shape ───────────────────────────────────────────────────────────

/// The JSON object carried by a `data:` line. Every field is optional on the
/// wire; [`WireRecord::into_events`] decides which union member it is.
#[derive(Debug, Default, Deserialize)]
struct WireRecord {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    error: Option<WireError>,
    #[serde(default)]
    done: Option<bool>,
    /// `{done: true, phase: {...}}` is the usual terminal form.
    #[serde(default)]
    phase: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
}

/// Used when the backend signals an error without saying what went wrong.
pub const UNSPECIFIED_ERROR: &str = "backend reported an error";

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireError {
    Message(String),
    Detailed { message: String },
    Other(Value),
}

impl WireError {
    /// `None` when the field is present but does not signal an error.
    fn into_message(self) -> Option<String> {
        let message = match self {
            WireError::Message(m) | WireError::Detailed { message: m } => m,
            WireError::Other(Value::Null | Value::Bool(false)) => return None,
            WireError::Other(Value::Bool(true)) => String::new(),
            WireError::Other(other) => other.to_string(),
        };
        if message.trim().is_empty() {
            Some(UNSPECIFIED_ERROR.to_string())
        } else {
            Some(message)
        }
    }
}

impl WireRecord {
    fn into_events(self) -> Vec<StreamEvent> {
        let mut events = Vec::with_capacity(2);
        if let Some(text) = self.content.filter(|t| !t.is_empty()) {
            events.push(StreamEvent::Content(text));
        }
        // A record that is both an error and done is a failure.
        if let Some(message) = self.error.and_then(WireError::into_message) {
            events.push(StreamEvent::Error(message));
        } else if self.done == Some(true) {
            events.push(StreamEvent::Done {
                result: self.phase.or(self.result),
            });
        }
        events
    }
}

/// Decode the payload of one `data:` record.
///
/// Returns an empty list for well-formed JSON that matches none of the known
/// shapes; returns `Err` when the payload is not a JSON object at all.
pub fn parse_payload(payload: &str) -> Result<Vec<StreamEvent>, serde_json::Error> {
    if payload == "[DONE]" {
        return Ok(vec![StreamEvent::Done { result: None }]);
    }
    let record: WireRecord = serde_json::from_str(payload)?;
    Ok(record.into_events())
}

// ─── Tests ────────────────────────────────────────────────────────────────
