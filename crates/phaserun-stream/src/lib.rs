//! `phaserun-stream`: the wire side of phase execution.
//!
//! A phase runs as one HTTP request whose response body is a sequence of
//! blank-line delimited `data: <json>` records:
//!
//! ```text
//! PhaseRequest ──▶ PhaseTransport::open ──▶ ByteStream (raw chunks)
//!                                               │
//!                                               ▼
//!                                          SseDecoder ──▶ StreamEvent
//! ```
//!
//! [`HttpTransport`] talks to a real backend. With the `test-util` feature,
//! `memory::ScriptedTransport` replays canned responses instead.

pub mod decoder;
pub mod error;
pub mod event;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod request;
pub mod transport;

pub use decoder::SseDecoder;
pub use error::StreamError;
pub use event::{parse_payload, StreamEvent, UNSPECIFIED_ERROR};
#[cfg(any(test, feature = "test-util"))]
pub use memory::{Script, ScriptedTransport};
pub use request::PhaseRequest;
pub use transport::{ByteStream, HttpTransport, PhaseTransport};
