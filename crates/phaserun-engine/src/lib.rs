//! `phaserun-engine`: runs plan phases concurrently against a streaming
//! backend.
//!
//! ```text
//! Orchestrator ──spawns──▶ TaskController (one tokio task per phase)
//!      ▲                        │  PhaseTransport → SseDecoder → OutputBuffer
//!      └──── PhaseUpdate ───────┘
//! ```
//!
//! The orchestrator owns the `Phase` list and publishes a full snapshot on
//! every change; controllers only ever see their own phase number.

pub mod buffer;
pub mod controller;
pub mod orchestrator;

pub use buffer::OutputBuffer;
pub use controller::{
    ControllerSettings, PhaseReporter, PhaseUpdate, TaskController, TaskOutcome, PAUSED_MARKER,
};
pub use orchestrator::{Initialization, Orchestrator, RunContext, RunReport};
