//! `phaserun-core`: synchronous domain types for the phase execution
//! orchestrator: the `Phase` model, plan parsing, checkpoint bridging and
//! persistence, and project configuration.

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod io;
pub mod paths;
pub mod plan;
pub mod types;

pub use checkpoint::{
    restore, snapshot, CheckpointMeta, CheckpointRecord, CheckpointStore, FileCheckpointStore,
    FullState,
};
pub use config::{Config, ModelConfig};
pub use error::{PipelineError, Result};
pub use plan::phases_from_plan;
pub use types::{summarize, Phase, PhaseStatus, PhaseSummary, Stage};
