use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("not initialized: run 'phaserun init'")]
    NotInitialized,

    #[error("no plan loaded: initialize from a plan or a checkpoint first")]
    NoPlan,

    #[error("phase not found: {0}")]
    PhaseNotFound(u32),

    #[error("phase {0} is already running")]
    PhaseRunning(u32),

    #[error("invalid transition from {from} to {to}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    #[error("invalid stage: {0}")]
    InvalidStage(String),

    #[error("invalid status: {0}")]
    InvalidStatus(String),

    #[error("checkpoint not found: {0}")]
    CheckpointNotFound(String),

    #[error("orchestrator busy: {0}")]
    Busy(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
