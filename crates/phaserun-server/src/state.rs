use std::path::PathBuf;
use std::sync::Arc;

use phaserun_core::{CheckpointStore, FileCheckpointStore, Stage};
use phaserun_engine::Orchestrator;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub root: PathBuf,
    pub orchestrator: Orchestrator,
    pub store: Arc<dyn CheckpointStore>,
    /// Pipeline stage recorded on checkpoints saved through this server.
    pub stage: Stage,
}

impl AppState {
    pub fn new(root: PathBuf, orchestrator: Orchestrator) -> Self {
        let store = Arc::new(FileCheckpointStore::new(&root));
        Self {
            root,
            orchestrator,
            store,
            stage: Stage::Execution,
        }
    }
}
