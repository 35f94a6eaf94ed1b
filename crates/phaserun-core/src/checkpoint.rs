//! Checkpoint bridge and the on-disk checkpoint store.
//!
//! [`snapshot`] and [`restore`] translate between the live `Phase` list and a
//! serializable [`CheckpointRecord`]. Restoring never implies resuming: a phase
//! captured while `running` comes back `queued`, because the stream that was
//! feeding it did not survive serialization.
//!
//! [`CheckpointStore`] is the persistence seam (`save`/`list`/`load`);
//! [`FileCheckpointStore`] keeps one JSON document per checkpoint under
//! `.phaserun/checkpoints/`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::ModelConfig;
use crate::error::{PipelineError, Result};
use crate::io::atomic_write;
use crate::paths;
use crate::plan::check_numbers;
use crate::types::{Phase, PhaseStatus, Stage};

const CHECKPOINT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Bridge
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    #[serde(default = "default_version")]
    pub version: u32,
    pub phases: Vec<Phase>,
}

fn default_version() -> u32 {
    CHECKPOINT_VERSION
}

pub fn snapshot(phases: &[Phase]) -> CheckpointRecord {
    CheckpointRecord {
        version: CHECKPOINT_VERSION,
        phases: phases.to_vec(),
    }
}

/// Rejects records whose phase numbers are zero or repeated, the same as a
/// plan would be.
pub fn restore(record: CheckpointRecord) -> Result<Vec<Phase>> {
    let mut phases = record.phases;
    check_numbers(&phases)?;
    for phase in &mut phases {
        if phase.status == PhaseStatus::Running {
            debug!(phase = phase.number, "restored running phase as queued");
            phase.status = PhaseStatus::Queued;
        }
    }
    phases.sort_by_key(|p| p.number);
    Ok(phases)
}

// ---------------------------------------------------------------------------
// FullState / CheckpointMeta
// ---------------------------------------------------------------------------

/// Everything needed to pick a run back up later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullState {
    pub project_name: String,
    pub stage: Stage,
    /// The plan exactly as it is sent to the backend.
    pub plan: serde_json::Value,
    #[serde(default)]
    pub model_config: ModelConfig,
    pub checkpoint: CheckpointRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub id: String,
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub project_name: String,
    pub stage: Stage,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredCheckpoint {
    #[serde(flatten)]
    meta: CheckpointMeta,
    state: FullState,
}

// ---------------------------------------------------------------------------
// CheckpointStore
// ---------------------------------------------------------------------------

pub trait CheckpointStore: Send + Sync {
    fn save(&self, name: &str, state: &FullState) -> Result<CheckpointMeta>;
    /// Newest first.
    fn list(&self) -> Result<Vec<CheckpointMeta>>;
    fn load(&self, id: &str) -> Result<FullState>;
    fn delete(&self, id: &str) -> Result<()>;
}

pub struct FileCheckpointStore {
    root: PathBuf,
}

impl FileCheckpointStore {
    /// Checkpoint files live at `<root>/.phaserun/checkpoints/<id>.json`.
    /// The directory is created lazily on the first `save`.
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    fn path(&self, id: &str) -> Result<PathBuf> {
        // ids are generated uuids; anything else must not reach the filesystem
        if uuid::Uuid::parse_str(id).is_err() {
            return Err(PipelineError::CheckpointNotFound(id.to_string()));
        }
        Ok(paths::checkpoint_path(&self.root, id))
    }

    fn read(&self, id: &str) -> Result<StoredCheckpoint> {
        let path = self.path(id)?;
        if !path.exists() {
            return Err(PipelineError::CheckpointNotFound(id.to_string()));
        }
        let data = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&data)?)
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn save(&self, name: &str, state: &FullState) -> Result<CheckpointMeta> {
        let meta = CheckpointMeta {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            timestamp: Utc::now(),
            project_name: state.project_name.clone(),
            stage: state.stage,
        };
        let stored = StoredCheckpoint {
            meta: meta.clone(),
            state: state.clone(),
        };
        let data = serde_json::to_vec_pretty(&stored)?;
        atomic_write(&self.path(&meta.id)?, &data)?;
        info!(id = %meta.id, name = %meta.name, phases = state.checkpoint.phases.len(), "checkpoint saved");
        Ok(meta)
    }

    fn list(&self) -> Result<Vec<CheckpointMeta>> {
        let dir = paths::checkpoints_dir(&self.root);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut metas = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = std::fs::read_to_string(&path)
                .map_err(PipelineError::from)
                .and_then(|data| {
                    serde_json::from_str::<StoredCheckpoint>(&data).map_err(PipelineError::from)
                });
            match parsed {
                Ok(stored) => metas.push(stored.meta),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable checkpoint"),
            }
        }
        metas.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(metas)
    }

    fn load(&self, id: &str) -> Result<FullState> {
        let stored = self.read(id)?;
        info!(id = %id, name = %stored.meta.name, "checkpoint loaded");
        Ok(stored.state)
    }

    fn delete(&self, id: &str) -> Result<()> {
        let path = self.path(id)?;
        if !path.exists() {
            return Err(PipelineError::CheckpointNotFound(id.to_string()));
        }
        std::fs::remove_file(&path)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
