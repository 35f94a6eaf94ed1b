use std::path::Path;

use phaserun_core::{CheckpointStore, FileCheckpointStore};
use phaserun_engine::Initialization;
use phaserun_server::AppState;

use super::{build_orchestrator, read_plan};

pub fn run(
    root: &Path,
    port: u16,
    plan: Option<&Path>,
    checkpoint: Option<&str>,
    endpoint: Option<&str>,
) -> anyhow::Result<()> {
    let (config, orch) = build_orchestrator(root, endpoint)?;

    if let Some(path) = plan {
        orch.initialize(Initialization::Plan(read_plan(path)?))?;
    } else if let Some(id) = checkpoint {
        let state = FileCheckpointStore::new(root).load(id)?;
        orch.initialize(Initialization::from(state))?;
    }

    let rt = tokio::runtime::Runtime::new()?;
    let app_state = AppState::new(root.to_path_buf(), orch.clone());
    rt.block_on(async move {
        tracing::info!(project = %config.project.name, port, "starting phase server");
        tokio::select! {
            res = phaserun_server::serve(app_state, port) => res,
            _ = tokio::signal::ctrl_c() => {
                let paused = orch.pause().await;
                if paused > 0 {
                    eprintln!("paused {paused} running phase(s)");
                }
                Ok(())
            }
        }
    })
}
