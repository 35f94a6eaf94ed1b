use std::path::Path;

use anyhow::Context;
use phaserun_core::{CheckpointStore, Config, FileCheckpointStore, PhaseStatus};
use phaserun_engine::Initialization;

use super::{drive, finish, with_context};

pub fn run(
    root: &Path,
    id: &str,
    checkpoint_name: &str,
    endpoint: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let state = FileCheckpointStore::new(root).load(id)?;

    // The checkpoint decides what is asked of the backend; the config only
    // supplies the endpoint and timing.
    let project_name = state.project_name.clone();
    let model_config = state.model_config.clone();
    let (_, orch) = with_context(config, endpoint, |mut ctx| {
        ctx.project_name = project_name;
        ctx.model_config = model_config;
        ctx
    });
    orch.initialize(Initialization::from(state))?;

    let pending = orch
        .snapshot()
        .iter()
        .filter(|p| p.status != PhaseStatus::Complete)
        .count();
    if !json {
        println!("Resuming {id}: {pending} phase(s) to run");
    }

    let report = drive(&orch, !json)?;
    finish(root, &orch, &report, checkpoint_name, json)
}
