use std::path::Path;

use phaserun_engine::Initialization;

use super::{build_orchestrator, drive, finish, read_plan};

pub fn run(
    root: &Path,
    plan_path: &Path,
    checkpoint_name: &str,
    endpoint: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let plan = read_plan(plan_path)?;

    let (config, orch) = build_orchestrator(root, endpoint)?;
    orch.initialize(Initialization::Plan(plan))?;
    if !json {
        println!(
            "Running {} phase(s) for '{}'",
            orch.snapshot().len(),
            config.project.name
        );
    }

    let report = drive(&orch, !json)?;
    finish(root, &orch, &report, checkpoint_name, json)
}
