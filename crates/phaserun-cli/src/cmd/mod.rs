pub mod checkpoint;
pub mod config;
pub mod init;
pub mod resume;
pub mod run;
pub mod serve;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use phaserun_core::{
    CheckpointMeta, CheckpointStore, Config, FileCheckpointStore, PhaseStatus, Stage,
};
use phaserun_engine::{Orchestrator, RunContext, RunReport};
use phaserun_stream::HttpTransport;

use crate::output::{print_json, print_phases};

pub fn read_plan(path: &Path) -> anyhow::Result<serde_json::Value> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read plan {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("{} is not valid JSON", path.display()))
}

/// Load the project config and build an orchestrator over the HTTP transport.
pub fn build_orchestrator(
    root: &Path,
    endpoint: Option<&str>,
) -> anyhow::Result<(Config, Orchestrator)> {
    let config = Config::load(root).context("failed to load config")?;
    Ok(with_context(config, endpoint, |ctx| ctx))
}

pub fn with_context(
    config: Config,
    endpoint: Option<&str>,
    adjust: impl FnOnce(RunContext) -> RunContext,
) -> (Config, Orchestrator) {
    let transport = Arc::new(HttpTransport::new(
        endpoint.unwrap_or(&config.backend.endpoint),
    ));
    tracing::debug!(endpoint = transport.endpoint(), "using phase endpoint");
    let orch = Orchestrator::new(transport, adjust(RunContext::from_config(&config)));
    (config, orch)
}

/// Run everything not yet complete. Ctrl-C pauses the live phases instead of
/// abandoning them, so the checkpoint that follows can resume them.
pub fn drive(orch: &Orchestrator, show_progress: bool) -> anyhow::Result<RunReport> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let progress = show_progress.then(|| tokio::spawn(report_transitions(orch.clone())));

        let run = orch.run_all();
        tokio::pin!(run);
        let report = tokio::select! {
            report = &mut run => report?,
            _ = tokio::signal::ctrl_c() => {
                eprintln!("interrupted: pausing running phases");
                orch.pause().await;
                run.await?
            }
        };

        if let Some(task) = progress {
            task.abort();
        }
        Ok::<_, anyhow::Error>(report)
    })
}

/// Print a line to stderr whenever a phase changes status.
async fn report_transitions(orch: Orchestrator) {
    let mut rx = orch.subscribe();
    let mut seen: HashMap<u32, PhaseStatus> = HashMap::new();
    loop {
        for phase in rx.borrow_and_update().iter() {
            if seen.insert(phase.number, phase.status) != Some(phase.status) {
                eprintln!("  [{}] {}: {}", phase.number, phase.title, phase.status);
            }
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Checkpoint the settled run, print it, and turn failures into an error
/// exit.
pub fn finish(
    root: &Path,
    orch: &Orchestrator,
    report: &RunReport,
    checkpoint_name: &str,
    json: bool,
) -> anyhow::Result<()> {
    let store = FileCheckpointStore::new(root);
    let state = orch.full_state(Stage::Execution)?;
    let meta: CheckpointMeta = store
        .save(checkpoint_name, &state)
        .context("failed to save checkpoint")?;

    if json {
        print_json(&serde_json::json!({
            "report": report,
            "phases": state.checkpoint.phases,
            "checkpoint": meta,
        }))?;
    } else {
        print_phases(&state.checkpoint.phases);
        println!();
        println!("{}", orch.summary());
        println!("checkpoint: {} ({})", meta.id, meta.name);
    }

    if report.has_failures() {
        anyhow::bail!(
            "{} phase(s) failed; retry with `phaserun resume {}`",
            report.failed.len(),
            meta.id
        );
    }
    Ok(())
}
