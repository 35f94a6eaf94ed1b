//! The orchestrator: owner of the `Phase` list and of every live controller.
//!
//! Controllers never see the list. Each one reports through a
//! [`SlotReporter`] stamped with its phase number and generation; the
//! orchestrator applies the update under its lock and publishes a whole new
//! snapshot on a watch channel. A restart bumps the generation, so whatever a
//! superseded controller still reports is dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use phaserun_core::{
    phases_from_plan, restore, snapshot, summarize, CheckpointRecord, Config, FullState,
    ModelConfig, Phase, PhaseStatus, PhaseSummary, PipelineError, Result, Stage,
};
use phaserun_stream::{PhaseRequest, PhaseTransport};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::controller::{ControllerSettings, PhaseReporter, PhaseUpdate, TaskController, TaskOutcome};

const PROGRESS_STARTED: u8 = 5;
const PROGRESS_CEILING: u8 = 95;

/// Each debounced flush closes a tenth of the gap to the ceiling.
fn advance_progress(current: u8) -> u8 {
    if current >= PROGRESS_CEILING {
        return current;
    }
    let step = ((PROGRESS_CEILING - current) / 10).max(1);
    (current + step).min(PROGRESS_CEILING)
}

// ---------------------------------------------------------------------------
// RunContext / Initialization / RunReport
// ---------------------------------------------------------------------------

/// Everything a run needs besides the plan itself.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub project_name: String,
    pub model_config: ModelConfig,
    pub debounce: Duration,
    pub connect_warning: Duration,
    /// Surfaced to the UI only; every eligible phase starts at once.
    pub concurrency: usize,
}

impl RunContext {
    pub fn new(project_name: impl Into<String>) -> Self {
        let settings = ControllerSettings::default();
        Self {
            project_name: project_name.into(),
            model_config: ModelConfig::default(),
            debounce: settings.debounce,
            connect_warning: settings.connect_warning,
            concurrency: 3,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            project_name: config.project.name.clone(),
            model_config: config.model.clone(),
            debounce: config.execution.debounce(),
            connect_warning: config.backend.connect_warning(),
            concurrency: config.execution.concurrency,
        }
    }

    fn settings(&self) -> ControllerSettings {
        ControllerSettings {
            debounce: self.debounce,
            connect_warning: self.connect_warning,
        }
    }
}

pub enum Initialization {
    /// Fresh phases, all queued.
    Plan(Value),
    /// Phases as captured; anything recorded `running` comes back `queued`.
    Checkpoint { plan: Value, record: CheckpointRecord },
}

impl From<FullState> for Initialization {
    fn from(state: FullState) -> Self {
        Initialization::Checkpoint {
            plan: state.plan,
            record: state.checkpoint,
        }
    }
}

/// Phase numbers grouped by how each controller started in a run settled.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub started: Vec<u32>,
    pub complete: Vec<u32>,
    pub failed: Vec<u32>,
    pub queued: Vec<u32>,
}

impl RunReport {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    fn record(&mut self, outcome: &TaskOutcome) {
        match outcome.status {
            PhaseStatus::Complete => self.complete.push(outcome.phase),
            PhaseStatus::Failed => self.failed.push(outcome.phase),
            PhaseStatus::Queued | PhaseStatus::Running => self.queued.push(outcome.phase),
        }
    }
}

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

/// Scratch state for one live controller.
struct Slot {
    generation: u64,
    cancel: CancellationToken,
    settled: watch::Receiver<bool>,
}

#[derive(Default)]
struct State {
    plan: Option<Value>,
    phases: Vec<Phase>,
    slots: HashMap<u32, Slot>,
    next_generation: u64,
}

impl State {
    fn plan(&self) -> Result<Value> {
        self.plan.clone().ok_or(PipelineError::NoPlan)
    }

    fn index_of(&self, number: u32) -> Result<usize> {
        self.phases
            .iter()
            .position(|p| p.number == number)
            .ok_or(PipelineError::PhaseNotFound(number))
    }

    fn phase_mut(&mut self, number: u32) -> Result<&mut Phase> {
        self.phases
            .iter_mut()
            .find(|p| p.number == number)
            .ok_or(PipelineError::PhaseNotFound(number))
    }

    /// A slot whose token is already cancelled is on its way out and may be
    /// superseded.
    fn is_live(&self, number: u32) -> bool {
        self.slots
            .get(&number)
            .is_some_and(|slot| !slot.cancel.is_cancelled())
    }
}

struct Inner {
    transport: Arc<dyn PhaseTransport>,
    context: RunContext,
    state: Mutex<State>,
    snapshots: watch::Sender<Vec<Phase>>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &State) {
        self.snapshots.send_replace(state.phases.clone());
    }

    fn apply(&self, number: u32, generation: u64, update: PhaseUpdate) {
        let mut state = self.lock();
        if state.slots.get(&number).map(|s| s.generation) != Some(generation) {
            debug!(phase = number, generation, "ignoring update from superseded controller");
            return;
        }
        let Ok(phase) = state.phase_mut(number) else {
            return;
        };
        let allowed = match update.target_status() {
            Some(next) => phase.status.can_transition_to(next),
            None => phase.status == PhaseStatus::Running,
        };
        if !allowed {
            debug!(
                phase = number,
                status = %phase.status,
                update = update.kind(),
                "ignoring update that does not follow from the current status"
            );
            return;
        }

        match update {
            PhaseUpdate::Output(text) => {
                phase.output = text;
                phase.progress = advance_progress(phase.progress);
            }
            PhaseUpdate::Completed { output, detail } => {
                phase.status = PhaseStatus::Complete;
                phase.output = output;
                phase.detail = detail;
                phase.error = None;
                phase.progress = 100;
                info!(phase = number, "phase complete");
            }
            PhaseUpdate::Failed { output, error } => {
                warn!(phase = number, error = %error, "phase failed");
                phase.status = PhaseStatus::Failed;
                phase.output = output;
                phase.error = Some(error);
            }
            PhaseUpdate::Paused { output } => {
                phase.status = PhaseStatus::Queued;
                phase.output = output;
                info!(phase = number, "phase paused");
            }
        }
        self.publish(&state);
    }

    /// Releases the slot of a controller that has returned (or panicked).
    fn settle(&self, number: u32, generation: u64) {
        let mut state = self.lock();
        if state.slots.get(&number).map(|s| s.generation) != Some(generation) {
            return;
        }
        state.slots.remove(&number);
        if let Ok(phase) = state.phase_mut(number) {
            if phase.status == PhaseStatus::Running {
                error!(phase = number, "controller exited without a terminal update");
                let message = "controller exited unexpectedly".to_string();
                phase.output.push_str(&crate::controller::error_annotation(&message));
                phase.status = PhaseStatus::Failed;
                phase.error = Some(message);
            }
        }
        self.publish(&state);
    }
}

struct SlotReporter {
    inner: Arc<Inner>,
    number: u32,
    generation: u64,
}

impl PhaseReporter for SlotReporter {
    fn report(&self, update: PhaseUpdate) {
        self.inner.apply(self.number, self.generation, update);
    }
}

/// Settles the slot when the controller task ends on any path, unwinding
/// included.
struct SettleGuard {
    inner: Arc<Inner>,
    number: u32,
    generation: u64,
    settled: watch::Sender<bool>,
}

impl Drop for SettleGuard {
    fn drop(&mut self) {
        self.inner.settle(self.number, self.generation);
        self.settled.send_replace(true);
    }
}

/// A controller ready to run, paired with the guard that settles its slot.
struct Launch {
    controller: TaskController<SlotReporter>,
    guard: SettleGuard,
}

impl Launch {
    fn spawn(self) -> JoinHandle<TaskOutcome> {
        let Launch { controller, guard } = self;
        tokio::spawn(async move {
            let _guard = guard;
            controller.run().await
        })
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Cheap to clone; every clone drives the same phases.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(transport: Arc<dyn PhaseTransport>, context: RunContext) -> Self {
        let (snapshots, _) = watch::channel(Vec::new());
        Self {
            inner: Arc::new(Inner {
                transport,
                context,
                state: Mutex::new(State::default()),
                snapshots,
            }),
        }
    }

    pub fn context(&self) -> &RunContext {
        &self.inner.context
    }

    /// Replace the phase list. Refused while any controller is live.
    pub fn initialize(&self, init: Initialization) -> Result<()> {
        let mut state = self.inner.lock();
        if !state.slots.is_empty() {
            return Err(PipelineError::Busy(format!(
                "{} phase(s) still running",
                state.slots.len()
            )));
        }
        let (plan, phases, source) = match init {
            Initialization::Plan(plan) => {
                let phases = phases_from_plan(&plan)?;
                (plan, phases, "plan")
            }
            Initialization::Checkpoint { plan, record } => (plan, restore(record)?, "checkpoint"),
        };
        info!(source, phases = phases.len(), "orchestrator initialized");
        state.plan = Some(plan);
        state.phases = phases;
        self.inner.publish(&state);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Start every phase that is neither complete nor already live, all at
    /// once, and wait for each of them to settle.
    pub async fn run_all(&self) -> Result<RunReport> {
        let (started, launches) = {
            let mut state = self.inner.lock();
            let plan = state.plan()?;
            let eligible: Vec<(usize, u32)> = state
                .phases
                .iter()
                .enumerate()
                .filter(|(_, p)| p.status != PhaseStatus::Complete && !state.is_live(p.number))
                .map(|(index, p)| (index, p.number))
                .collect();
            let launches: Vec<Launch> = eligible
                .iter()
                .map(|&(index, _)| self.prepare(&mut state, &plan, index))
                .collect();
            let eligible: Vec<u32> = eligible.into_iter().map(|(_, number)| number).collect();
            if !eligible.is_empty() {
                self.inner.publish(&state);
            }
            (eligible, launches)
        };
        let handles: Vec<_> = launches.into_iter().map(Launch::spawn).collect();

        if started.is_empty() {
            debug!("run requested with nothing to start");
            return Ok(RunReport::default());
        }
        info!(
            phases = started.len(),
            concurrency = self.inner.context.concurrency,
            "starting phases"
        );

        let mut report = RunReport {
            started: started.clone(),
            ..RunReport::default()
        };
        for (number, joined) in started.iter().zip(join_all(handles).await) {
            match joined {
                Ok(outcome) => report.record(&outcome),
                Err(e) => {
                    error!(phase = number, error = %e, "controller task aborted");
                    report.failed.push(*number);
                }
            }
        }
        info!(
            complete = report.complete.len(),
            failed = report.failed.len(),
            queued = report.queued.len(),
            "run settled"
        );
        Ok(report)
    }

    /// Re-run whatever is not complete; a no-op once everything is.
    pub async fn resume(&self) -> Result<RunReport> {
        self.run_all().await
    }

    /// Start one queued phase in the background. Returns `false` when the
    /// phase is complete or already running.
    pub fn start(&self, number: u32) -> Result<bool> {
        let mut state = self.inner.lock();
        let index = state.index_of(number)?;
        let status = state.phases[index].status;
        if status == PhaseStatus::Complete || state.is_live(number) {
            return Ok(false);
        }
        if status == PhaseStatus::Failed {
            return Err(PipelineError::InvalidTransition {
                from: status.to_string(),
                to: PhaseStatus::Running.to_string(),
                reason: "failed phases restart through retry".into(),
            });
        }
        let plan = state.plan()?;
        let launch = self.prepare(&mut state, &plan, index);
        self.inner.publish(&state);
        drop(state);
        launch.spawn();
        Ok(true)
    }

    /// Regenerate a phase from scratch, including a complete one.
    pub fn retry(&self, number: u32) -> Result<()> {
        let mut state = self.inner.lock();
        let index = state.index_of(number)?;
        if state.is_live(number) {
            return Err(PipelineError::PhaseRunning(number));
        }
        let plan = state.plan()?;
        info!(phase = number, "retrying phase");
        let launch = self.prepare(&mut state, &plan, index);
        self.inner.publish(&state);
        drop(state);
        launch.spawn();
        Ok(())
    }

    /// Cancel every live controller and wait until each has settled back to
    /// `queued`. Returns how many were cancelled.
    pub async fn pause(&self) -> usize {
        let waiters: Vec<watch::Receiver<bool>> = {
            let state = self.inner.lock();
            state
                .slots
                .values()
                .filter(|slot| !slot.cancel.is_cancelled())
                .map(|slot| {
                    slot.cancel.cancel();
                    slot.settled.clone()
                })
                .collect()
        };
        info!(phases = waiters.len(), "pausing running phases");
        let count = waiters.len();
        for mut settled in waiters {
            // Err means the sender is gone, which only happens after settling.
            let _ = settled.wait_for(|done| *done).await;
        }
        count
    }

    /// Cancel one phase. Returns `false` when it was not running.
    pub async fn pause_phase(&self, number: u32) -> Result<bool> {
        let waiter = {
            let mut state = self.inner.lock();
            state.phase_mut(number)?;
            match state.slots.get(&number) {
                Some(slot) if !slot.cancel.is_cancelled() => {
                    slot.cancel.cancel();
                    slot.settled.clone()
                }
                _ => return Ok(false),
            }
        };
        info!(phase = number, "pausing phase");
        let mut waiter = waiter;
        let _ = waiter.wait_for(|done| *done).await;
        Ok(true)
    }

    /// Reset the phase at `index` to running and claim a fresh slot for it.
    /// The caller publishes, then spawns the returned launch once the lock is
    /// released. Must not fail: dropping a launch while the lock is held
    /// deadlocks in `settle`.
    fn prepare(&self, state: &mut State, plan: &Value, index: usize) -> Launch {
        let generation = state.next_generation;
        state.next_generation += 1;

        let phase = &mut state.phases[index];
        let number = phase.number;
        phase.reset();
        phase.status = PhaseStatus::Running;
        phase.progress = PROGRESS_STARTED;

        let cancel = CancellationToken::new();
        let (settled_tx, settled_rx) = watch::channel(false);
        if let Some(old) = state.slots.insert(
            number,
            Slot {
                generation,
                cancel: cancel.clone(),
                settled: settled_rx,
            },
        ) {
            debug!(phase = number, superseded = old.generation, generation, "superseding controller");
        }

        let ctx = &self.inner.context;
        let request = PhaseRequest {
            plan: plan.clone(),
            phase_number: number,
            project_name: ctx.project_name.clone(),
            model_config: ctx.model_config.clone(),
        };
        let controller = TaskController::new(
            request,
            Arc::clone(&self.inner.transport),
            cancel,
            SlotReporter {
                inner: Arc::clone(&self.inner),
                number,
                generation,
            },
            ctx.settings(),
        );
        let guard = SettleGuard {
            inner: Arc::clone(&self.inner),
            number,
            generation,
            settled: settled_tx,
        };
        Launch { controller, guard }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn snapshot(&self) -> Vec<Phase> {
        self.inner.lock().phases.clone()
    }

    /// Latest-value feed of the phase list; every mutation publishes.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Phase>> {
        self.inner.snapshots.subscribe()
    }

    /// `true` when no controller is live.
    pub fn is_idle(&self) -> bool {
        self.inner.lock().slots.is_empty()
    }

    pub fn summary(&self) -> PhaseSummary {
        summarize(&self.inner.lock().phases)
    }

    pub fn plan(&self) -> Option<Value> {
        self.inner.lock().plan.clone()
    }

    pub fn checkpoint(&self) -> CheckpointRecord {
        snapshot(&self.inner.lock().phases)
    }

    /// Everything a checkpoint store needs to bring this run back later.
    pub fn full_state(&self, stage: Stage) -> Result<FullState> {
        let state = self.inner.lock();
        let plan = state.plan.clone().ok_or(PipelineError::NoPlan)?;
        Ok(FullState {
            project_name: self.inner.context.project_name.clone(),
            stage,
            plan,
            model_config: self.inner.context.model_config.clone(),
            checkpoint: snapshot(&state.phases),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
