use serde::Deserialize;
use std::collections::HashSet;

use crate::error::{PipelineError, Result};
use crate::types::Phase;

/// The slice of a plan entry the orchestrator cares about. Everything else in
/// the plan stays opaque and is forwarded to the backend untouched.
#[derive(Debug, Deserialize)]
struct PlanEntry {
    #[serde(alias = "phase", alias = "phaseNumber", alias = "phase_number")]
    number: u32,
    #[serde(alias = "name")]
    title: String,
}

/// Build the initial `Phase` list from a plan document (`{ "phases": [...] }`).
///
/// Phases come back queued and ordered by number.
pub fn phases_from_plan(plan: &serde_json::Value) -> Result<Vec<Phase>> {
    let entries = plan
        .get("phases")
        .and_then(|v| v.as_array())
        .ok_or_else(|| PipelineError::InvalidPlan("plan has no 'phases' array".into()))?;

    if entries.is_empty() {
        return Err(PipelineError::InvalidPlan("plan has no phases".into()));
    }

    let mut phases = Vec::with_capacity(entries.len());
    for (i, raw) in entries.iter().enumerate() {
        let entry: PlanEntry = serde_json::from_value(raw.clone())
            .map_err(|e| PipelineError::InvalidPlan(format!("phase entry {i}: {e}")))?;
        phases.push(Phase::new(entry.number, entry.title));
    }
    check_numbers(&phases)?;

    phases.sort_by_key(|p| p.number);
    Ok(phases)
}

/// Phase numbers start at 1 and identify exactly one phase.
pub(crate) fn check_numbers(phases: &[Phase]) -> Result<()> {
    let mut seen = HashSet::new();
    for phase in phases {
        if phase.number == 0 {
            return Err(PipelineError::InvalidPlan(format!(
                "phase '{}': numbers start at 1",
                phase.title
            )));
        }
        if !seen.insert(phase.number) {
            return Err(PipelineError::InvalidPlan(format!(
                "duplicate phase number {}",
                phase.number
            )));
        }
    }
    Ok(())
}
