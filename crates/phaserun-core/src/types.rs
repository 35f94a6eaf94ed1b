use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::PipelineError;

// ---------------------------------------------------------------------------
// PhaseStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    #[default]
    Queued,
    Running,
    Complete,
    Failed,
}

impl PhaseStatus {
    pub fn all() -> &'static [PhaseStatus] {
        &[
            PhaseStatus::Queued,
            PhaseStatus::Running,
            PhaseStatus::Complete,
            PhaseStatus::Failed,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PhaseStatus::Queued => "queued",
            PhaseStatus::Running => "running",
            PhaseStatus::Complete => "complete",
            PhaseStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PhaseStatus::Complete | PhaseStatus::Failed)
    }

    /// Transitions a running controller may apply to its own phase.
    ///
    /// Entering `Running` from anything but `Queued` is not listed here: that
    /// only happens through an explicit restart, which resets the phase first.
    pub fn can_transition_to(self, next: PhaseStatus) -> bool {
        matches!(
            (self, next),
            (PhaseStatus::Queued, PhaseStatus::Running)
                | (PhaseStatus::Running, PhaseStatus::Complete)
                | (PhaseStatus::Running, PhaseStatus::Failed)
                | (PhaseStatus::Running, PhaseStatus::Queued)
        )
    }
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PhaseStatus {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(PhaseStatus::Queued),
            "running" => Ok(PhaseStatus::Running),
            "complete" | "completed" => Ok(PhaseStatus::Complete),
            "failed" => Ok(PhaseStatus::Failed),
            _ => Err(PipelineError::InvalidStatus(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// One unit of pipeline work with its own streamed execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub number: u32,
    pub title: String,
    #[serde(default)]
    pub status: PhaseStatus,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Opaque result attached by the terminal `done` record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

impl Phase {
    pub fn new(number: u32, title: impl Into<String>) -> Self {
        Self {
            number,
            title: title.into(),
            status: PhaseStatus::Queued,
            output: String::new(),
            progress: 0,
            error: None,
            detail: None,
        }
    }

    /// Clear everything a previous execution produced.
    pub fn reset(&mut self) {
        self.status = PhaseStatus::Queued;
        self.output.clear();
        self.progress = 0;
        self.error = None;
        self.detail = None;
    }
}

// ---------------------------------------------------------------------------
// PhaseSummary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseSummary {
    pub total: usize,
    pub queued: usize,
    pub running: usize,
    pub complete: usize,
    pub failed: usize,
}

pub fn summarize(phases: &[Phase]) -> PhaseSummary {
    let mut summary = PhaseSummary {
        total: phases.len(),
        ..Default::default()
    };
    for phase in phases {
        match phase.status {
            PhaseStatus::Queued => summary.queued += 1,
            PhaseStatus::Running => summary.running += 1,
            PhaseStatus::Complete => summary.complete += 1,
            PhaseStatus::Failed => summary.failed += 1,
        }
    }
    summary
}

impl fmt::Display for PhaseSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} complete, {} failed, {} running, {} queued",
            self.complete, self.total, self.failed, self.running, self.queued
        )
    }
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// Where the surrounding generation pipeline is. Recorded with checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Interview,
    Complexity,
    Design,
    Validation,
    Correction,
    Planning,
    Execution,
    Handoff,
}

impl Stage {
    pub fn all() -> &'static [Stage] {
        &[
            Stage::Interview,
            Stage::Complexity,
            Stage::Design,
            Stage::Validation,
            Stage::Correction,
            Stage::Planning,
            Stage::Execution,
            Stage::Handoff,
        ]
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn next(self) -> Option<Stage> {
        Stage::all().get(self.index() + 1).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Interview => "interview",
            Stage::Complexity => "complexity",
            Stage::Design => "design",
            Stage::Validation => "validation",
            Stage::Correction => "correction",
            Stage::Planning => "planning",
            Stage::Execution => "execution",
            Stage::Handoff => "handoff",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::all()
            .iter()
            .copied()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| PipelineError::InvalidStage(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
