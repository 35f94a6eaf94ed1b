use phaserun_core::ModelConfig;
use serde::Serialize;
use serde_json::Value;

/// Body of the execute-phase call. The plan travels whole so the backend can
/// see the phases around the one it is asked to run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseRequest {
    pub plan: Value,
    pub phase_number: u32,
    pub project_name: String,
    pub model_config: ModelConfig,
}
