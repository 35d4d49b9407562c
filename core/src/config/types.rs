use serde::{Deserialize, Serialize};

use crate::sandbox::{RuleLogMode, DEFAULT_MAX_CALL_DEPTH, DEFAULT_TIMEOUT_MS};

/// Engine-level defaults an embedding host can tune. These only seed
/// [`crate::sandbox::RuleExecutionOptions::from_config`]; the orchestrator
/// still overrides per invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub default_timeout_ms: u64,
    pub default_log_mode: RuleLogMode,
    pub max_call_depth: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            default_log_mode: RuleLogMode::Drop,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}
