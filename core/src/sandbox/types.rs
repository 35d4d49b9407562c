use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;

pub(crate) const DEFAULT_TIMEOUT_MS: u64 = 5000;
pub(crate) const DEFAULT_MAX_CALL_DEPTH: u32 = 256;

/// Severity of one rule log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleLogLevel {
    Info,
    Warn,
    Error,
}

/// One captured `console` call from a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleLogEntry {
    pub level: RuleLogLevel,
    pub msg: String,
}

/// What happens to `console` output from a rule. Fixed for the whole
/// invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleLogMode {
    /// Discard all console calls.
    #[default]
    Drop,
    /// Forward immediately to the host's tracing stream.
    Console,
    /// Append to the result's log list in emission order.
    Capture,
}

/// Per-invocation knobs chosen by the review orchestrator.
#[derive(Debug, Clone)]
pub struct RuleExecutionOptions {
    pub log_mode: RuleLogMode,
    /// Wall-clock budget for the whole invocation.
    pub timeout: Duration,
    /// Bound on rule-level call nesting.
    pub max_call_depth: u32,
}

impl Default for RuleExecutionOptions {
    fn default() -> Self {
        Self {
            log_mode: RuleLogMode::Drop,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

impl RuleExecutionOptions {
    /// Derive the embedding host's default options from its engine config.
    pub fn from_config(cfg: &EngineConfig) -> Self {
        Self {
            log_mode: cfg.default_log_mode,
            timeout: Duration::from_millis(cfg.default_timeout_ms),
            max_call_depth: cfg.max_call_depth,
        }
    }
}

/// The outcome of one rule invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleResult {
    pub approve: bool,
    pub logs: Vec<RuleLogEntry>,
}
