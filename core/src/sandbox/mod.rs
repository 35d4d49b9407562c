mod builtins;
mod error;
mod interp;
mod logsink;
mod run;
mod types;
mod value;

pub use error::SandboxError;
pub use run::run_rule;
pub use types::{RuleExecutionOptions, RuleLogEntry, RuleLogLevel, RuleLogMode, RuleResult};

pub(crate) use types::{DEFAULT_MAX_CALL_DEPTH, DEFAULT_TIMEOUT_MS};
