use std::time::Duration;

use thiserror::Error;

use crate::js::ParseError;

/// Why a rule invocation failed.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// The compiled source did not parse. Compilation happens upstream, so
    /// hitting this means the cached source is stale or corrupt.
    #[error("rule source failed to parse: {0}")]
    Compile(#[from] ParseError),

    /// The rule does not satisfy the `main(patch) -> boolean` contract.
    #[error("{0}")]
    ContractViolation(String),

    /// The rule raised while running, including reference errors for
    /// identifiers the sandbox does not provide.
    #[error("user defined rule raised an error: {0}")]
    Runtime(String),

    /// The rule did not finish within the wall-clock budget.
    #[error("user defined rule timed out after {0:?}")]
    Timeout(Duration),
}
