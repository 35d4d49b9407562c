use thiserror::Error;

use crate::js::ParseError;

#[derive(Debug, Error)]
pub enum CompileError {
    /// The rule file extension maps to no known dialect. Rejected outright
    /// rather than defaulting: a typo'd extension silently executing
    /// unnormalized source is worse than a loud error.
    #[error("cannot determine rule dialect for extension '{0}'")]
    UnknownDialect(String),

    #[error("{0}")]
    Syntax(#[from] ParseError),

    #[error("{filename}: {err}")]
    SyntaxInFile { filename: String, err: ParseError },
}

impl CompileError {
    pub(crate) fn with_file(self, filename: &str) -> Self {
        match self {
            CompileError::Syntax(err) => CompileError::SyntaxInFile {
                filename: filename.to_string(),
                err,
            },
            other => other,
        }
    }
}
