use thiserror::Error;

/// A syntax error in rule source, with 1-based source coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{msg} (line {line}, column {col})")]
pub struct ParseError {
    pub msg: String,
    pub line: u32,
    pub col: u32,
}

impl ParseError {
    pub(crate) fn new(msg: impl Into<String>, line: u32, col: u32) -> Self {
        Self {
            msg: msg.into(),
            line,
            col,
        }
    }
}
