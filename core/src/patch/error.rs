use thiserror::Error;

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("malformed hunk header: {0}")]
    MalformedHunkHeader(String),

    #[error("unknown change kind '{kind}' for file {path}")]
    UnknownChangeKind { path: String, kind: String },

    #[error("previous path not available for renamed file {0}")]
    MissingPreviousPath(String),
}
