//! Pipe error abstractions.

use thiserror::Error;

/// Pipe control plane error variants.
#[derive(Debug, Error)]
pub enum PipeError {
    /// A pipe was observed in a status or transition which should never be possible.
    ///
    /// This always indicates a bug and is fatal for the pipe in question only.
    #[error("illegal state for pipe {pipe}: {detail}")]
    IllegalState { pipe: String, detail: String },
    /// A partition task proxy failed one of its lifecycle calls.
    #[error("pipe task failure for pipe {pipe}: {source:#}")]
    TaskFailure {
        pipe: String,
        #[source]
        source: anyhow::Error,
    },
    /// A pipe meta record could not be decoded.
    #[error("invalid pipe meta record: {0}")]
    InvalidRecord(String),
    /// One or more pipes failed during a reconciliation pass.
    #[error("failed to handle pipe meta changes on node, because: [{}]", join_errors(.0))]
    Aggregate(Vec<PipeError>),
}

impl PipeError {
    /// Construct an illegal state error for the given pipe.
    pub fn illegal_state(pipe: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::IllegalState { pipe: pipe.into(), detail: detail.into() }
    }

    /// Wrap the given error with the name of the pipe it was raised for.
    ///
    /// Errors which are already a `PipeError` are passed through untouched.
    pub fn for_pipe(pipe: &str, err: anyhow::Error) -> Self {
        match err.downcast::<PipeError>() {
            Ok(err) => err,
            Err(source) => Self::TaskFailure { pipe: pipe.to_string(), source },
        }
    }
}

fn join_errors(errors: &[PipeError]) -> String {
    errors.iter().map(|err| err.to_string()).collect::<Vec<_>>().join("; ")
}
