//! Pipe node error abstractions.

pub use pipe_core::PipeError;

// Error messages.
pub const ERR_DB_FLUSH: &str = "error flushing database state";

/// The error type used to indicate that a system shutdown is required.
#[derive(Debug, thiserror::Error)]
#[error("fatal error: {0}")]
pub struct ShutdownError(#[from] pub anyhow::Error);

/// A result type where the error is a `ShutdownError`.
pub type ShutdownResult<T> = ::std::result::Result<T, ShutdownError>;
