//! Error types for the executor.

use std::error::Error as StdError;

/// Result type returned by all fallible executor operations.
pub type Result<T> = std::result::Result<T, ExecutorError>;

/// Dynamic error type surfaced by middleware implementations.
pub type DynError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors surfaced by the public executor API.
///
/// Mirrors the error codes of the external interface: every operation
/// either succeeds or fails with exactly one of these.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// Null/invalid input, an uninitialized executor, or an out-of-range
    /// capacity.
    #[error("invalid argument")]
    InvalidArgument,

    /// Allocation failed during init or `prepare`.
    #[error("out of memory")]
    OutOfMemory,

    /// Registration into a full handle table.
    #[error("handle table full")]
    Overflow,

    /// `remove_*` on an endpoint that was never registered.
    #[error("endpoint not registered")]
    NotFound,

    /// `spin_some` elapsed its timeout with no handle ready.
    #[error("wait timed out")]
    Timeout,

    /// A middleware operation failed, or a handle carried an unknown kind.
    #[error("middleware error: {0}")]
    Middleware(#[source] DynError),
}

impl ExecutorError {
    /// Wraps an arbitrary middleware error.
    pub fn middleware<E>(err: E) -> Self
    where
        E: Into<DynError>,
    {
        ExecutorError::Middleware(err.into())
    }
}
