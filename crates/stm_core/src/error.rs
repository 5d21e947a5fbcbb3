//! Error types surfaced by region setup and allocation paths.

use thiserror::Error;

/// Result type for fallible STM operations.
pub type StmResult<T> = Result<T, StmError>;

/// Errors surfaced by [`crate::Region::create`] and
/// [`crate::Transaction::alloc`]/[`crate::Transaction::free`].
///
/// Conflict aborts are intentionally *not* represented here. Per
/// SPEC_FULL.md §7, a conflicting read, write, or free comes back as a
/// plain `false` from the transaction method that provoked it — the
/// only valid response is to stop using that transaction, not to match
/// on an error variant, so giving it its own `StmError` case would
/// invite callers to treat it like a recoverable condition it isn't.
#[derive(Debug, Error)]
pub enum StmError {
    /// [`crate::Region::create`] was given an invalid size or
    /// alignment.
    #[error("invalid region: {message}")]
    InvalidRegion {
        /// Description of the problem.
        message: String,
    },

    /// An otherwise-valid transaction operation was given a malformed
    /// argument, e.g. a non-aligned allocation size.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the problem.
        message: String,
    },

    /// An operation was attempted on a transaction that already
    /// committed or aborted.
    #[error("transaction is no longer active")]
    TransactionInactive,
}

impl StmError {
    pub(crate) fn invalid_region(message: impl Into<String>) -> Self {
        Self::InvalidRegion {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub(crate) const fn transaction_inactive() -> Self {
        Self::TransactionInactive
    }
}
