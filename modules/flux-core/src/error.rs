//! Typed errors for dispatcher and store operations.

use thiserror::Error;

use crate::dispatcher::DispatchToken;

/// Errors returned by [`Dispatcher`](crate::Dispatcher) operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The token does not map to a registered callback
    #[error("token {0} does not map to a registered callback")]
    NotMatchingCallback(DispatchToken),

    /// `dispatch` was called while a dispatch cycle is already running
    #[error("cannot dispatch in the middle of a dispatch")]
    AlreadyDispatching,

    /// `wait_for` was called outside the active dispatch cycle
    #[error("wait_for must be invoked while dispatching")]
    WaitForDispatching,

    /// `wait_for` reached a callback that is still running further up the
    /// same call stack
    #[error("circular dependency detected while waiting for token {0}")]
    CircularDependency(DispatchToken),
}

/// Errors returned by [`Store`](crate::Store) operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The call was made outside the store's own callback execution
    #[error("must be invoked while the store is handling a dispatch")]
    RequiresDispatching,
}

/// Result type alias for dispatcher operations.
pub type DispatchResult<T> = std::result::Result<T, DispatchError>;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
