//! Error types for the display-side session manager.

use thiserror::Error;
use wraith_ipc::SessionId;

/// Errors surfaced by the registry and the session manager.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Creation attempted at or above the session bound. Nothing was mutated.
    #[error("session limit reached (max: {max})")]
    CapacityExceeded { max: usize },

    /// The id is not (or no longer) in the registry.
    #[error("session not found: {0}")]
    NotFound(SessionId),

    /// The host handed out an id that is already registered.
    #[error("duplicate session id: {0}")]
    DuplicateId(SessionId),

    /// The channel to the host is gone or the host did not answer.
    #[error("host unavailable: {0}")]
    HostUnavailable(String),

    /// The host could not start the shell.
    #[error("failed to start shell: {0}")]
    SpawnFailure(String),

    #[error("invalid grid layout: {0}")]
    InvalidGridLayout(String),

    /// The display runtime has shut down.
    #[error("session manager stopped")]
    ManagerStopped,
}

/// Result type alias using [`SessionError`].
pub type Result<T> = std::result::Result<T, SessionError>;
