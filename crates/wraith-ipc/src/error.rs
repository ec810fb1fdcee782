use thiserror::Error;

/// Errors from the channel transports.
#[derive(Debug, Error)]
pub enum IpcError {
    /// The other side is gone.
    #[error("channel closed")]
    Closed,

    /// A message could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
