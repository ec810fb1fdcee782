//! Message catalog exchanged between the display side and the PTY host.
//!
//! Messages are serialized as internally tagged JSON (`"type"` field) so the
//! same enums work over in-process channels and over the stdio transport.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Unique identifier for a terminal session, assigned by the host.
pub type SessionId = u64;

/// Correlates a `CreateSession` request with its `SessionCreated` reply.
pub type RequestId = u64;

/// Requests sent from the display side to the host.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum HostRequest {
    /// Spawn a shell. Answered by exactly one `SessionCreated` with the same
    /// `request_id`.
    CreateSession {
        request_id: RequestId,
        working_directory: Option<PathBuf>,
    },
    /// Kill the session's shell. Fire-and-forget: the host sends no reply.
    DestroySession { id: SessionId },
    /// Raw bytes written verbatim to the session's PTY.
    Input {
        id: SessionId,
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
    /// Best-effort PTY resize.
    Resize { id: SessionId, cols: u16, rows: u16 },
}

/// Events sent from the host to the display side.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum HostEvent {
    /// One-shot reply to `CreateSession`.
    SessionCreated {
        request_id: RequestId,
        id: Option<SessionId>,
        /// Absolute directory the shell was started in.
        working_directory: Option<PathBuf>,
        success: bool,
        error: Option<String>,
    },
    /// The shell exited on its own. Never sent for sessions the display
    /// destroyed.
    SessionDestroyed {
        id: SessionId,
        exit_code: Option<u32>,
    },
    /// Raw PTY output, in the order the host read it.
    Output {
        id: SessionId,
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
}

impl HostEvent {
    /// Successful creation reply.
    pub fn created(request_id: RequestId, id: SessionId, working_directory: PathBuf) -> Self {
        HostEvent::SessionCreated {
            request_id,
            id: Some(id),
            working_directory: Some(working_directory),
            success: true,
            error: None,
        }
    }

    /// Failed creation reply.
    pub fn create_failed(request_id: RequestId, error: impl Into<String>) -> Self {
        HostEvent::SessionCreated {
            request_id,
            id: None,
            working_directory: None,
            success: false,
            error: Some(error.into()),
        }
    }
}

/// PTY bytes travel as standard base64 strings instead of JSON number arrays.
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded.as_bytes()).map_err(de::Error::custom)
    }
}
