use std::path::PathBuf;

use serde::Serialize;
use wraith_ipc::SessionId;

/// Terminal size in character cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Dimensions {
    pub cols: u16,
    pub rows: u16,
}

impl Dimensions {
    pub const fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }
}

impl Default for Dimensions {
    fn default() -> Self {
        Self::new(80, 24)
    }
}

/// Display-side lifecycle of a session.
///
/// `Creating` is only ever seen on pending requests; every session stored in
/// the registry is `Live` until teardown starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum LifecycleState {
    Creating,
    Live,
    Closing,
    Closed,
}

/// One interactive shell as the display side sees it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Session {
    pub id: SessionId,
    pub display_name: String,
    /// Directory the shell was started in. Never changes.
    pub working_directory: PathBuf,
    /// Logical creation timestamp, used only for ordering.
    pub created_at: u64,
    pub is_active: bool,
    pub dimensions: Dimensions,
    pub lifecycle: LifecycleState,
    sequence: u64,
}

impl Session {
    /// A new session record named after its creation `sequence` number.
    pub fn new(
        id: SessionId,
        sequence: u64,
        working_directory: PathBuf,
        created_at: u64,
        dimensions: Dimensions,
    ) -> Self {
        Self {
            id,
            display_name: sequence.to_string(),
            working_directory,
            created_at,
            is_active: false,
            dimensions,
            lifecycle: LifecycleState::Creating,
            sequence,
        }
    }

    /// The label used when no explicit name is set.
    pub fn default_name(&self) -> String {
        self.sequence.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_defaults() {
        let session = Session::new(42, 3, PathBuf::from("/tmp"), 7, Dimensions::default());
        assert_eq!(session.display_name, "3");
        assert_eq!(session.default_name(), "3");
        assert!(!session.is_active);
        assert_eq!(session.lifecycle, LifecycleState::Creating);
        assert_eq!(session.dimensions, Dimensions::new(80, 24));
    }
}
