//! wraith-session: the display side of wraith.
//!
//! Tracks every open terminal session, keeps exactly one of them active, and
//! decides which ones are visible in the tabbed or grid view. Shells live in
//! the PTY host; this crate only ever talks to it through the
//! [`wraith_ipc`] message catalog.
//!
//! - [`Registry`]: the pure session table.
//! - [`SessionManager`]: synchronous core that owns the registry, the
//!   emulators and the view state.
//! - [`spawn_display`] / [`ManagerHandle`]: the tokio task around the manager.
//! - [`ViewCoordinator`]: turns state snapshots into frames.

pub mod emulator;
pub mod error;
pub mod manager;
pub mod registry;
pub mod runtime;
pub mod session;
pub mod view;

pub use emulator::{CellMetrics, Container, Emulator, EmulatorFactory, VtEmulator, VtEmulatorFactory};
pub use error::{Result, SessionError};
pub use manager::{CreateOptions, CreateOutcome, ManagerConfig, SessionManager, StateSnapshot};
pub use registry::{Registry, DEFAULT_MAX_SESSIONS};
pub use runtime::{spawn_display, ManagerHandle};
pub use session::{Dimensions, LifecycleState, Session};
pub use view::{plan_panes, Frame, GridLayout, Pane, Tab, ViewCoordinator, ViewMode, Viewport};
