//! wraith-pty: the privileged-side PTY host controller for Wraith.
//!
//! This crate owns the real shell processes. The display side never touches
//! them directly; it sends [`wraith_ipc::HostRequest`]s and receives
//! [`wraith_ipc::HostEvent`]s.
//!
//! # Architecture
//!
//! - [`PtySpawner`]: the spawning seam. [`NativeSpawner`] opens a real PTY with
//!   `portable-pty` and splits it into a [`PtyControl`] (write, resize, kill),
//!   a reader and an [`ExitWaiter`].
//! - [`PtyHost`]: the host loop: one PTY per session id, an I/O thread per
//!   session, and the lifecycle `Requested → Spawning → Running → (Exited | Killed)`.
//! - [`shell`]: platform shell selection.

pub mod host;
mod io_thread;
pub mod pty;
pub mod shell;

pub use host::{HostConfig, PtyHost, PtyLifecycle};
pub use pty::{
    ExitWaiter, NativeSpawner, PtyControl, PtyError, PtySpawner, SpawnRequest, SpawnedPty,
};
pub use shell::{default_shell, select_shell, HostPlatform};
