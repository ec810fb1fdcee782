//! wraith-ipc: the channel protocol between the PTY host and the display side.
//!
//! The two sides never share memory. Everything that crosses the boundary is a
//! [`HostRequest`] (display → host) or a [`HostEvent`] (host → display),
//! correlated by [`SessionId`] and, for creation, by [`RequestId`].
//!
//! # Transports
//!
//! - [`channel::pair`] connects both ends inside one process over tokio
//!   channels.
//! - [`stdio`] carries the same messages as JSON lines over a pipe, so the host
//!   can run as a separate process.
//!
//! Both transports deliver each direction in order, so output bytes and
//! input/resize commands for any single session stay FIFO.

pub mod channel;
pub mod error;
pub mod protocol;
pub mod stdio;

pub use channel::{pair, DisplayEnd, HostEnd};
pub use error::IpcError;
pub use protocol::{HostEvent, HostRequest, RequestId, SessionId};
