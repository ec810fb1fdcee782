//! In-process transport: one unbounded tokio channel per direction.
//!
//! Unbounded senders keep every display-side send non-blocking, which is what
//! lets the session manager stay synchronous.

use tokio::sync::mpsc;

use crate::error::IpcError;
use crate::protocol::{HostEvent, HostRequest};

/// The display side's end of the link.
pub struct DisplayEnd {
    pub requests: mpsc::UnboundedSender<HostRequest>,
    pub events: mpsc::UnboundedReceiver<HostEvent>,
}

/// The host side's end of the link.
pub struct HostEnd {
    pub requests: mpsc::UnboundedReceiver<HostRequest>,
    pub events: mpsc::UnboundedSender<HostEvent>,
}

/// Create a connected pair of link ends.
pub fn pair() -> (DisplayEnd, HostEnd) {
    let (req_tx, req_rx) = mpsc::unbounded_channel();
    let (evt_tx, evt_rx) = mpsc::unbounded_channel();
    (
        DisplayEnd {
            requests: req_tx,
            events: evt_rx,
        },
        HostEnd {
            requests: req_rx,
            events: evt_tx,
        },
    )
}

/// Send helper that maps a closed channel to [`IpcError::Closed`].
pub fn send<T>(tx: &mpsc::UnboundedSender<T>, msg: T) -> Result<(), IpcError> {
    tx.send(msg).map_err(|_| IpcError::Closed)
}
