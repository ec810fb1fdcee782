//! Per-session I/O thread that reads PTY output and reports the child's exit.
//!
//! PTY reads are blocking, so each session gets its own OS thread. The thread
//! forwards chunks to the host loop as soon as they are read, then waits for
//! the child and reports the exit. Output and exit for one session travel
//! through the same thread, so the exit notice always follows the last chunk.

use std::io::Read;

use tokio::sync::mpsc;
use wraith_ipc::SessionId;

use crate::pty::{ExitWaiter, PtyError};

/// Notices sent from I/O threads to the host loop.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum PtyNotice {
    Output { id: SessionId, data: Vec<u8> },
    Exited { id: SessionId, exit_code: Option<u32> },
}

/// Start the I/O loop for a session on a dedicated OS thread.
pub(crate) fn start_io_thread(
    id: SessionId,
    reader: Box<dyn Read + Send>,
    waiter: Box<dyn ExitWaiter>,
    notices: mpsc::UnboundedSender<PtyNotice>,
) -> Result<(), PtyError> {
    std::thread::Builder::new()
        .name(format!("pty-io-{id}"))
        .spawn(move || io_loop(id, reader, waiter, notices))?;
    Ok(())
}

fn io_loop(
    id: SessionId,
    mut reader: Box<dyn Read + Send>,
    waiter: Box<dyn ExitWaiter>,
    notices: mpsc::UnboundedSender<PtyNotice>,
) {
    let mut buf = [0u8; 65536];

    loop {
        // EOF or an error both mean the PTY closed (EIO on Linux once the
        // child is gone).
        let n = match reader.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };

        let data = buf[..n].to_vec();
        if notices.send(PtyNotice::Output { id, data }).is_err() {
            // Host loop is gone and has already killed the child.
            return;
        }
    }

    let exit_code = waiter.wait();
    log::debug!("pty-io-{id}: child exited with {exit_code:?}");
    let _ = notices.send(PtyNotice::Exited { id, exit_code });
}
