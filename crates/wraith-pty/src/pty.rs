use std::io::{Read, Write};
use std::path::PathBuf;

use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};
use thiserror::Error;

/// Errors from PTY operations.
#[derive(Debug, Error)]
pub enum PtyError {
    #[error("PTY spawn failed: {0}")]
    SpawnFailed(String),
    #[error("PTY I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("PTY resize failed: {0}")]
    ResizeFailed(String),
    #[error("PTY kill failed: {0}")]
    KillFailed(String),
    #[error("invalid working directory: {}", .0.display())]
    InvalidWorkingDirectory(PathBuf),
}

/// Everything the host needs to start one shell.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpawnRequest {
    pub shell: String,
    pub cwd: PathBuf,
    pub cols: u16,
    pub rows: u16,
}

/// Write/resize/kill side of a running PTY, owned by the host loop.
pub trait PtyControl: Send {
    fn write(&mut self, data: &[u8]) -> Result<(), PtyError>;
    fn resize(&mut self, cols: u16, rows: u16) -> Result<(), PtyError>;
    fn kill(&mut self) -> Result<(), PtyError>;
}

/// Blocks until the child exits and returns its exit code.
pub trait ExitWaiter: Send {
    fn wait(self: Box<Self>) -> Option<u32>;
}

/// A freshly spawned PTY split into the parts that live on different threads:
/// the control stays with the host loop, the reader and waiter move to the
/// session's I/O thread.
pub struct SpawnedPty {
    pub control: Box<dyn PtyControl>,
    pub reader: Box<dyn Read + Send>,
    pub waiter: Box<dyn ExitWaiter>,
}

/// The spawning primitive used by the host controller.
pub trait PtySpawner {
    fn spawn(&self, request: &SpawnRequest) -> Result<SpawnedPty, PtyError>;
}

/// Spawns real shells through `portable-pty`.
#[derive(Clone, Copy, Debug, Default)]
pub struct NativeSpawner;

impl PtySpawner for NativeSpawner {
    /// Open a PTY of the requested size and start `request.shell` in
    /// `request.cwd` with `TERM=xterm-256color`.
    fn spawn(&self, request: &SpawnRequest) -> Result<SpawnedPty, PtyError> {
        if !request.cwd.is_dir() {
            return Err(PtyError::InvalidWorkingDirectory(request.cwd.clone()));
        }

        let pair = native_pty_system()
            .openpty(pty_size(request.cols, request.rows))
            .map_err(|e| PtyError::SpawnFailed(format!("failed to open PTY: {e}")))?;

        let mut cmd = CommandBuilder::new(&request.shell);
        cmd.cwd(&request.cwd);
        cmd.env("TERM", "xterm-256color");

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| PtyError::SpawnFailed(format!("failed to spawn {}: {e}", request.shell)))?;

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| PtyError::SpawnFailed(format!("failed to clone reader: {e}")))?;

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| PtyError::SpawnFailed(format!("failed to take writer: {e}")))?;

        let killer = child.clone_killer();
        Ok(SpawnedPty {
            control: Box::new(NativeControl {
                master: pair.master,
                writer,
                killer,
            }),
            reader,
            waiter: Box::new(ChildWaiter { child }),
        })
    }
}

struct NativeControl {
    master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    killer: Box<dyn ChildKiller + Send + Sync>,
}

impl PtyControl for NativeControl {
    fn write(&mut self, data: &[u8]) -> Result<(), PtyError> {
        self.writer.write_all(data)?;
        self.writer.flush()?;
        Ok(())
    }

    fn resize(&mut self, cols: u16, rows: u16) -> Result<(), PtyError> {
        self.master
            .resize(pty_size(cols, rows))
            .map_err(|e| PtyError::ResizeFailed(format!("{e}")))
    }

    fn kill(&mut self) -> Result<(), PtyError> {
        self.killer
            .kill()
            .map_err(|e| PtyError::KillFailed(format!("{e}")))
    }
}

impl Drop for NativeControl {
    fn drop(&mut self) {
        // Already-exited children report an error here; nothing to do about it.
        let _ = self.killer.kill();
    }
}

struct ChildWaiter {
    child: Box<dyn Child + Send + Sync>,
}

impl ExitWaiter for ChildWaiter {
    fn wait(mut self: Box<Self>) -> Option<u32> {
        self.child.wait().ok().map(|status| status.exit_code())
    }
}

fn pty_size(cols: u16, rows: u16) -> PtySize {
    PtySize {
        rows,
        cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}
