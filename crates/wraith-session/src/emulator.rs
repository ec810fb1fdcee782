//! The seam between the session manager and the terminal-emulation library.
//!
//! The manager only ever talks to an [`Emulator`]: it writes output bytes,
//! mounts it into a container, asks it to fit, and drains the bytes it
//! produces for the shell. [`VtEmulator`] is the real implementation over
//! [`wraith_vt::VtTerminal`].

use serde::Serialize;
use wraith_ipc::SessionId;
use wraith_vt::VtTerminal;

use crate::session::Dimensions;

/// Smallest grid a fit may produce.
pub const MIN_COLS: u16 = 2;
pub const MIN_ROWS: u16 = 1;

/// A rectangle in viewport pixels an emulator is mounted into.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Container {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Pixel size of one character cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CellMetrics {
    pub width: u32,
    pub height: u32,
}

impl Default for CellMetrics {
    fn default() -> Self {
        Self {
            width: 9,
            height: 18,
        }
    }
}

/// How many cells fit in `container`. `None` when nothing can be measured.
pub fn fit_container(container: &Container, metrics: &CellMetrics) -> Option<Dimensions> {
    if container.width == 0 || container.height == 0 || metrics.width == 0 || metrics.height == 0 {
        return None;
    }
    let cols = (container.width / metrics.width).clamp(MIN_COLS as u32, u16::MAX as u32) as u16;
    let rows = (container.height / metrics.height).clamp(MIN_ROWS as u32, u16::MAX as u32) as u16;
    Some(Dimensions::new(cols, rows))
}

/// One display-side terminal emulator instance.
pub trait Emulator {
    /// Feed output bytes from the shell.
    fn write(&mut self, data: &[u8]);

    /// Mount into (or move to) `container`.
    fn open(&mut self, container: Container);

    /// Unmount. An unmounted emulator cannot compute a size.
    fn detach(&mut self);

    fn is_mounted(&self) -> bool;

    /// Fit the grid to the current container and return the new size.
    fn fit(&mut self) -> Option<Dimensions>;

    /// Take keyboard focus.
    fn focus(&mut self);

    /// Give up keyboard focus.
    fn blur(&mut self);

    /// Drain bytes the emulator produced for the shell's input.
    fn take_input(&mut self) -> Vec<u8>;

    /// Release everything. Further writes are ignored.
    fn dispose(&mut self);

    /// Visible screen as plain text.
    fn screen_text(&self) -> String;
}

/// Builds one emulator per session.
pub trait EmulatorFactory {
    type Emulator: Emulator;

    fn create(&self, id: SessionId, size: Dimensions) -> Self::Emulator;
}

/// [`Emulator`] over `alacritty_terminal` via [`VtTerminal`].
pub struct VtEmulator {
    vt: VtTerminal,
    metrics: CellMetrics,
    container: Option<Container>,
    focused: bool,
    disposed: bool,
    pending_input: Vec<u8>,
}

impl VtEmulator {
    pub fn new(size: Dimensions, metrics: CellMetrics) -> Self {
        Self {
            vt: VtTerminal::new(size.cols, size.rows),
            metrics,
            container: None,
            focused: false,
            disposed: false,
            pending_input: Vec::new(),
        }
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Current grid size.
    pub fn size(&self) -> Dimensions {
        let (cols, rows) = self.vt.size();
        Dimensions::new(cols, rows)
    }
}

impl Emulator for VtEmulator {
    fn write(&mut self, data: &[u8]) {
        if self.disposed {
            return;
        }
        self.vt.write(data);
        for reply in self.vt.take_pty_writes() {
            self.pending_input.extend_from_slice(reply.as_bytes());
        }
    }

    fn open(&mut self, container: Container) {
        if !self.disposed {
            self.container = Some(container);
        }
    }

    fn detach(&mut self) {
        self.container = None;
        self.focused = false;
    }

    fn is_mounted(&self) -> bool {
        self.container.is_some()
    }

    fn fit(&mut self) -> Option<Dimensions> {
        let dims = fit_container(self.container.as_ref()?, &self.metrics)?;
        if dims != self.size() {
            self.vt.resize(dims.cols, dims.rows);
        }
        Some(dims)
    }

    fn focus(&mut self) {
        if !self.disposed {
            self.focused = true;
        }
    }

    fn blur(&mut self) {
        self.focused = false;
    }

    fn take_input(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.pending_input)
    }

    fn dispose(&mut self) {
        self.disposed = true;
        self.container = None;
        self.focused = false;
        self.pending_input.clear();
    }

    fn screen_text(&self) -> String {
        self.vt.screen_text()
    }
}

/// Creates [`VtEmulator`]s sharing one set of cell metrics.
#[derive(Clone, Copy, Debug, Default)]
pub struct VtEmulatorFactory {
    pub metrics: CellMetrics,
}

impl VtEmulatorFactory {
    pub fn new(metrics: CellMetrics) -> Self {
        Self { metrics }
    }
}

impl EmulatorFactory for VtEmulatorFactory {
    type Emulator = VtEmulator;

    fn create(&self, _id: SessionId, size: Dimensions) -> VtEmulator {
        VtEmulator::new(size, self.metrics)
    }
}
