use std::sync::{Arc, Mutex, MutexGuard};

use alacritty_terminal::event::{Event, EventListener};
use alacritty_terminal::grid::Dimensions;
use alacritty_terminal::index::{Column, Line};
use alacritty_terminal::term::{Config, Term};
use alacritty_terminal::vte::ansi;

/// Shared event state captured from the terminal.
#[derive(Default)]
struct EventState {
    pty_writes: Vec<String>,
}

/// Event proxy that captures terminal events.
///
/// Must be `Clone` because `Term` requires `T: EventListener`. We use interior
/// mutability via `Arc<Mutex<_>>`.
#[derive(Clone)]
pub struct EventProxy {
    state: Arc<Mutex<EventState>>,
}

impl EventProxy {
    fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(EventState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, EventState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl EventListener for EventProxy {
    fn send_event(&self, event: Event) {
        if let Event::PtyWrite(data) = event {
            self.lock().pty_writes.push(data);
        }
    }
}

/// Dimensions helper for creating / resizing the terminal.
struct TermSize {
    columns: usize,
    screen_lines: usize,
}

impl Dimensions for TermSize {
    fn total_lines(&self) -> usize {
        self.screen_lines
    }

    fn screen_lines(&self) -> usize {
        self.screen_lines
    }

    fn columns(&self) -> usize {
        self.columns
    }
}

/// The display-side terminal emulator for one session.
///
/// Wraps `alacritty_terminal::Term` and its VTE processor.
pub struct VtTerminal {
    term: Term<EventProxy>,
    parser: ansi::Processor,
    event_proxy: EventProxy,
}

impl VtTerminal {
    /// Create a new terminal with the given dimensions.
    ///
    /// Uses 10,000 lines of scrollback history.
    pub fn new(cols: u16, rows: u16) -> Self {
        let config = Config {
            scrolling_history: 10_000,
            ..Config::default()
        };

        let size = TermSize {
            columns: cols.max(1) as usize,
            screen_lines: rows.max(1) as usize,
        };

        let event_proxy = EventProxy::new();
        let term = Term::new(config, &size, event_proxy.clone());

        Self {
            term,
            parser: ansi::Processor::new(),
            event_proxy,
        }
    }

    /// Feed raw PTY output bytes into the terminal.
    pub fn write(&mut self, bytes: &[u8]) {
        self.parser.advance(&mut self.term, bytes);
    }

    /// Resize the terminal grid.
    pub fn resize(&mut self, cols: u16, rows: u16) {
        let size = TermSize {
            columns: cols.max(1) as usize,
            screen_lines: rows.max(1) as usize,
        };
        self.term.resize(size);
    }

    /// Current grid size as `(cols, rows)`.
    pub fn size(&self) -> (u16, u16) {
        (self.term.columns() as u16, self.term.screen_lines() as u16)
    }

    /// Drain any write-back data from the terminal (e.g. device status responses).
    ///
    /// These bytes belong to the shell's input stream.
    pub fn take_pty_writes(&mut self) -> Vec<String> {
        std::mem::take(&mut self.event_proxy.lock().pty_writes)
    }

    /// Text of one visible row with trailing blanks removed.
    pub fn row_text(&self, row: u16) -> String {
        if row as usize >= self.term.screen_lines() {
            return String::new();
        }
        let grid = self.term.grid();
        let line = &grid[Line(row as i32)];
        let text: String = (0..self.term.columns())
            .map(|col| line[Column(col)].c)
            .collect();
        text.trim_end().to_string()
    }

    /// Text of the whole visible screen, one line per row, trailing blank rows removed.
    pub fn screen_text(&self) -> String {
        let rows = self.term.screen_lines() as u16;
        let mut lines: Vec<String> = (0..rows).map(|row| self.row_text(row)).collect();
        while lines.last().is_some_and(|line| line.is_empty()) {
            lines.pop();
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_terminal_dimensions() {
        let term = VtTerminal::new(80, 24);
        assert_eq!(term.size(), (80, 24));
    }

    #[test]
    fn test_write_hello() {
        let mut term = VtTerminal::new(80, 24);
        term.write(b"hello");

        assert_eq!(term.row_text(0), "hello");
        assert_eq!(term.row_text(1), "");
    }

    #[test]
    fn test_escape_sequences_are_not_printed() {
        let mut term = VtTerminal::new(80, 24);
        term.write(b"\x1b[31mred\x1b[0m plain");

        assert_eq!(term.row_text(0), "red plain");
    }

    #[test]
    fn test_resize_terminal() {
        let mut term = VtTerminal::new(80, 24);
        term.resize(120, 40);
        assert_eq!(term.size(), (120, 40));
    }

    #[test]
    fn test_zero_size_is_clamped() {
        let mut term = VtTerminal::new(0, 0);
        assert_eq!(term.size(), (1, 1));
        term.resize(0, 5);
        assert_eq!(term.size(), (1, 5));
    }

    #[test]
    fn test_screen_text_joins_rows() {
        let mut term = VtTerminal::new(20, 5);
        term.write(b"one\r\ntwo\r\n");

        assert_eq!(term.screen_text(), "one\ntwo");
    }

    #[test]
    fn test_device_status_response() {
        let mut term = VtTerminal::new(80, 24);
        // ESC[6n requests a cursor position report.
        term.write(b"\x1b[6n");

        let writes = term.take_pty_writes();
        assert_eq!(writes, vec!["\x1b[1;1R".to_string()]);
        assert!(term.take_pty_writes().is_empty());
    }
}
