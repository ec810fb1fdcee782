//! Tabbed/grid layout planning and the view coordinator.
//!
//! [`plan_panes`] decides which sessions are visible and where. The session
//! manager uses it to mount emulators; the [`ViewCoordinator`] uses the same
//! plan to turn state snapshots into frames for a front end.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use wraith_ipc::SessionId;

use crate::emulator::Container;
use crate::error::SessionError;
use crate::manager::StateSnapshot;

/// Largest number of rows or columns a grid may have.
pub const MAX_GRID_SIDE: u8 = 3;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum ViewMode {
    #[default]
    Tabbed,
    Grid,
}

/// Shape of the grid view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct GridLayout {
    rows: u8,
    cols: u8,
}

impl GridLayout {
    pub fn new(rows: u8, cols: u8) -> Result<Self, SessionError> {
        let valid = 1..=MAX_GRID_SIDE;
        if !valid.contains(&rows) || !valid.contains(&cols) {
            return Err(SessionError::InvalidGridLayout(format!(
                "{rows}x{cols} (each side must be 1 to {MAX_GRID_SIDE})"
            )));
        }
        Ok(Self { rows, cols })
    }

    pub fn rows(&self) -> u8 {
        self.rows
    }

    pub fn cols(&self) -> u8 {
        self.cols
    }

    /// Number of visible cells.
    pub fn cells(&self) -> usize {
        self.rows as usize * self.cols as usize
    }
}

impl Default for GridLayout {
    fn default() -> Self {
        Self { rows: 2, cols: 2 }
    }
}

impl fmt::Display for GridLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.rows, self.cols)
    }
}

impl FromStr for GridLayout {
    type Err = SessionError;

    /// Parses `"RxC"`, e.g. `"2x3"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SessionError::InvalidGridLayout(s.to_string());
        let (rows, cols) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(invalid)?;
        let rows = rows.trim().parse::<u8>().map_err(|_| invalid())?;
        let cols = cols.trim().parse::<u8>().map_err(|_| invalid())?;
        Self::new(rows, cols)
    }
}

/// Drawable area in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 800,
        }
    }
}

/// A visible session and the rectangle it is mounted into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Pane {
    pub id: SessionId,
    pub container: Container,
}

/// Compute the visible panes.
///
/// Tabbed shows only the active session over the whole viewport. Grid shows
/// `rows * cols` consecutive sessions of `ordered_ids` in equal cells,
/// row-major: the first ones, unless the active session lies further on, in
/// which case the window ends at it.
pub fn plan_panes(
    ordered_ids: &[SessionId],
    active: Option<SessionId>,
    mode: ViewMode,
    layout: GridLayout,
    viewport: Viewport,
) -> Vec<Pane> {
    match mode {
        ViewMode::Tabbed => active
            .filter(|id| ordered_ids.contains(id))
            .map(|id| Pane {
                id,
                container: Container {
                    x: 0,
                    y: 0,
                    width: viewport.width,
                    height: viewport.height,
                },
            })
            .into_iter()
            .collect(),
        ViewMode::Grid => {
            let cols = layout.cols as u32;
            let rows = layout.rows as u32;
            let cell_width = viewport.width / cols;
            let cell_height = viewport.height / rows;
            let first = active
                .and_then(|id| ordered_ids.iter().position(|&other| other == id))
                .map_or(0, |index| (index + 1).saturating_sub(layout.cells()));
            ordered_ids[first..]
                .iter()
                .take(layout.cells())
                .enumerate()
                .map(|(index, &id)| {
                    let index = index as u32;
                    Pane {
                        id,
                        container: Container {
                            x: (index % cols) * cell_width,
                            y: (index / cols) * cell_height,
                            width: cell_width,
                            height: cell_height,
                        },
                    }
                })
                .collect()
        }
    }
}

/// One entry of the tab bar.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Tab {
    pub id: SessionId,
    pub label: String,
    pub active: bool,
}

/// What a front end should show for one snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum Frame {
    /// No sessions.
    Empty { revision: u64 },
    Tabbed {
        revision: u64,
        tabs: Vec<Tab>,
        pane: Option<Pane>,
    },
    Grid {
        revision: u64,
        tabs: Vec<Tab>,
        layout: GridLayout,
        panes: Vec<Pane>,
    },
}

impl Frame {
    pub fn revision(&self) -> u64 {
        match self {
            Frame::Empty { revision }
            | Frame::Tabbed { revision, .. }
            | Frame::Grid { revision, .. } => *revision,
        }
    }
}

/// Turns state snapshots into frames.
#[derive(Debug, Default)]
pub struct ViewCoordinator {
    last_revision: Option<u64>,
}

impl ViewCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(&self, snapshot: &StateSnapshot) -> Frame {
        let revision = snapshot.revision;
        if snapshot.sessions.is_empty() {
            return Frame::Empty { revision };
        }

        let tabs: Vec<Tab> = snapshot
            .sessions
            .iter()
            .map(|s| Tab {
                id: s.id,
                label: s.display_name.clone(),
                active: s.is_active,
            })
            .collect();
        let ids: Vec<SessionId> = snapshot.sessions.iter().map(|s| s.id).collect();
        let panes = plan_panes(
            &ids,
            snapshot.active,
            snapshot.view_mode,
            snapshot.grid_layout,
            snapshot.viewport,
        );

        match snapshot.view_mode {
            ViewMode::Tabbed => Frame::Tabbed {
                revision,
                tabs,
                pane: panes.into_iter().next(),
            },
            ViewMode::Grid => Frame::Grid {
                revision,
                tabs,
                layout: snapshot.grid_layout,
                panes,
            },
        }
    }

    /// Render every notification until the manager goes away.
    ///
    /// Snapshots that queued up while the sink was busy are coalesced into the
    /// newest one; revisions older than the last rendered one are dropped.
    pub async fn run<S>(mut self, mut rx: mpsc::UnboundedReceiver<Arc<StateSnapshot>>, mut sink: S)
    where
        S: FnMut(Frame),
    {
        while let Some(mut snapshot) = rx.recv().await {
            while let Ok(newer) = rx.try_recv() {
                snapshot = newer;
            }
            if self.last_revision.is_some_and(|last| snapshot.revision <= last) {
                continue;
            }
            self.last_revision = Some(snapshot.revision);
            sink(self.render(&snapshot));
        }
        log::debug!("View coordinator stopped");
    }
}
