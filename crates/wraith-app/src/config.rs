//! Typed application settings backed by the `settings` table.
//!
//! Defaults are written on first launch so the database documents every key.
//! A stored value that does not parse (or is out of range) is ignored with a
//! warning and the default is used instead.

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use rusqlite::Connection;
use wraith_db::settings;
use wraith_pty::HostConfig;
use wraith_session::{CellMetrics, Dimensions, GridLayout, ManagerConfig, Viewport, DEFAULT_MAX_SESSIONS};

pub const MAX_SESSIONS: &str = "max_sessions";
pub const DEFAULT_SHELL: &str = "default_shell";
pub const DEFAULT_COLS: &str = "default_cols";
pub const DEFAULT_ROWS: &str = "default_rows";
pub const CELL_WIDTH_PX: &str = "cell_width_px";
pub const CELL_HEIGHT_PX: &str = "cell_height_px";
pub const CREATE_TIMEOUT_MS: &str = "create_timeout_ms";
pub const GRID_LAYOUT: &str = "grid_layout";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub max_sessions: usize,
    /// `None` applies the platform shell policy.
    pub default_shell: Option<String>,
    pub default_cols: u16,
    pub default_rows: u16,
    pub cell_width_px: u32,
    pub cell_height_px: u32,
    pub create_timeout_ms: u64,
    pub grid_layout: GridLayout,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_sessions: DEFAULT_MAX_SESSIONS,
            default_shell: None,
            default_cols: 80,
            default_rows: 24,
            cell_width_px: 9,
            cell_height_px: 18,
            create_timeout_ms: 10_000,
            grid_layout: GridLayout::default(),
        }
    }
}

impl AppConfig {
    /// Seed missing defaults, then read every setting.
    pub fn load(conn: &Connection) -> rusqlite::Result<Self> {
        let defaults = Self::default();
        seed(conn, &defaults)?;

        let default_shell = settings::get(conn, DEFAULT_SHELL)?
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(Self {
            max_sessions: read(conn, MAX_SESSIONS, defaults.max_sessions, |v| *v > 0)?,
            default_shell,
            default_cols: read(conn, DEFAULT_COLS, defaults.default_cols, |v| *v > 0)?,
            default_rows: read(conn, DEFAULT_ROWS, defaults.default_rows, |v| *v > 0)?,
            cell_width_px: read(conn, CELL_WIDTH_PX, defaults.cell_width_px, |v| *v > 0)?,
            cell_height_px: read(conn, CELL_HEIGHT_PX, defaults.cell_height_px, |v| *v > 0)?,
            create_timeout_ms: read(conn, CREATE_TIMEOUT_MS, defaults.create_timeout_ms, |v| *v > 0)?,
            grid_layout: read(conn, GRID_LAYOUT, defaults.grid_layout, |_| true)?,
        })
    }

    pub fn default_size(&self) -> Dimensions {
        Dimensions::new(self.default_cols, self.default_rows)
    }

    pub fn cell_metrics(&self) -> CellMetrics {
        CellMetrics {
            width: self.cell_width_px,
            height: self.cell_height_px,
        }
    }

    pub fn create_timeout(&self) -> Duration {
        Duration::from_millis(self.create_timeout_ms)
    }

    pub fn host_config(&self) -> HostConfig {
        HostConfig {
            max_sessions: self.max_sessions,
            shell: self.default_shell.clone(),
            default_cols: self.default_cols,
            default_rows: self.default_rows,
            default_directory: None,
        }
    }

    /// The initial viewport is sized so a single tabbed session fits the
    /// default grid exactly.
    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            max_sessions: self.max_sessions,
            default_size: self.default_size(),
            grid_layout: self.grid_layout,
            viewport: Viewport {
                width: self.default_cols as u32 * self.cell_width_px,
                height: self.default_rows as u32 * self.cell_height_px,
            },
        }
    }
}

fn seed(conn: &Connection, defaults: &AppConfig) -> rusqlite::Result<()> {
    let values = [
        (MAX_SESSIONS, defaults.max_sessions.to_string()),
        (DEFAULT_COLS, defaults.default_cols.to_string()),
        (DEFAULT_ROWS, defaults.default_rows.to_string()),
        (CELL_WIDTH_PX, defaults.cell_width_px.to_string()),
        (CELL_HEIGHT_PX, defaults.cell_height_px.to_string()),
        (CREATE_TIMEOUT_MS, defaults.create_timeout_ms.to_string()),
        (GRID_LAYOUT, defaults.grid_layout.to_string()),
    ];
    for (key, value) in &values {
        if settings::set_default(conn, key, value)? {
            log::debug!("Seeded setting {key} = {value}");
        }
    }
    Ok(())
}

fn read<T>(conn: &Connection, key: &str, default: T, valid: impl Fn(&T) -> bool) -> rusqlite::Result<T>
where
    T: FromStr + Display,
{
    let Some(raw) = settings::get(conn, key)? else {
        return Ok(default);
    };
    match raw.trim().parse::<T>() {
        Ok(value) if valid(&value) => Ok(value),
        _ => {
            log::warn!("Ignoring invalid setting {key} = {raw:?}, using {default}");
            Ok(default)
        }
    }
}
