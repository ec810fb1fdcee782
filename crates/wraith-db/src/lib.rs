//! wraith-db: the SQLite settings store behind wraith's configuration.

pub mod schema;
pub mod settings;

use rusqlite::Connection;
use std::path::Path;

/// Open (or create) the database at `path` and bring its schema up to date.
pub fn open(path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    schema::initialize(&conn)?;
    Ok(conn)
}

/// A throwaway database, used when nothing should touch the disk.
pub fn open_in_memory() -> rusqlite::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    schema::initialize(&conn)?;
    Ok(conn)
}
