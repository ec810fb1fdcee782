use rusqlite::Connection;

/// Current schema version. Bump this when adding migrations.
pub const CURRENT_VERSION: i64 = 1;

pub fn initialize(conn: &Connection) -> rusqlite::Result<()> {
    // Create base tables (idempotent)
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );

        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        ",
    )?;

    migrate(conn)?;
    Ok(())
}

/// Highest applied migration, 0 for a fresh database.
pub fn version(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
}

fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    if version(conn)? < 1 {
        conn.execute(
            "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
            [CURRENT_VERSION],
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        initialize(&conn).unwrap();

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
        assert_eq!(version(&conn).unwrap(), CURRENT_VERSION);
    }
}
