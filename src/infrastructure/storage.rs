use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::Path;

const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

pub fn initialize_database(path: &Path) -> Result<(), InfraError> {
    let connection = open_connection(path)?;
    connection.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

pub(crate) fn open_connection(path: &Path) -> Result<Connection, InfraError> {
    let connection = Connection::open(path)?;
    connection.busy_timeout(std::time::Duration::from_secs(5))?;
    Ok(connection)
}

pub(crate) fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339()
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| format!("invalid timestamp '{raw}': {error}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_applies_twice_without_error() {
        let path = std::env::temp_dir().join(format!(
            "lifesync-storage-tests-{}.sqlite",
            std::process::id()
        ));
        initialize_database(&path).expect("first init");
        initialize_database(&path).expect("second init");

        let connection = open_connection(&path).expect("open");
        let tables: i64 = connection
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('tasks', 'focus_sessions', 'task_reminder_log')",
                [],
                |row| row.get(0),
            )
            .expect("count tables");
        assert_eq!(tables, 3);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn timestamps_keep_utc_instant() {
        let parsed = parse_timestamp("2026-03-01T10:00:00+02:00").expect("parse");
        assert_eq!(format_timestamp(parsed), "2026-03-01T08:00:00+00:00");
        assert!(parse_timestamp("yesterday").is_err());
    }
}
