//! Schema migrations for the SQLite backend
//!
//! The initial schema (version 1) is created by [`super::sqlite`]. Every later
//! change is appended to [`MIGRATIONS`] with the next version number and is
//! applied in order, inside a single transaction, when the database is opened.
//!
//! # Migration Guidelines
//!
//! 1. Each migration should have a unique, increasing version number
//! 2. Never edit a migration that has shipped; add a new one instead
//! 3. Columns added later must be nullable or carry a default, so rows written
//!    by older versions stay readable

use super::StorageError;
use rusqlite::{Connection, Transaction};
use tracing::info;

/// A forward-only schema change
#[derive(Debug)]
pub struct Migration {
    /// The version number the schema is at after this migration
    pub version: i32,
    /// Short summary, used in log lines
    pub description: &'static str,
    /// SQL statements to apply this migration
    pub up: &'static str,
}

/// List of all database migrations in order of application
pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 2,
    description: "track when work on a task started and ended",
    up: r#"
        ALTER TABLE tasks ADD COLUMN start_time TEXT;
        ALTER TABLE tasks ADD COLUMN end_time TEXT;
    "#,
}];

/// Version the schema ends at once every migration is applied
pub fn latest_version() -> i32 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(1)
}

/// Get the current schema version from the database
pub fn get_current_version(conn: &Connection) -> Result<i32, StorageError> {
    let version: i32 = conn
        .query_row("SELECT version FROM schema_version", [], |row| row.get(0))
        .map_err(|e| StorageError::Storage(format!("Failed to get schema version: {}", e)))?;
    Ok(version)
}

/// Apply any pending migrations to the database
///
/// All pending migrations run within one transaction, so a failure leaves the
/// schema at its previous version.
pub fn apply_migrations(conn: &mut Connection) -> Result<(), StorageError> {
    let current_version = get_current_version(conn)?;

    if current_version < latest_version() {
        let tx = conn
            .transaction()
            .map_err(|e| StorageError::Storage(format!("Failed to start transaction: {}", e)))?;

        for migration in MIGRATIONS.iter().filter(|m| m.version > current_version) {
            apply_migration(&tx, migration)?;
        }

        tx.commit()
            .map_err(|e| StorageError::Storage(format!("Failed to commit transaction: {}", e)))?;
    }

    Ok(())
}

fn apply_migration(tx: &Transaction, migration: &Migration) -> Result<(), StorageError> {
    tx.execute_batch(migration.up).map_err(|e| {
        StorageError::Storage(format!(
            "Failed to apply migration {}: {}",
            migration.version, e
        ))
    })?;

    tx.execute(
        "UPDATE schema_version SET version = ?1",
        [migration.version],
    )
    .map_err(|e| {
        StorageError::Storage(format!(
            "Failed to update schema version to {}: {}",
            migration.version, e
        ))
    })?;

    info!(
        version = migration.version,
        description = migration.description,
        "applied schema migration"
    );
    Ok(())
}
