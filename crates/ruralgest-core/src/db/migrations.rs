//! Database migrations

use rusqlite::{Connection, OptionalExtension};

use crate::error::Result;
use crate::models::Collection;

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version = conn
        .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
            row.get::<_, Option<i32>>(0)
        })
        .optional()?
        .flatten()
        .unwrap_or(0);

    Ok(version)
}

/// Migration to version 1: entity collections, sync metadata, pending queue
fn migrate_v1(conn: &Connection) -> Result<()> {
    let mut script = String::from(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );
        CREATE TABLE IF NOT EXISTS sync_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS pending_sync (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            action TEXT NOT NULL,
            endpoint TEXT NOT NULL,
            body TEXT NOT NULL,
            created_at TEXT NOT NULL
        );",
    );

    // One keyed table per collection; rowid keeps first-insertion order.
    for collection in Collection::ALL {
        script.push_str(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                key TEXT PRIMARY KEY,
                body TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );",
            table = collection.table_name()
        ));
    }

    script.push_str("INSERT INTO schema_version (version) VALUES (1);");

    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(&script)?;
    tx.commit()?;

    tracing::info!("Migrated local store to version 1");
    Ok(())
}

/// Migration to version 2: replay attempt tracking and dead letters
fn migrate_v2(conn: &Connection) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "ALTER TABLE pending_sync ADD COLUMN attempts INTEGER NOT NULL DEFAULT 0;
        CREATE TABLE IF NOT EXISTS pending_sync_dead (
            id INTEGER PRIMARY KEY,
            action TEXT NOT NULL,
            endpoint TEXT NOT NULL,
            body TEXT NOT NULL,
            created_at TEXT NOT NULL,
            attempts INTEGER NOT NULL,
            failed_at TEXT NOT NULL,
            error TEXT NOT NULL
        );
        INSERT INTO schema_version (version) VALUES (2);",
    )?;
    tx.commit()?;

    tracing::info!("Migrated local store to version {CURRENT_VERSION}");
    Ok(())
}
