//! Versioned schema migrations for the reference store.
//!
//! Migrations are tracked in the `meta` table with key `schema_version`.
//! Each migration has a version number and runs exactly once.

use rusqlite::Connection;

use crate::error::{IndexerError, Result};

/// Current schema version. Increment when adding new migrations.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

type MigrationFn = fn(&Connection) -> Result<()>;

/// All migrations in order. Index + 1 = version number.
const MIGRATIONS: &[MigrationFn] = &[migration_v1_base_schema, migration_v2_lookup_indexes];

/// Runs all pending migrations on the database.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    for (idx, migration) in MIGRATIONS.iter().enumerate() {
        let version = (idx + 1) as u32;
        if version > current_version {
            migration(conn)?;
            set_schema_version(conn, version)?;
        }
    }

    Ok(())
}

fn get_schema_version(conn: &Connection) -> Result<u32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS meta (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
        [],
    )?;
    Ok(read_schema_version(conn))
}

/// Reads the version without touching the schema, so it works on read-only snapshots.
fn read_schema_version(conn: &Connection) -> u32 {
    conn.query_row(
        "SELECT value FROM meta WHERE key = 'schema_version'",
        [],
        |row| row.get::<_, String>(0),
    )
    .ok()
    .and_then(|v| v.parse().ok())
    .unwrap_or(0)
}

fn set_schema_version(conn: &Connection, version: u32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO meta (key, value) VALUES ('schema_version', ?1)",
        [version.to_string()],
    )?;
    Ok(())
}

/// Checks that a snapshot opened for reading was written by a compatible build.
pub fn verify_schema_compatibility(conn: &Connection) -> Result<()> {
    let current = read_schema_version(conn);

    if current == 0 {
        return Err(IndexerError::Index(
            "Snapshot is not initialized. Run `ref-indexer index` first.".to_string(),
        ));
    }

    if current > CURRENT_SCHEMA_VERSION {
        return Err(IndexerError::Index(format!(
            "Snapshot schema version {} is newer than this binary ({}).",
            current, CURRENT_SCHEMA_VERSION
        )));
    }

    Ok(())
}

// ============================================================================
// Migrations
// ============================================================================

/// V1: files, refs, defs and usages with foreign keys.
fn migration_v1_base_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS files (
            id TEXT PRIMARY KEY,
            path TEXT NOT NULL UNIQUE,
            content TEXT
        );

        CREATE TABLE IF NOT EXISTS refs (
            id TEXT PRIMARY KEY,
            kind TEXT CHECK (kind IN ('function', 'component', 'constant'))
        );

        CREATE TABLE IF NOT EXISTS defs (
            id TEXT PRIMARY KEY,
            fileId TEXT NOT NULL REFERENCES files(id),
            name TEXT NOT NULL,
            refId TEXT NOT NULL REFERENCES refs(id),
            parentRefId TEXT REFERENCES refs(id),
            startPos INTEGER,
            endPos INTEGER
        );

        CREATE TABLE IF NOT EXISTS usages (
            id TEXT PRIMARY KEY,
            fileId TEXT NOT NULL REFERENCES files(id),
            refId TEXT NOT NULL REFERENCES refs(id),
            parentRefId TEXT REFERENCES refs(id),
            usedAs TEXT NOT NULL,
            startPos INTEGER,
            endPos INTEGER
        );
        "#,
    )?;
    Ok(())
}

/// V2: indexes for merge rewrites and per-ref lookups.
fn migration_v2_lookup_indexes(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE INDEX IF NOT EXISTS idx_defs_ref ON defs(refId);
        CREATE INDEX IF NOT EXISTS idx_defs_file ON defs(fileId);
        CREATE INDEX IF NOT EXISTS idx_usages_ref ON usages(refId);
        CREATE INDEX IF NOT EXISTS idx_usages_file ON usages(fileId);
        "#,
    )?;
    Ok(())
}
