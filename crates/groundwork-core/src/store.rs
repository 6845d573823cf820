//! StateStore — the embedded SQLite store owned by the service
//!
//! Opening rules:
//! - the file is created if absent, never truncated or rewritten if present
//! - anything other than a regular file at the store path is a `PathConflict`
//! - `PRAGMA quick_check` must report `ok` before anything is written
//! - rollback journal (`DELETE`): the `-journal` file only exists while a write
//!   transaction is open, so the storage root holds just the store file
//!
//! Migrations run inside a `BEGIN IMMEDIATE` transaction, which takes SQLite's
//! RESERVED lock up front. Two instances sharing a volume therefore serialize on
//! the migration step; the loser waits out `busy_timeout`, then finds nothing
//! pending.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{params, Connection, ErrorCode, OpenFlags, TransactionBehavior};
use tracing::{debug, info, warn};

use crate::config::StoreSettings;
use crate::error::{BootstrapError, Result};
use crate::migrations::{AppliedMigration, Migration};

const MARKER_TABLE_DDL: &str = "
    CREATE TABLE IF NOT EXISTS schema_migrations (
        version       INTEGER PRIMARY KEY,
        name          TEXT NOT NULL,
        checksum      TEXT NOT NULL,
        applied_at_ms INTEGER NOT NULL
    );
";

/// Exclusive handle on the service's embedded store
#[derive(Debug)]
pub struct StateStore {
    conn: Connection,
    path: PathBuf,
}

impl StateStore {
    /// Open (or create) the store at `path` and validate it.
    pub fn open(path: impl AsRef<Path>, settings: &StoreSettings) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let existed = match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => true,
            Ok(_) => return Err(BootstrapError::PathConflict { path }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => return Err(BootstrapError::from_io(&path, e)),
        };
        let fail = |e: rusqlite::Error| BootstrapError::from_sqlite(&path, e);

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(fail)?;

        conn.busy_timeout(Duration::from_millis(settings.busy_timeout_ms))
            .map_err(fail)?;

        // Validate before the first write so a foreign file is never touched
        let check: String = conn
            .query_row("PRAGMA quick_check", [], |row| row.get(0))
            .map_err(fail)?;
        if check != "ok" {
            return Err(BootstrapError::StoreCorrupt {
                path,
                reason: format!("quick_check: {}", check),
            });
        }

        conn.execute_batch(
            "PRAGMA journal_mode = DELETE;
             PRAGMA foreign_keys = ON;",
        )
        .map_err(fail)?;

        if existed {
            info!("Opened existing store: {}", path.display());
        } else {
            info!("Created store: {}", path.display());
        }

        Ok(Self { conn, path })
    }

    /// Open a private in-memory store (tests and dry runs)
    pub fn in_memory() -> Result<Self> {
        let path = PathBuf::from(":memory:");
        let conn = Connection::open_in_memory()
            .map_err(|e| BootstrapError::from_sqlite(&path, e))?;
        Ok(Self { conn, path })
    }

    /// Location of the store file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Borrow the underlying connection
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Mutably borrow the underlying connection (for transactions)
    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Apply every migration not yet recorded in the marker table.
    ///
    /// `migrations` must already be normalized (sorted, unique, positive).
    /// Returns the migrations applied by this call.
    pub fn migrate(&mut self, migrations: &[Migration]) -> Result<Vec<AppliedMigration>> {
        let path = self.path.clone();
        let fail = |e: rusqlite::Error| BootstrapError::from_sqlite(&path, e);

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(fail)?;

        tx.execute_batch(MARKER_TABLE_DDL).map_err(fail)?;

        let recorded: HashMap<i64, String> = {
            let mut stmt = tx
                .prepare("SELECT version, checksum FROM schema_migrations")
                .map_err(fail)?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
                .map_err(fail)?;
            rows.collect::<rusqlite::Result<_>>().map_err(fail)?
        };

        for m in migrations {
            if let Some(checksum) = recorded.get(&m.version) {
                if *checksum != m.checksum() {
                    return Err(BootstrapError::StoreCorrupt {
                        path: path.clone(),
                        reason: format!(
                            "migration {} ({}) changed since it was applied",
                            m.version, m.name
                        ),
                    });
                }
            }
        }

        let newest_known = migrations.last().map(|m| m.version).unwrap_or(0);
        if let Some(newest_recorded) = recorded.keys().max() {
            if *newest_recorded > newest_known {
                warn!(
                    "Store schema version {} is newer than this build knows ({})",
                    newest_recorded, newest_known
                );
            }
        }

        let mut applied = Vec::new();
        for m in migrations.iter().filter(|m| !recorded.contains_key(&m.version)) {
            tx.execute_batch(&m.sql).map_err(|e| match e.sqlite_error_code() {
                // Plain SQLITE_ERROR: the migration body itself is broken
                Some(ErrorCode::Unknown) => BootstrapError::Migration {
                    version: m.version,
                    reason: e.to_string(),
                },
                _ => BootstrapError::from_sqlite(&path, e),
            })?;

            let record = AppliedMigration {
                version: m.version,
                name: m.name.clone(),
                checksum: m.checksum(),
                applied_at_ms: chrono::Utc::now().timestamp_millis(),
            };
            tx.execute(
                "INSERT INTO schema_migrations (version, name, checksum, applied_at_ms)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.version,
                    record.name,
                    record.checksum,
                    record.applied_at_ms
                ],
            )
            .map_err(fail)?;

            info!("Applied migration {} ({})", m.version, m.name);
            applied.push(record);
        }

        tx.commit().map_err(fail)?;

        if applied.is_empty() {
            debug!("No pending migrations for {}", self.path.display());
        }
        Ok(applied)
    }

    /// Migrations recorded in the marker table, oldest first
    pub fn applied_migrations(&self) -> Result<Vec<AppliedMigration>> {
        let fail = |e: rusqlite::Error| BootstrapError::from_sqlite(&self.path, e);

        if !self.has_marker_table()? {
            return Ok(Vec::new());
        }

        let mut stmt = self
            .conn
            .prepare(
                "SELECT version, name, checksum, applied_at_ms
                 FROM schema_migrations ORDER BY version ASC",
            )
            .map_err(fail)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(AppliedMigration {
                    version: row.get(0)?,
                    name: row.get(1)?,
                    checksum: row.get(2)?,
                    applied_at_ms: row.get(3)?,
                })
            })
            .map_err(fail)?;

        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(fail)
    }

    /// Highest applied migration version, 0 for a fresh store
    pub fn schema_version(&self) -> Result<i64> {
        if !self.has_marker_table()? {
            return Ok(0);
        }
        self.conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
                [],
                |row| row.get(0),
            )
            .map_err(|e| BootstrapError::from_sqlite(&self.path, e))
    }

    /// Summary of the store for status output
    pub fn stats(&self) -> Result<serde_json::Value> {
        let journal_mode: String = self
            .conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .map_err(|e| BootstrapError::from_sqlite(&self.path, e))?;

        Ok(serde_json::json!({
            "path": self.path.display().to_string(),
            "schema_version": self.schema_version()?,
            "migrations": self.applied_migrations()?,
            "journal_mode": journal_mode,
        }))
    }

    /// Release the connection
    pub fn close(self) -> Result<()> {
        let path = self.path;
        self.conn
            .close()
            .map_err(|(_, e)| BootstrapError::from_sqlite(&path, e))?;
        debug!("Closed store: {}", path.display());
        Ok(())
    }

    fn has_marker_table(&self) -> Result<bool> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'schema_migrations'",
                [],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n > 0)
            .map_err(|e| BootstrapError::from_sqlite(&self.path, e))
    }
}
