//! Versioned schema migrations
//!
//! The bootstrap does not own the application's schema. It only guarantees that
//! whatever migrations the application ships are applied exactly once, in
//! version order, and that an applied migration is never silently edited.
//! Each migration is fingerprinted with a BLAKE3 hash of its SQL.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BootstrapError, Result};

/// A single schema change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    /// Strictly positive, unique version number
    pub version: i64,
    /// Short human-readable name
    pub name: String,
    /// SQL batch to run
    pub sql: String,
}

impl Migration {
    /// Create a migration
    pub fn new(version: i64, name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            version,
            name: name.into(),
            sql: sql.into(),
        }
    }

    /// BLAKE3 hex digest of the SQL body
    pub fn checksum(&self) -> String {
        blake3::hash(self.sql.as_bytes()).to_hex().to_string()
    }
}

/// A migration as recorded in the store's marker table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedMigration {
    pub version: i64,
    pub name: String,
    pub checksum: String,
    pub applied_at_ms: i64,
}

/// Sort migrations by version and reject duplicates or non-positive versions.
pub fn normalize(mut migrations: Vec<Migration>) -> Result<Vec<Migration>> {
    migrations.sort_by_key(|m| m.version);

    let mut seen = HashSet::new();
    for m in &migrations {
        if m.version <= 0 {
            return Err(BootstrapError::Migration {
                version: m.version,
                reason: "version must be positive".to_string(),
            });
        }
        if !seen.insert(m.version) {
            return Err(BootstrapError::Migration {
                version: m.version,
                reason: "duplicate version".to_string(),
            });
        }
    }

    Ok(migrations)
}

/// Load `<version>_<name>.sql` files from `dir`.
///
/// Entries that do not follow the naming pattern are skipped.
pub fn load_dir(dir: &Path) -> Result<Vec<Migration>> {
    let entries = fs::read_dir(dir).map_err(|e| {
        BootstrapError::Config(format!("migrations directory {}: {}", dir.display(), e))
    })?;

    let mut migrations = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| {
            BootstrapError::Config(format!("migrations directory {}: {}", dir.display(), e))
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some((version, name)) = parse_file_name(&entry.file_name().to_string_lossy()) else {
            continue;
        };
        let sql = fs::read_to_string(&path)
            .map_err(|e| BootstrapError::Config(format!("migration {}: {}", path.display(), e)))?;
        migrations.push(Migration::new(version, name, sql));
    }

    normalize(migrations)
}

fn parse_file_name(file_name: &str) -> Option<(i64, String)> {
    let stem = file_name.strip_suffix(".sql")?;
    let (version, name) = stem.split_once('_')?;
    if version.is_empty() || !version.bytes().all(|b| b.is_ascii_digit()) || name.is_empty() {
        return None;
    }
    Some((version.parse().ok()?, name.to_string()))
}
