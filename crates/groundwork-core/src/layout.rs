//! Storage and log root layout
//!
//! Establishes the two directories a service needs before it can persist or
//! log anything. Every root goes through the same two steps:
//!
//! 1. [`inspect_root`] — a pure, non-mutating look at the path
//! 2. [`ensure_root`] — create it if missing, then prove it is writable
//!
//! [`Layout::prepare`] inspects *both* roots before touching either one, so a
//! conflict on the log root never leaves a half-created storage root behind.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{BootstrapError, Result};

/// Mode for directories created by the bootstrap
#[cfg(unix)]
const ROOT_DIR_MODE: u32 = 0o750;

/// Prefix of the throwaway file used to prove a root is writable
const PROBE_PREFIX: &str = ".groundwork-probe-";

/// Which role a root directory plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RootKind {
    /// Durable, structured data (the store lives here)
    Storage,
    /// Append-only operational output
    Log,
}

impl std::fmt::Display for RootKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RootKind::Storage => f.write_str("storage root"),
            RootKind::Log => f.write_str("log root"),
        }
    }
}

/// What is currently at a root path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootState {
    /// Nothing there yet
    Missing,
    /// An existing directory; `readonly` reflects its permission bits only
    Directory { readonly: bool },
    /// Something that is not a directory (or sits under a non-directory)
    Conflict,
}

/// Look at `path` without changing anything on disk.
pub fn inspect_root(path: &Path) -> Result<RootState> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(RootState::Directory {
            readonly: meta.permissions().readonly(),
        }),
        Ok(_) => Ok(RootState::Conflict),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(RootState::Missing),
        // An ancestor is a regular file
        Err(e) if e.kind() == io::ErrorKind::NotADirectory => Ok(RootState::Conflict),
        Err(e) => Err(BootstrapError::from_io(path, e)),
    }
}

/// Make sure `path` is an existing, writable directory.
///
/// Missing directories are created together with their ancestors. Running this
/// against an already prepared root changes nothing on disk.
pub fn ensure_root(path: &Path, kind: RootKind) -> Result<()> {
    match inspect_root(path)? {
        RootState::Conflict => return Err(BootstrapError::PathConflict { path: path.into() }),
        RootState::Directory { readonly } => {
            debug!("{} already present: {}", kind, path.display());
            if readonly {
                warn!("{} {} has read-only permission bits", kind, path.display());
            }
        }
        RootState::Missing => {
            create_root_dir(path)?;
            // Another instance may have raced us with something other than a directory
            if !matches!(inspect_root(path)?, RootState::Directory { .. }) {
                return Err(BootstrapError::PathConflict { path: path.into() });
            }
            info!("Created {}: {}", kind, path.display());
        }
    }

    probe_writable(path)
}

fn create_root_dir(path: &Path) -> Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(ROOT_DIR_MODE);
    }

    // A file racing into place surfaces as AlreadyExists/NotADirectory: PathConflict
    builder.create(path).map_err(|e| BootstrapError::from_io(path, e))
}

/// Create and remove a uniquely named file inside `path`.
fn probe_writable(path: &Path) -> Result<()> {
    let probe = tempfile::Builder::new()
        .prefix(PROBE_PREFIX)
        .tempfile_in(path)
        .map_err(|e| BootstrapError::from_io(path, e))?;
    probe.close().map_err(|e| BootstrapError::from_io(path, e))
}

/// The confirmed on-disk layout of a bootstrapped service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Layout {
    storage_root: PathBuf,
    log_root: PathBuf,
    store_path: PathBuf,
}

impl Layout {
    /// Establish both roots and derive the store location.
    ///
    /// Both roots are inspected first; a conflict on either one fails the call
    /// before any directory is created.
    pub fn prepare(
        storage_root: impl Into<PathBuf>,
        log_root: impl Into<PathBuf>,
        store_file: &str,
    ) -> Result<Self> {
        let storage_root = storage_root.into();
        let log_root = log_root.into();

        check_root_path(&storage_root, RootKind::Storage)?;
        check_root_path(&log_root, RootKind::Log)?;
        check_store_file(store_file)?;

        for path in [&storage_root, &log_root] {
            if inspect_root(path)? == RootState::Conflict {
                return Err(BootstrapError::PathConflict { path: path.clone() });
            }
        }

        ensure_root(&storage_root, RootKind::Storage)?;
        ensure_root(&log_root, RootKind::Log)?;

        let store_path = storage_root.join(store_file);
        Ok(Self {
            storage_root,
            log_root,
            store_path,
        })
    }

    /// Directory holding the store and other persisted artifacts
    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    /// Directory holding log output
    pub fn log_root(&self) -> &Path {
        &self.log_root
    }

    /// Location of the embedded store file
    pub fn store_path(&self) -> &Path {
        &self.store_path
    }
}

fn check_root_path(path: &Path, kind: RootKind) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(BootstrapError::Config(format!("{} path is empty", kind)));
    }
    Ok(())
}

fn check_store_file(name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(BootstrapError::Config(format!(
            "store file name '{}' must be a single path component",
            name
        ))),
    }
}
