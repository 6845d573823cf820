//! Groundwork Core - deterministic startup for containerized services
//!
//! On every process start Groundwork establishes the durable-storage surface a
//! long-running service needs, whether the volume underneath is fresh,
//! half-initialized or already populated by an earlier run:
//!
//! 1. **Layout** (`layout`): storage root and log root exist, are directories and are writable
//! 2. **Store** (`store`): the embedded SQLite store is created or opened and validated
//! 3. **Migrations** (`migrations`): pending schema migrations are applied exactly once
//! 4. **Readiness** (`readiness`): exactly one terminal signal, `Ready` or `Failed(reason)`
//!
//! # Quick Start
//!
//! ```no_run
//! use groundwork_core::{Bootstrap, GroundworkConfig, Migration, ReadinessSignal};
//!
//! let config = GroundworkConfig::default()
//!     .with_storage_root("data")
//!     .with_log_root("logs");
//!
//! let signal = Bootstrap::new(config)
//!     .with_migrations([Migration::new(1, "init", "CREATE TABLE IF NOT EXISTS kv (k TEXT PRIMARY KEY, v TEXT);")])
//!     .initialize();
//!
//! match signal {
//!     ReadinessSignal::Ready(runtime) => {
//!         println!("store at {}", runtime.layout().store_path().display());
//!         runtime.shutdown().unwrap();
//!     }
//!     ReadinessSignal::Failed(reason) => {
//!         eprintln!("startup failed: {reason}");
//!         std::process::exit(1);
//!     }
//! }
//! ```
//!
//! # Guarantees
//!
//! - **Idempotent**: running the bootstrap against a prepared volume changes nothing on disk
//! - **Inspect before mutate**: a conflicting path fails the run before any directory is created
//! - **No partial success**: either both roots and the store are ready, or startup fails
//! - **Bounded**: [`Bootstrap::run`] gives up after the configured startup window

#![deny(unsafe_code)]
#![warn(rust_2018_idioms, missing_debug_implementations, clippy::all)]

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod layout;
pub mod logging;
pub mod migrations;
pub mod readiness;
pub mod store;

// Re-export commonly used types for convenience
pub use bootstrap::{initialize, Bootstrap};
pub use config::{GroundworkConfig, LogRotation, LogSettings, StoreSettings};
pub use error::{BootstrapError, FailureKind, Result};
pub use layout::{inspect_root, Layout, RootKind, RootState};
pub use migrations::{AppliedMigration, Migration};
pub use readiness::{readiness_channel, ReadinessNotifier, ReadinessSignal, ReadinessWatch, Runtime};
pub use store::StateStore;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
