//! Bootstrap initializer
//!
//! Runs once per process start, before any work loop:
//!
//! ```text
//!   prepare_layout ──► on_layout hook ──► open_store ──► migrate ──► Ready
//!        │                  │                 │             │
//!        └──────────────────┴─────────────────┴─────────────┴──────► Failed(reason)
//! ```
//!
//! A `Bootstrap` is consumed by [`Bootstrap::initialize`], [`Bootstrap::spawn`]
//! and [`Bootstrap::run`], so a single instance can never initialize twice.
//!
//! [`Bootstrap::run`] drives the phases on a detached thread. When the startup
//! window closes first, the bootstrap is cancelled: it stops at the next phase
//! boundary, and the process may exit without joining the thread.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tracing::{error, info};

use crate::config::GroundworkConfig;
use crate::error::{BootstrapError, FailureKind, Result};
use crate::layout::Layout;
use crate::migrations::{self, Migration};
use crate::readiness::{readiness_channel, ReadinessNotifier, ReadinessSignal, Runtime};
use crate::store::StateStore;

type LayoutHook = Box<dyn FnOnce(&Layout) -> Result<()> + Send>;

/// Single-shot bootstrap of roots and store
pub struct Bootstrap {
    config: GroundworkConfig,
    migrations: Vec<Migration>,
    on_layout: Option<LayoutHook>,
    cancelled: Arc<AtomicBool>,
}

impl fmt::Debug for Bootstrap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bootstrap")
            .field("config", &self.config)
            .field("migrations", &self.migrations.len())
            .field("on_layout", &self.on_layout.is_some())
            .field("cancelled", &self.cancelled.load(Ordering::SeqCst))
            .finish()
    }
}

impl Bootstrap {
    /// Create a bootstrap for `config`
    pub fn new(config: GroundworkConfig) -> Self {
        Self {
            config,
            migrations: Vec::new(),
            on_layout: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Add migrations shipped with the application
    pub fn with_migrations(mut self, migrations: impl IntoIterator<Item = Migration>) -> Self {
        self.migrations.extend(migrations);
        self
    }

    /// Run `hook` once both roots are confirmed, before the store is opened.
    ///
    /// Used to install file logging inside the log root. An error from the hook
    /// fails the bootstrap.
    pub fn on_layout_ready<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&Layout) -> Result<()> + Send + 'static,
    {
        self.on_layout = Some(Box::new(hook));
        self
    }

    /// The configuration this bootstrap runs with
    pub fn config(&self) -> &GroundworkConfig {
        &self.config
    }

    /// Phase 1: establish the storage and log roots
    pub fn prepare_layout(&self) -> Result<Layout> {
        Layout::prepare(
            &self.config.storage_root,
            &self.config.log_root,
            &self.config.store.file_name,
        )
    }

    /// Phase 2: open the store under the storage root and apply migrations
    pub fn open_store(&self, layout: &Layout) -> Result<StateStore> {
        let migrations = self.collect_migrations()?;

        let mut store = StateStore::open(layout.store_path(), &self.config.store)?;
        self.checkpoint()?;
        store.migrate(&migrations)?;
        Ok(store)
    }

    /// Run both phases on the current thread.
    pub fn initialize(mut self) -> ReadinessSignal {
        let on_layout = self.on_layout.take();
        let result = self
            .config
            .validate()
            .and_then(|()| self.checkpoint())
            .and_then(|()| self.prepare_layout())
            .and_then(|layout| {
                if let Some(hook) = on_layout {
                    hook(&layout)?;
                }
                self.checkpoint()?;
                let store = self.open_store(&layout)?;
                Ok(Runtime::new(layout, store))
            });

        match &result {
            Ok(runtime) => info!(
                "Bootstrap ready: storage={} logs={} store={}",
                runtime.layout().storage_root().display(),
                runtime.layout().log_root().display(),
                runtime.layout().store_path().display()
            ),
            Err(e) => error!("Bootstrap failed ({}): {}", e.kind(), e),
        }

        result.into()
    }

    /// Run the bootstrap on a dedicated thread and report through `notifier`.
    ///
    /// A panic inside the bootstrap (including the layout hook) is reported as
    /// [`BootstrapError::Internal`]. Dropping the handle detaches the thread.
    pub fn spawn(self, notifier: ReadinessNotifier) -> Result<thread::JoinHandle<()>> {
        thread::Builder::new()
            .name("groundwork-bootstrap".to_string())
            .spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(move || self.initialize()));
                let signal = match outcome {
                    Ok(signal) => signal,
                    Err(payload) => {
                        let reason =
                            format!("bootstrap panicked: {}", panic_message(payload.as_ref()));
                        error!("{}", reason);
                        ReadinessSignal::Failed(BootstrapError::Internal(reason))
                    }
                };
                if !notifier.report(signal) {
                    // The startup window closed first; the store handle was dropped with the signal
                    error!("Bootstrap finished after the startup window closed");
                }
            })
            .map_err(|e| BootstrapError::Internal(format!("cannot start bootstrap thread: {}", e)))
    }

    /// Run the bootstrap bounded by the configured startup timeout.
    ///
    /// On timeout the bootstrap is cancelled: it opens no store and applies no
    /// migration past that point.
    pub async fn run(self) -> ReadinessSignal {
        if let Err(e) = self.config.validate() {
            error!("Bootstrap failed ({}): {}", e.kind(), e);
            return ReadinessSignal::Failed(e);
        }

        let timeout = self.config.startup_timeout();
        let cancelled = self.cancelled.clone();
        let (notifier, watch) = readiness_channel();
        if let Err(e) = self.spawn(notifier) {
            error!("Bootstrap failed ({}): {}", e.kind(), e);
            return ReadinessSignal::Failed(e);
        }

        let signal = watch.wait(timeout).await;
        if signal.failure_kind() == Some(FailureKind::Timeout) {
            cancelled.store(true, Ordering::SeqCst);
        }
        signal
    }

    /// Fail with `Timeout` once the startup window has been given up on
    fn checkpoint(&self) -> Result<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(BootstrapError::Timeout(self.config.startup_timeout()));
        }
        Ok(())
    }

    fn collect_migrations(&self) -> Result<Vec<Migration>> {
        let mut all = self.migrations.clone();
        if let Some(dir) = &self.config.store.migrations_dir {
            all.extend(migrations::load_dir(dir)?);
        }
        migrations::normalize(all)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

/// Bootstrap `storage_root` and `log_root` with default settings.
pub fn initialize(storage_root: impl Into<PathBuf>, log_root: impl Into<PathBuf>) -> ReadinessSignal {
    let config = GroundworkConfig::default()
        .with_storage_root(storage_root)
        .with_log_root(log_root);
    Bootstrap::new(config).initialize()
}
