//! Readiness reporting
//!
//! The bootstrap ends in exactly one of two terminal states. The signal travels
//! over a single-use channel: [`ReadinessNotifier::report`] consumes the
//! notifier and [`ReadinessWatch::wait`] consumes the watch, so neither side can
//! report or observe twice.

use std::time::Duration;

use tokio::sync::oneshot;

use crate::error::{BootstrapError, FailureKind, Result};
use crate::layout::Layout;
use crate::store::StateStore;

/// Resources established by a successful bootstrap
///
/// Owned by the process for its whole lifetime and handed by reference to the
/// components that need persistence.
#[derive(Debug)]
pub struct Runtime {
    layout: Layout,
    store: StateStore,
}

impl Runtime {
    pub(crate) fn new(layout: Layout, store: StateStore) -> Self {
        Self { layout, store }
    }

    /// Confirmed directory layout
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// The open store
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// The open store, mutably
    pub fn store_mut(&mut self) -> &mut StateStore {
        &mut self.store
    }

    /// Split into layout and store
    pub fn into_parts(self) -> (Layout, StateStore) {
        (self.layout, self.store)
    }

    /// Release the store on clean shutdown
    pub fn shutdown(self) -> Result<()> {
        self.store.close()
    }
}

/// Terminal outcome of the bootstrap
#[derive(Debug)]
pub enum ReadinessSignal {
    /// Both roots confirmed and the store is open
    Ready(Runtime),
    /// Startup must abort
    Failed(BootstrapError),
}

impl ReadinessSignal {
    /// Whether the bootstrap succeeded
    pub fn is_ready(&self) -> bool {
        matches!(self, ReadinessSignal::Ready(_))
    }

    /// Failure category, if the bootstrap failed
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            ReadinessSignal::Ready(_) => None,
            ReadinessSignal::Failed(e) => Some(e.kind()),
        }
    }

    /// Convert into a `Result`
    pub fn into_result(self) -> Result<Runtime> {
        match self {
            ReadinessSignal::Ready(runtime) => Ok(runtime),
            ReadinessSignal::Failed(e) => Err(e),
        }
    }
}

impl From<Result<Runtime>> for ReadinessSignal {
    fn from(result: Result<Runtime>) -> Self {
        match result {
            Ok(runtime) => ReadinessSignal::Ready(runtime),
            Err(e) => ReadinessSignal::Failed(e),
        }
    }
}

/// Create a connected notifier/watch pair
pub fn readiness_channel() -> (ReadinessNotifier, ReadinessWatch) {
    let (tx, rx) = oneshot::channel();
    (ReadinessNotifier { tx }, ReadinessWatch { rx })
}

/// Sending half, held by the bootstrap
#[derive(Debug)]
pub struct ReadinessNotifier {
    tx: oneshot::Sender<ReadinessSignal>,
}

impl ReadinessNotifier {
    /// Deliver the terminal signal.
    ///
    /// Returns `false` if nobody is waiting anymore (e.g. the startup window
    /// already closed); the signal, and any store it carries, is dropped.
    pub fn report(self, signal: ReadinessSignal) -> bool {
        self.tx.send(signal).is_ok()
    }
}

/// Receiving half, held by the supervisor side
#[derive(Debug)]
pub struct ReadinessWatch {
    rx: oneshot::Receiver<ReadinessSignal>,
}

impl ReadinessWatch {
    /// Wait up to `timeout` for the signal.
    pub async fn wait(self, timeout: Duration) -> ReadinessSignal {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(signal)) => signal,
            Ok(Err(_)) => ReadinessSignal::Failed(BootstrapError::Internal(
                "bootstrap worker ended without reporting".to_string(),
            )),
            Err(_) => ReadinessSignal::Failed(BootstrapError::Timeout(timeout)),
        }
    }
}
