use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tracing::{debug, warn};

use crate::error::{EXIT_INTERRUPTED, QdbError};

/// Cooperative cancellation flag.
///
/// Ctrl-C only flips the flag; work already on the wire runs to completion and
/// the next step boundary turns the flag into [`QdbError::Interrupted`]. Cleanup
/// statements never consult the flag, so rollback still runs after an
/// interrupt. While a [`Shield`] is alive a second Ctrl-C is ignored.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
    shields: Arc<AtomicUsize>,
}

/// Keeps a forced exit from cutting a rollback short.
#[derive(Debug)]
pub struct Shield {
    shields: Arc<AtomicUsize>,
}

impl Drop for Shield {
    fn drop(&mut self) {
        self.shields.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a flag fed by Ctrl-C. A second Ctrl-C exits immediately
    /// unless a rollback is running. Must be called from within the tokio
    /// runtime.
    pub fn listen() -> Self {
        let interrupt = Self::new();
        let watcher = interrupt.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            warn!("interrupt received, stopping after the current step (press Ctrl-C again to force)");
            watcher.trigger();
            while tokio::signal::ctrl_c().await.is_ok() {
                if watcher.force_exit_allowed() {
                    std::process::exit(EXIT_INTERRUPTED);
                }
                warn!("rollback in progress, Ctrl-C ignored until it finishes");
            }
        });
        interrupt
    }

    /// Hold off forced exit until the returned guard is dropped.
    pub fn shield(&self) -> Shield {
        self.shields.fetch_add(1, Ordering::SeqCst);
        debug!("rollback started, forced exit is disabled");
        Shield {
            shields: self.shields.clone(),
        }
    }

    /// True when a second Ctrl-C may terminate the process.
    pub fn force_exit_allowed(&self) -> bool {
        self.shields.load(Ordering::SeqCst) == 0
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Step boundary check.
    pub fn check(&self) -> Result<(), QdbError> {
        if self.is_triggered() {
            Err(QdbError::Interrupted)
        } else {
            Ok(())
        }
    }
}

