//! SIGINT/SIGTERM interception.
//!
//! The handler only records that a termination was requested and wakes
//! whoever is waiting on a stage. Cleanup stays with the coordinator so
//! that it happens in exactly one place.

use crate::error::PipelineError;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Notify;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct TerminationHandler {
    requested: Arc<AtomicBool>,
    signal: Arc<AtomicI32>,
    notify: Arc<Notify>,
}

impl TerminationHandler {
    /// Handler that never fires on its own. Useful when the caller owns
    /// signal handling, and in tests.
    pub fn detached() -> Self {
        Self::default()
    }

    /// Starts listening for SIGINT and SIGTERM. Must be called from inside
    /// a tokio runtime, before the scratch directory exists.
    pub fn install() -> Result<Self, PipelineError> {
        let handler = Self::default();
        let mut interrupt = signal(SignalKind::interrupt())
            .map_err(|e| PipelineError::Signal(format!("SIGINT handler: {}", e)))?;
        let mut terminate = signal(SignalKind::terminate())
            .map_err(|e| PipelineError::Signal(format!("SIGTERM handler: {}", e)))?;

        let listener = handler.clone();
        tokio::spawn(async move {
            loop {
                let signum = tokio::select! {
                    Some(()) = interrupt.recv() => libc::SIGINT,
                    Some(()) = terminate.recv() => libc::SIGTERM,
                    else => break,
                };
                listener.fire(signum);
            }
        });
        Ok(handler)
    }

    /// Simulates a received signal.
    pub fn trigger(&self) {
        self.fire(libc::SIGTERM);
    }

    fn fire(&self, signum: i32) {
        // second and later signals are ignored
        if self.requested.swap(true, Ordering::SeqCst) {
            return;
        }
        self.signal.store(signum, Ordering::SeqCst);
        info!(signal = signum, "signal handler called, clean exit");
        self.notify.notify_waiters();
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Signal number of the first request, if any.
    pub fn signal(&self) -> Option<i32> {
        self.is_requested().then(|| self.signal.load(Ordering::SeqCst))
    }

    /// Resolves once termination has been requested.
    pub async fn requested(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_requested() {
                return;
            }
            notified.await;
        }
    }
}
