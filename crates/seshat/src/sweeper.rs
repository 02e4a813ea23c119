//! Periodic deletion of session rows past their expiry.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use seshat_backend::{SessionBackend, SqlValue};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Background task that deletes expired session rows on a fixed cadence.
///
/// Starting while already running cancels the existing task first, so there
/// is never more than one timer. Each run begins with an immediate sweep,
/// then repeats at the configured interval. A failed sweep is logged and
/// the cadence continues.
pub struct Sweeper {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Sweeper {
    /// Create a stopped sweeper.
    pub fn new() -> Self {
        Self {
            handle: Mutex::new(None),
        }
    }

    /// Start (or restart) sweeping.
    ///
    /// `sql` must be a DELETE statement with the current time in Unix
    /// seconds as its single parameter. Must be called within a Tokio
    /// runtime.
    pub fn start(&self, backend: Arc<dyn SessionBackend>, sql: String, interval: Duration) {
        let mut guard = self.handle.lock().unwrap();
        if let Some(handle) = guard.take() {
            handle.abort();
            debug!("Expiration sweeper restarting");
        }

        debug!(interval_ms = interval.as_millis() as u64, "Expiration sweeper started");
        *guard = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                // The first tick completes immediately, giving the initial sweep.
                ticker.tick().await;
                sweep(&*backend, &sql);
            }
        }));
    }

    /// Cancel the sweeping task. No-op if not running.
    pub fn stop(&self) {
        if let Some(handle) = self.handle.lock().unwrap().take() {
            handle.abort();
            debug!("Expiration sweeper stopped");
        }
    }

    /// Whether a sweeping task is currently scheduled.
    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

impl Default for Sweeper {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.lock().unwrap().take() {
            handle.abort();
        }
    }
}

/// Run one sweep. Failures are swallowed after logging so a transient
/// backend outage does not kill the cadence.
fn sweep(backend: &dyn SessionBackend, sql: &str) {
    let now = Utc::now().timestamp();
    match backend.query(sql, &[SqlValue::Integer(now)]) {
        Ok(_) => trace!(now, "Swept expired sessions"),
        Err(e) => warn!(error = %e, "Expired-session sweep failed"),
    }
}
