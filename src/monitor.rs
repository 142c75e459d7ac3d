use core::error::Error;
use core::time::Duration;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::control::{decode_lenient, is_deactivated};

/// One-way stop flag shared between the monitor and the polling loop. Once
/// triggered it stays triggered.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<StopInner>,
}

#[derive(Debug, Default)]
struct StopInner {
    stopped: AtomicBool,
    notify: Notify,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if this call flipped the flag.
    pub fn trigger(&self) -> bool {
        let first = !self.inner.stopped.swap(true, Ordering::SeqCst);
        if first {
            self.inner.notify.notify_waiters();
        }
        first
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Resolves once the signal has been triggered.
    pub async fn stopped(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }
}

#[derive(Debug, Clone)]
pub struct ActiveFlagMonitor {
    path: PathBuf,
    interval: Duration,
}

impl ActiveFlagMonitor {
    pub fn new(path: &Path, interval: Duration) -> Self {
        Self {
            path: path.to_path_buf(),
            interval,
        }
    }

    /// One read of the control file: true when it says `Active: false`.
    pub async fn scan(&self) -> Result<bool, Box<dyn Error + Send + Sync>> {
        let bytes = tokio::fs::read(&self.path).await?;
        let text = decode_lenient(&bytes)?;
        Ok(is_deactivated(&text))
    }

    pub fn spawn(self, stop: StopSignal) -> MonitorHandle {
        let task = tokio::spawn(self.run(stop.clone()));
        MonitorHandle { stop, task }
    }

    async fn run(self, stop: StopSignal) {
        info!("Monitoring {} for Active: false...", self.path.display());
        while !stop.is_stopped() {
            match self.scan().await {
                Ok(true) => {
                    info!("Detected Active: false in control file. Stopping...");
                    stop.trigger();
                    return;
                }
                Ok(false) => debug!("control file still active"),
                Err(e) => warn!(error = %e, "Error reading control file"),
            }
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = stop.stopped() => {}
            }
        }
        debug!("monitor exiting, stop already raised");
    }
}

/// Join handle for the monitor task plus the signal it watches.
#[derive(Debug)]
pub struct MonitorHandle {
    stop: StopSignal,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Raise the stop signal (if not already) and wait for the task to end.
    pub async fn shutdown(self) {
        self.stop.trigger();
        if let Err(e) = self.task.await {
            warn!(error = %e, "monitor task ended abnormally");
        }
    }
}
