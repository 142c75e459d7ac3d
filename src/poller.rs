use chrono::Utc;
use core::error::Error;
use core::time::Duration;
use tracing::{debug, info, warn};

use crate::chart::{ChartDriver, DomOutcome};
use crate::ext::webdriver::delay;
use crate::model::{MonitoredTimeframes, TimeframeRole, VolumeReading};
use crate::monitor::StopSignal;
use crate::recorder::{RoleReadings, TIMESTAMP_FORMAT, VolumeRecorder, build_row};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollState {
    Running,
    Stopping,
    Stopped,
}

/// Remembers the last written reading of the lowest timeframe.
#[derive(Debug, Clone, Default)]
pub struct ChangeTracker {
    last: Option<VolumeReading>,
}

impl ChangeTracker {
    /// True when `current` is present and differs from the last accepted
    /// reading; the tracker then adopts it. An absent reading never counts as
    /// a change.
    pub fn observe(&mut self, current: Option<&VolumeReading>) -> bool {
        match current {
            Some(reading) if self.last.as_ref() != Some(reading) => {
                self.last = Some(reading.clone());
                true
            }
            _ => false,
        }
    }

    pub fn last(&self) -> Option<&VolumeReading> {
        self.last.as_ref()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PollTimings {
    /// Wait after a timeframe switch before reading the legend.
    pub settle: Duration,
    /// Idle time between sweeps.
    pub interval: Duration,
}

impl Default for PollTimings {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(3),
            interval: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub sweeps: usize,
    pub rows_written: usize,
}

pub struct Poller<'a, D: ChartDriver> {
    driver: &'a D,
    timeframes: &'a MonitoredTimeframes,
    recorder: VolumeRecorder,
    stop: StopSignal,
    timings: PollTimings,
    tracker: ChangeTracker,
    state: PollState,
}

impl<'a, D: ChartDriver> Poller<'a, D> {
    pub fn new(
        driver: &'a D,
        timeframes: &'a MonitoredTimeframes,
        recorder: VolumeRecorder,
        stop: StopSignal,
        timings: PollTimings,
    ) -> Self {
        Self {
            driver,
            timeframes,
            recorder,
            stop,
            timings,
            tracker: ChangeTracker::default(),
            state: PollState::Running,
        }
    }

    /// Switch to and read every monitored timeframe once. A failure on one
    /// timeframe only leaves its slot empty.
    pub async fn sweep(&self) -> RoleReadings {
        let mut readings = RoleReadings::default();
        for (role, tf) in self.timeframes.iter() {
            let switched = self.driver.switch_timeframe(tf).await;
            if !switched.is_ok() {
                debug!(%role, %tf, "proceeding after incomplete switch: {switched}");
            }
            delay(self.timings.settle).await;
            match self.driver.read_indicator().await {
                DomOutcome::Ok(reading) => readings.set(role, reading),
                other => warn!(%role, %tf, "No data for {}: {other}", tf.label()),
            }
        }
        readings
    }

    /// Append a row when the lowest timeframe's reading changed. Returns
    /// whether a row was written.
    pub fn record(&mut self, readings: &RoleReadings) -> Result<bool, Box<dyn Error + Send + Sync>> {
        let Some((lowest_role, lowest_tf)) = self.timeframes.lowest() else {
            return Ok(false);
        };
        if !self.tracker.observe(readings.get(lowest_role)) {
            info!("No change in {} data, waiting...", lowest_tf.label());
            return Ok(false);
        }
        let now = Utc::now();
        self.recorder.append(&build_row(now, readings))?;
        info!(
            captured = readings.captured(),
            "CSV appended with new grouped data at {}",
            now.format(TIMESTAMP_FORMAT)
        );
        Ok(true)
    }

    /// Sweep until the stop signal is seen. The signal is checked between
    /// sweeps only; the idle wait ends early when it fires. Errors without
    /// sweeping when no timeframe is monitored.
    pub async fn run(mut self) -> Result<PollSummary, Box<dyn Error + Send + Sync>> {
        if self.timeframes.is_empty() {
            return Err("no recognised LowerTF/BaseTF/HigherTF to monitor".into());
        }
        let mut summary = PollSummary::default();
        while self.state == PollState::Running {
            let readings = self.sweep().await;
            summary.sweeps += 1;
            if self.record(&readings)? {
                summary.rows_written += 1;
            }

            if self.stop.is_stopped() {
                self.state = PollState::Stopping;
                continue;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.timings.interval) => {}
                _ = self.stop.stopped() => {}
            }
            if self.stop.is_stopped() {
                self.state = PollState::Stopping;
            }
        }
        info!(
            sweeps = summary.sweeps,
            rows = summary.rows_written,
            "Stop requested, polling finished"
        );
        self.state = PollState::Stopped;
        Ok(summary)
    }
}

/// Which role drives row writes, for logging at startup.
pub fn describe_lowest(timeframes: &MonitoredTimeframes) -> Option<(TimeframeRole, &'static str)> {
    timeframes.lowest().map(|(role, tf)| (role, tf.label()))
}
