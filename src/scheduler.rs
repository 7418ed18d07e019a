//! The capture loop: one job per site per tick inside the time window.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use log::{debug, error, info};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};

use crate::capture;
use crate::config::Settings;
use crate::shutdown::Shutdown;
use crate::site::Site;
use crate::window::{self, TimeWindow};

/// Outcome counts of a whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: usize,
    pub saved: usize,
    pub failed: usize,
}

/// First tick strictly after `now` on the grid `start + n * interval`.
///
/// `None` once the next tick lies beyond the representable time range.
pub fn next_tick(
    start: DateTime<Utc>,
    interval: Duration,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if now < start {
        return Some(start);
    }
    let step_ms = chrono::Duration::from_std(interval)
        .ok()?
        .num_milliseconds()
        .max(1);
    let elapsed_ms = (now - start).num_milliseconds();
    let offset_ms = (elapsed_ms / step_ms + 1).checked_mul(step_ms)?;
    start.checked_add_signed(chrono::Duration::try_milliseconds(offset_ms)?)
}

/// Runs capture jobs for `sites` on every tick, either awaited one by one (`join`) or detached.
pub struct Scheduler<J> {
    sites: Vec<Site>,
    interval: Duration,
    join: bool,
    job: J,
    shutdown: Shutdown,
    running: JoinSet<(Site, Result<PathBuf>)>,
    summary: RunSummary,
}

impl<J, Fut> Scheduler<J>
where
    J: Fn(Site, DateTime<Utc>) -> Fut,
    Fut: Future<Output = Result<PathBuf>> + Send + 'static,
{
    pub fn new(sites: Vec<Site>, interval: Duration, join: bool, job: J, shutdown: Shutdown) -> Self {
        Self {
            sites,
            interval,
            join,
            job,
            shutdown,
            running: JoinSet::new(),
            summary: RunSummary::default(),
        }
    }

    pub async fn run(mut self, window: TimeWindow) -> RunSummary {
        match window {
            TimeWindow::Immediate => {
                info!("Taking screenshot(s) NOW...");
                self.tick().await;
            }
            TimeWindow::Scheduled { start, end } => {
                if self.sleep_until(start, true).await {
                    info!("Starting to take screenshot(s) NOW...");
                    self.repeat(start, end).await;
                }
            }
        }
        self.drain().await;
        self.summary
    }

    async fn repeat(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) {
        while Utc::now() <= end && !self.shutdown.is_requested() {
            self.tick().await;

            let Some(next) = next_tick(start, self.interval, Utc::now()) else {
                break;
            };
            if next > end || !self.sleep_until(next, false).await {
                break;
            }
        }
    }

    /// Sleeps until `target`; `false` if a shutdown was requested meanwhile.
    async fn sleep_until(&self, target: DateTime<Utc>, report: bool) -> bool {
        loop {
            let remaining = (target - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            if remaining.is_zero() {
                return !self.shutdown.is_requested();
            }
            if report {
                info!("Waiting for {} to start...", humanize(remaining));
            }
            // wake up at least once a minute to report progress
            let nap = remaining.min(Duration::from_secs(60));
            tokio::select! {
                _ = tokio::time::sleep(nap) => {}
                _ = self.shutdown.wait() => return false,
            }
        }
    }

    async fn tick(&mut self) {
        self.summary.ticks += 1;
        debug!("Taking screenshot(s) at {}...", Utc::now());
        self.reap_finished();

        for site in self.sites.clone() {
            if self.shutdown.is_requested() {
                break;
            }
            let fut = (self.job)(site, Utc::now());
            if self.join {
                let result = tokio::spawn(fut).await;
                self.record(site, result);
            } else {
                self.running.spawn(async move {
                    let outcome = AssertUnwindSafe(fut).catch_unwind().await;
                    let result = outcome.unwrap_or_else(|panic| {
                        let msg = panic_message(&*panic);
                        Err(anyhow!("{} screenshot job panicked: {}", site, msg))
                    });
                    (site, result)
                });
            }
        }
    }

    fn reap_finished(&mut self) {
        while let Some(result) = self.running.try_join_next() {
            self.record_detached(result);
        }
    }

    /// Awaits all detached jobs that are still running.
    async fn drain(&mut self) {
        if !self.running.is_empty() {
            debug!("waiting for {} running screenshot(s)", self.running.len());
        }
        while let Some(result) = self.running.join_next().await {
            self.record_detached(result);
        }
    }

    fn record_detached(&mut self, result: Result<(Site, Result<PathBuf>), JoinError>) {
        match result {
            Ok((site, outcome)) => self.record(site, Ok(outcome)),
            Err(e) => {
                self.summary.failed += 1;
                error!("screenshot job failed: {}", e);
            }
        }
    }

    fn record(&mut self, site: Site, result: Result<Result<PathBuf>, JoinError>) {
        match result {
            Ok(Ok(path)) => {
                self.summary.saved += 1;
                debug!("{} done: {}", site, path.display());
            }
            Ok(Err(e)) => {
                self.summary.failed += 1;
                error!("{:?}", e);
            }
            Err(e) => {
                self.summary.failed += 1;
                error!("{} screenshot job failed: {}", site, e);
            }
        }
    }
}

/// Text of a caught panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

fn humanize(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60)
}

/// Resolves the time window and runs browser captures for it until done or shut down.
pub async fn run(settings: Settings, shutdown: Shutdown) -> Result<RunSummary> {
    let window = window::resolve(&settings.start, &settings.end, Utc::now())?;

    tokio::fs::create_dir_all(&settings.output_dir)
        .await
        .with_context(|| format!("Failed to create {}", settings.output_dir.display()))?;

    let settings = Arc::new(settings);
    let job_settings = settings.clone();
    let job = move |site, time| capture::capture(site, job_settings.clone(), time);

    let scheduler = Scheduler::new(
        settings.sites.clone(),
        settings.interval,
        settings.join,
        job,
        shutdown,
    );
    Ok(scheduler.run(window).await)
}
