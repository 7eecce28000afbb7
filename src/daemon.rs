//! Daily scheduler.
//!
//! Fires the pipeline once per day at a wall-clock time in a configured
//! timezone, until SIGINT/SIGTERM.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use tokio::sync::watch;

use crate::app::{RelayError, Result};
use crate::config::ScheduleConfig;
use crate::pipeline::Pipeline;

/// Longest DST gap we step across when the send time does not exist.
const MAX_GAP_MINUTES: i64 = 180;

pub struct Daemon {
    pipeline: Arc<Pipeline>,
    send_time: NaiveTime,
    timezone: Tz,
    run_on_start: bool,
}

impl Daemon {
    pub fn new(pipeline: Arc<Pipeline>, send_time: NaiveTime, timezone: Tz) -> Self {
        Self {
            pipeline,
            send_time,
            timezone,
            run_on_start: false,
        }
    }

    pub fn from_config(pipeline: Arc<Pipeline>, schedule: &ScheduleConfig) -> Result<Self> {
        let mut daemon = Self::new(pipeline, schedule.send_time()?, schedule.timezone()?);
        daemon.run_on_start = schedule.run_on_start;
        Ok(daemon)
    }

    pub fn with_run_on_start(mut self, run_on_start: bool) -> Self {
        self.run_on_start = run_on_start;
        self
    }

    /// Run until `shutdown` resolves.
    pub async fn run<F: Future<Output = ()>>(&self, shutdown: F) -> Result<()> {
        tokio::pin!(shutdown);
        tracing::info!(
            send_time = %self.send_time.format("%H:%M"),
            timezone = %self.timezone,
            "scheduler started"
        );

        if self.run_on_start {
            self.tick().await;
        }

        loop {
            let now = Utc::now();
            let next = next_run_after(now, self.send_time, self.timezone);
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            tracing::info!(
                next_run = %next.with_timezone(&self.timezone).format("%Y-%m-%d %H:%M %Z"),
                "waiting for next run"
            );

            tokio::select! {
                _ = tokio::time::sleep(wait) => self.tick().await,
                _ = &mut shutdown => break,
            }
        }

        tracing::info!("scheduler shutting down");
        Ok(())
    }

    async fn tick(&self) {
        match self.pipeline.run_once().await {
            Ok(summary) => tracing::info!(
                selected = summary.selected(),
                delivered = summary.dispatch.delivered,
                "scheduled run complete"
            ),
            Err(RelayError::RunInProgress) => {
                tracing::info!("skipping scheduled run, another run is active")
            }
            Err(e) => tracing::error!(error = %e, "scheduled run failed"),
        }
    }
}

/// First instant strictly after `now` whose local time in `tz` is `at`.
///
/// Ambiguous local times (DST fall-back) resolve to the earlier instant;
/// nonexistent ones (spring-forward gap) move to the first valid minute.
pub fn next_run_after(now: DateTime<Utc>, at: NaiveTime, tz: Tz) -> DateTime<Utc> {
    let today = now.with_timezone(&tz).date_naive();

    today
        .iter_days()
        .take(3)
        .filter_map(|date| resolve_local(tz, date.and_time(at)))
        .find(|candidate| *candidate > now)
        .unwrap_or_else(|| now + chrono::Duration::days(1))
}

fn resolve_local(tz: Tz, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    (0..=MAX_GAP_MINUTES).find_map(|offset| {
        tz.from_local_datetime(&(local + chrono::Duration::minutes(offset)))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    })
}

/// Resolves on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => {},
                    _ = tokio::signal::ctrl_c() => {},
                }
                return;
            }
            Err(e) => tracing::warn!(error = %e, "cannot install SIGTERM handler"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

/// Completes once `rx` observes `true` or its sender is gone.
pub async fn wait_for(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            break;
        }
    }
}
