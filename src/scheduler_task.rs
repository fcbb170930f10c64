//! Background task that runs the daily digest on its cron schedule
//!
//! The cron expression is re-read from the [`ConfigHandle`] before every wait,
//! so a hot-reloaded schedule applies from the next cycle. Long waits are cut
//! into slices of at most [`RECHECK_INTERVAL`] so a changed schedule is noticed
//! even while the task is sleeping.
//!
//! # Example
//!
//! ```no_run
//! use hn_digest::digest::DigestService;
//! use hn_digest::scheduler_task::SchedulerTask;
//! use tokio_util::sync::CancellationToken;
//!
//! # fn example(service: DigestService) {
//! let shutdown = CancellationToken::new();
//! let task = SchedulerTask::new(service, shutdown.clone());
//! tokio::spawn(task.run());
//! # }
//! ```

use crate::digest::DigestService;
use crate::error::Error;
use crate::schedule::CronSchedule;
use crate::types::Event;
use chrono::{DateTime, Local, TimeZone};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Longest single sleep before the schedule is checked again
pub const RECHECK_INTERVAL: Duration = Duration::from_secs(60);

/// What the task does next
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step {
    /// Sleep, then plan again
    Wait(Duration),
    /// Run the digest now
    Run,
}

/// Plan the next step given the last planned run time
///
/// `due` is the run the task is waiting for; it is recomputed whenever the
/// schedule changes. Returns the step plus the (possibly new) due time.
pub fn plan<Tz: TimeZone>(
    schedule: &CronSchedule,
    due: Option<DateTime<Tz>>,
    now: &DateTime<Tz>,
) -> (Step, Option<DateTime<Tz>>) {
    let due = due.or_else(|| schedule.next_after(now));
    let Some(next) = due else {
        return (Step::Wait(RECHECK_INTERVAL), None);
    };

    if next <= *now {
        return (Step::Run, None);
    }

    let remaining = (next.clone() - now.clone())
        .to_std()
        .unwrap_or(Duration::ZERO);
    (Step::Wait(remaining.min(RECHECK_INTERVAL)), Some(next))
}

/// Runs [`DigestService::run_daily`] on the configured schedule
pub struct SchedulerTask {
    service: DigestService,
    shutdown: CancellationToken,
}

impl SchedulerTask {
    /// Create a scheduler task
    pub fn new(service: DigestService, shutdown: CancellationToken) -> Self {
        Self { service, shutdown }
    }

    /// Run until shutdown
    pub async fn run(self) {
        info!("Scheduler task started");

        let mut current: Option<CronSchedule> = None;
        let mut due: Option<DateTime<Local>> = None;

        loop {
            let expression = self.service.config().current().await.scheduler.cron.clone();
            if current.as_ref().map(CronSchedule::expression) != Some(expression.trim()) {
                match CronSchedule::parse(&expression) {
                    Ok(schedule) => {
                        info!(cron = %schedule, "Digest schedule set");
                        current = Some(schedule);
                        due = None;
                    }
                    Err(e) => warn!(error = %e, "Ignoring invalid schedule"),
                }
            }

            let Some(schedule) = &current else {
                if !self.sleep(RECHECK_INTERVAL).await {
                    break;
                }
                continue;
            };

            let (step, next_due) = plan(schedule, due, &Local::now());
            due = next_due;

            match step {
                Step::Wait(wait) => {
                    debug!(next = ?due, wait_secs = wait.as_secs(), "Waiting for next digest run");
                    if !self.sleep(wait).await {
                        break;
                    }
                }
                Step::Run => {
                    info!("Scheduled digest run starting");
                    match self.service.run_daily(None).await {
                        Ok(digest) => info!(date = %digest.date, "Scheduled digest run finished"),
                        Err(Error::ShuttingDown) => break,
                        Err(e) => {
                            error!(error = %e, "Scheduled digest run failed");
                            self.service.emit_event(Event::JobFailed {
                                error: e.to_string(),
                            });
                        }
                    }
                }
            }
        }

        info!("Scheduler task stopped");
    }

    /// Sleep unless shut down first; returns false on shutdown
    async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.shutdown.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}
