//! Daily scheduler on top of the tokio timer.
//!
//! Waits are re-evaluated against the wall clock at least once a minute, so a
//! clock change (e.g. from the `date` command) moves the next firing with it.

use chrono::{DateTime, Days, Local, NaiveTime, TimeZone};
use relay_control::{DailyJob, DailyScheduler, ScheduledJob};
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

const MAX_WAIT: Duration = Duration::from_secs(60);

/// Next `hour:00:00` strictly after `now`, in the time zone of `now`
pub fn next_occurrence<Tz: TimeZone>(now: &DateTime<Tz>, hour: u8) -> Option<DateTime<Tz>> {
    let time = NaiveTime::from_hms_opt(u32::from(hour), 0, 0)?;
    let today = now.date_naive();

    (0..=2u64).find_map(|days| {
        let date = today.checked_add_days(Days::new(days))?;
        now.timezone()
            .from_local_datetime(&date.and_time(time))
            .earliest()
            .filter(|candidate| candidate > now)
    })
}

/// Scheduler spawning one timer task per job
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

struct SpawnedJob {
    hour: u8,
    handle: AbortHandle,
}

impl ScheduledJob for SpawnedJob {
    fn cancel(&self) {
        debug!(component = "scheduler", "Cancelling daily job at {:02}:00", self.hour);
        self.handle.abort();
    }
}

impl DailyScheduler for TokioScheduler {
    fn schedule_daily(&self, hour: u8, job: DailyJob) -> Box<dyn ScheduledJob> {
        let task = tokio::spawn(async move {
            loop {
                let Some(next) = next_occurrence(&Local::now(), hour) else {
                    warn!(component = "scheduler", "No valid time for {:02}:00, retrying", hour);
                    tokio::time::sleep(MAX_WAIT).await;
                    continue;
                };
                debug!(component = "scheduler", "Next {:02}:00 run at {}", hour, next);

                loop {
                    let remaining = (next - Local::now()).to_std().unwrap_or(Duration::ZERO);
                    if remaining.is_zero() {
                        break;
                    }
                    tokio::time::sleep(remaining.min(MAX_WAIT)).await;
                }

                job();
            }
        });

        Box::new(SpawnedJob {
            hour,
            handle: task.abort_handle(),
        })
    }
}
