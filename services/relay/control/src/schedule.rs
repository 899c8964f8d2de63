//! Daily wake / sleep triggers.
//!
//! Two jobs live at any time: one at `wake_hour:00` that resumes recording
//! with the current period, one at `sleep_hour:00` that pauses it. Changing
//! an hour cancels the old job before the replacement is scheduled.

use crate::subsystems::{DailyJob, DailyScheduler, ScheduledJob, Sensor};
use crate::window::SharedWindow;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Owner of the wake and sleep jobs
pub struct DailyTriggers {
    scheduler: Arc<dyn DailyScheduler>,
    sensor: Arc<dyn Sensor>,
    window: SharedWindow,
    wake_job: Mutex<Option<Box<dyn ScheduledJob>>>,
    sleep_job: Mutex<Option<Box<dyn ScheduledJob>>>,
}

impl DailyTriggers {
    /// Create the triggers without scheduling anything
    pub fn new(
        scheduler: Arc<dyn DailyScheduler>,
        sensor: Arc<dyn Sensor>,
        window: SharedWindow,
    ) -> Self {
        Self {
            scheduler,
            sensor,
            window,
            wake_job: Mutex::new(None),
            sleep_job: Mutex::new(None),
        }
    }

    /// Schedule both jobs from the current window
    pub fn start(&self) {
        self.reschedule_wake();
        self.reschedule_sleep();
    }

    /// Replace the wake job with one at the current wake hour
    pub fn reschedule_wake(&self) {
        let hour = self.window.get().wake_hour;
        let sensor = self.sensor.clone();
        let window = self.window.clone();
        let job: DailyJob = Arc::new(move || {
            info!("Restarting measurements.");
            sensor.record(window.get().period_secs);
        });

        Self::replace(&self.wake_job, self.scheduler.schedule_daily(hour, job));
        info!("Wake trigger set for {:02}:00", hour);
    }

    /// Replace the sleep job with one at the current sleep hour
    pub fn reschedule_sleep(&self) {
        let hour = self.window.get().sleep_hour;
        let sensor = self.sensor.clone();
        let job: DailyJob = Arc::new(move || {
            info!("Pausing measurements.");
            sensor.pause();
        });

        Self::replace(&self.sleep_job, self.scheduler.schedule_daily(hour, job));
        info!("Sleep trigger set for {:02}:00", hour);
    }

    fn replace(slot: &Mutex<Option<Box<dyn ScheduledJob>>>, job: Box<dyn ScheduledJob>) {
        let mut slot = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(old) = slot.replace(job) {
            old.cancel();
        }
    }
}

impl Drop for DailyTriggers {
    fn drop(&mut self) {
        for slot in [&self.wake_job, &self.sleep_job] {
            let mut slot = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(job) = slot.take() {
                job.cancel();
            }
        }
    }
}
