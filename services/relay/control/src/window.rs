//! Measurement period and recording window shared by the control layer.

use std::sync::{Arc, Mutex, MutexGuard};

/// Measurement period and daily recording window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulingWindow {
    /// Measurement period in seconds
    pub period_secs: u32,
    /// Hour recording starts, 0-23
    pub wake_hour: u8,
    /// Hour recording stops, 0-23
    pub sleep_hour: u8,
}

impl SchedulingWindow {
    /// Whether recording should run at the given hour (`wake <= hour < sleep`)
    pub fn is_active(&self, hour: u32) -> bool {
        hour >= u32::from(self.wake_hour) && hour < u32::from(self.sleep_hour)
    }
}

impl Default for SchedulingWindow {
    fn default() -> Self {
        Self {
            period_secs: 10,
            wake_hour: 7,
            sleep_hour: 16,
        }
    }
}

/// Window shared between the interpreter and the daily triggers
#[derive(Debug, Clone, Default)]
pub struct SharedWindow {
    inner: Arc<Mutex<SchedulingWindow>>,
}

impl SharedWindow {
    /// Wrap an initial window
    pub fn new(window: SchedulingWindow) -> Self {
        Self {
            inner: Arc::new(Mutex::new(window)),
        }
    }

    /// Copy of the current window
    pub fn get(&self) -> SchedulingWindow {
        *self.lock()
    }

    /// Mutate the window under a single lock
    pub fn update<F: FnOnce(&mut SchedulingWindow)>(&self, f: F) -> SchedulingWindow {
        let mut guard = self.lock();
        f(&mut guard);
        *guard
    }

    fn lock(&self) -> MutexGuard<'_, SchedulingWindow> {
        // A panic while holding the lock cannot leave a Copy struct half-written
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
