//! Periodic signal quality poller.

use crate::reporter::{ReplyEncoding, Replier};
use crate::signal::{classify, SignalQuality};
use crate::subsystems::Connectivity;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Polls the modem network type and reports signal label changes as `net<label>`
pub struct StatePoller {
    connectivity: Arc<dyn Connectivity>,
    replier: Arc<dyn Replier>,
    interval: Duration,
    last: SignalQuality,
}

impl StatePoller {
    /// Create a poller. The link is assumed to start with no data service.
    pub fn new(
        connectivity: Arc<dyn Connectivity>,
        replier: Arc<dyn Replier>,
        interval: Duration,
    ) -> Self {
        Self {
            connectivity,
            replier,
            interval,
            last: SignalQuality::NoData,
        }
    }

    /// Poll every interval, forever
    pub async fn run(mut self) {
        info!("Signal poller started, interval {:?}", self.interval);
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            self.poll().await;
        }
    }

    /// One poll: refresh the network type and report if the label changed.
    ///
    /// The value read is the one cached by the modem, so a refresh shows up
    /// on the following poll.
    pub async fn poll(&mut self) -> Option<SignalQuality> {
        if !self.connectivity.is_linked() {
            debug!("Link down, skipping signal poll");
            return None;
        }

        self.connectivity.ask_network_type();
        let quality = classify(self.connectivity.network_type());
        if self.last == quality {
            return None;
        }

        info!("Signal changed from {} to {}", self.last, quality);
        self.last = quality;
        self.replier
            .reply(&format!("net{}", quality), ReplyEncoding::Clear)
            .await;
        Some(quality)
    }
}
