use std::time::{Duration, Instant};

use crate::client::StatsdClient;

/// Rounds a duration to the nearest whole millisecond.
pub(crate) fn round_millis(duration: Duration) -> u64 {
    let millis = (duration.as_nanos() + 500_000) / 1_000_000;
    u64::try_from(millis).unwrap_or(u64::MAX)
}

/// A running timer for a single stat.
///
/// Created by [`StatsdClient::start_timer`]. Calling [`stop`][Timer::stop] reports the elapsed time, in whole
/// milliseconds, as a timing. Only the first call to `stop` reports anything.
#[must_use = "a timer reports nothing until it is stopped"]
pub struct Timer {
    stat: String,
    sample_rate: f64,
    start: Instant,
    client: Option<StatsdClient>,
}

impl Timer {
    pub(crate) fn start(client: StatsdClient, stat: &str, sample_rate: f64) -> Self {
        Timer { stat: stat.to_string(), sample_rate, start: Instant::now(), client: Some(client) }
    }

    /// Name of the stat this timer reports to.
    pub fn stat(&self) -> &str {
        &self.stat
    }

    /// Time elapsed since the timer was started.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Returns `true` if the timer has already been stopped.
    pub fn is_stopped(&self) -> bool {
        self.client.is_none()
    }

    /// Stops the timer and reports the elapsed time.
    ///
    /// Subsequent calls do nothing.
    pub fn stop(&mut self) {
        if let Some(client) = self.client.take() {
            let elapsed_ms = round_millis(self.start.elapsed());
            client.timing_sampled(&self.stat, elapsed_ms, self.sample_rate);
        }
    }
}
