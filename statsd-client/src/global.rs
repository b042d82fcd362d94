//! A process-wide default client.
//!
//! The default client is either installed explicitly with [`install`], or built lazily on first use from the
//! configuration files in [`ConfigLocations::default`], falling back to `127.0.0.1:8125`.
//!
//! Configuration setters on the returned client (host, port, namespace) affect every caller in the process. Code that
//! needs its own configuration should build and pass around its own [`StatsdClient`] instead.

use std::{error::Error, fmt};

use once_cell::sync::OnceCell;
use tracing::{debug, warn};

use crate::{
    client::StatsdClient,
    config::{self, ConfigLocations},
    transport::Destination,
    StatsdBuilder,
};

static GLOBAL_CLIENT: OnceCell<StatsdClient> = OnceCell::new();

const SET_CLIENT_ERROR: &str = "attempted to install a global client after one was already in use";

/// The type returned by [`install`] if the global client was already installed or used.
pub struct SetClientError(pub StatsdClient);

impl SetClientError {
    /// Returns the client that was attempted to be installed.
    pub fn into_inner(self) -> StatsdClient {
        self.0
    }
}

impl fmt::Debug for SetClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetClientError").finish_non_exhaustive()
    }
}

impl fmt::Display for SetClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(SET_CLIENT_ERROR)
    }
}

impl Error for SetClientError {}

/// Installs `client` as the global client.
///
/// # Errors
///
/// If a global client was already installed, or the default one was already built by a call to [`client`], the given
/// client is handed back in the error.
pub fn install(client: StatsdClient) -> Result<(), SetClientError> {
    GLOBAL_CLIENT.set(client).map_err(SetClientError)
}

/// Returns the global client, building the default one if none was installed.
pub fn client() -> &'static StatsdClient {
    GLOBAL_CLIENT.get_or_init(default_client)
}

fn default_client() -> StatsdClient {
    let destination = match config::discover(&ConfigLocations::default()) {
        Ok(Some(destination)) => {
            debug!(%destination, "Using configured StatsD destination.");
            destination
        }
        Ok(None) => Destination::default(),
        Err(e) => {
            warn!(error = %e, "Failed to read StatsD configuration, using defaults.");
            Destination::default()
        }
    };

    StatsdBuilder::default().with_destination(destination).build_unchecked()
}

/// Increments a counter by one on the global client.
pub fn increment(stat: &str) {
    client().increment(stat);
}

/// Decrements a counter by one on the global client.
pub fn decrement(stat: &str) {
    client().decrement(stat);
}

/// Adds `delta` to a counter on the global client.
pub fn count(stat: &str, delta: i64) {
    client().count(stat, delta);
}

/// Reports the current value of a gauge on the global client.
pub fn gauge<V: Into<crate::MetricValue>>(stat: &str, value: V) {
    client().gauge(stat, value);
}

/// Reports a timing, in milliseconds, on the global client.
pub fn timing(stat: &str, ms: u64) {
    client().timing(stat, ms);
}

/// Runs `f` and reports how long it took on the global client.
pub fn time<F, R>(stat: &str, f: F) -> R
where
    F: FnOnce() -> R,
{
    client().time(stat, f)
}

/// Increments a counter by one on the global client, sampled at `sample_rate`.
pub fn increment_sampled(stat: &str, sample_rate: f64) {
    client().increment_sampled(stat, sample_rate);
}

/// Decrements a counter by one on the global client, sampled at `sample_rate`.
pub fn decrement_sampled(stat: &str, sample_rate: f64) {
    client().decrement_sampled(stat, sample_rate);
}

/// Adds `delta` to a counter on the global client, sampled at `sample_rate`.
pub fn count_sampled(stat: &str, delta: i64, sample_rate: f64) {
    client().count_sampled(stat, delta, sample_rate);
}

/// Reports the current value of a gauge on the global client, sampled at `sample_rate`.
pub fn gauge_sampled<V: Into<crate::MetricValue>>(stat: &str, value: V, sample_rate: f64) {
    client().gauge_sampled(stat, value, sample_rate);
}

/// Reports a timing, in milliseconds, on the global client, sampled at `sample_rate`.
pub fn timing_sampled(stat: &str, ms: u64, sample_rate: f64) {
    client().timing_sampled(stat, ms, sample_rate);
}

/// Runs `f` and reports how long it took on the global client, sampled at `sample_rate`.
///
/// `f` always runs; only the report is sampled.
pub fn time_sampled<F, R>(stat: &str, sample_rate: f64, f: F) -> R
where
    F: FnOnce() -> R,
{
    client().time_sampled(stat, sample_rate, f)
}

/// Sends everything queued on the global client immediately.
pub fn flush() {
    client().flush();
}
