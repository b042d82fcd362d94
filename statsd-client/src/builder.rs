use std::{sync::Arc, time::Duration};

use thiserror::Error;

use crate::{
    client::StatsdClient,
    scheduler::{Spawner, DEFAULT_FLUSH_DELAY},
    state::{State, StateConfiguration},
    transport::{Destination, Transport, UdpTransport},
};

/// Errors that could occur while building a StatsD client.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Failed to parse the remote address.
    #[error("invalid remote address: {reason}")]
    InvalidRemoteAddress {
        /// Details about the parsing failure.
        reason: String,
    },

    /// The flush delay was zero.
    #[error("flush delay must be greater than zero")]
    InvalidFlushDelay,
}

fn parse_remote_address(addr: &str) -> Result<Destination, String> {
    let (host, port) =
        addr.rsplit_once(':').ok_or_else(|| format!("'{addr}' is not in the form <host>:<port>"))?;

    let host = host.strip_prefix('[').and_then(|h| h.strip_suffix(']')).unwrap_or(host);
    if host.is_empty() {
        return Err(format!("'{addr}' is missing a host"));
    }

    let port = port.parse::<u16>().map_err(|e| format!("invalid port '{port}': {e}"))?;
    Ok(Destination::new(host, port))
}

/// Builder for a StatsD client.
pub struct StatsdBuilder {
    destination: Destination,
    namespace: Option<String>,
    flush_delay: Duration,
    sampler_seed: Option<u64>,
    transport: Arc<dyn Transport>,
}

impl StatsdBuilder {
    /// Set the host of the remote server.
    ///
    /// Defaults to `127.0.0.1`.
    #[must_use]
    pub fn with_host<H: Into<String>>(mut self, host: H) -> Self {
        self.destination.set_host(host.into());
        self
    }

    /// Set the port of the remote server.
    ///
    /// Defaults to 8125.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.destination.set_port(port);
        self
    }

    /// Set the remote address to send stats to, in the format of `<host>:<port>`.
    ///
    /// IPv6 addresses must be wrapped in brackets, such as `[::1]:8125`. Host names are resolved on every send, not
    /// here.
    ///
    /// # Errors
    ///
    /// If the given address is not able to be parsed as a valid address, an error will be returned indicating the
    /// reason.
    pub fn with_remote_address<A>(mut self, addr: A) -> Result<Self, BuildError>
    where
        A: AsRef<str>,
    {
        self.destination = parse_remote_address(addr.as_ref())
            .map_err(|reason| BuildError::InvalidRemoteAddress { reason })?;
        Ok(self)
    }

    /// Set the destination to send stats to.
    #[must_use]
    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    /// Set the namespace prepended to every stat name.
    ///
    /// Stat names are reported as `<namespace>.<name>`. Defaults to no namespace.
    #[must_use]
    pub fn with_namespace<N: Into<String>>(mut self, namespace: N) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Set the flush delay.
    ///
    /// Queued lines are sent together once this much time has passed since the first of them was queued. Lines queued
    /// while a flush is pending do not push it back.
    ///
    /// Defaults to 500 milliseconds.
    #[must_use]
    pub fn with_flush_delay(mut self, flush_delay: Duration) -> Self {
        self.flush_delay = flush_delay;
        self
    }

    /// Seed the sampler, making sampling decisions reproducible.
    ///
    /// Defaults to seeding from the operating system.
    #[must_use]
    pub fn with_sampler_seed(mut self, seed: u64) -> Self {
        self.sampler_seed = Some(seed);
        self
    }

    /// Set the transport used to send payloads.
    ///
    /// Defaults to [`UdpTransport`].
    #[must_use]
    pub fn with_transport<T>(mut self, transport: T) -> Self
    where
        T: Transport + 'static,
    {
        self.transport = Arc::new(transport);
        self
    }

    /// Builds the client.
    ///
    /// # Errors
    ///
    /// If the flush delay is zero, an error will be returned.
    pub fn build(self) -> Result<StatsdClient, BuildError> {
        if self.flush_delay.is_zero() {
            return Err(BuildError::InvalidFlushDelay);
        }

        Ok(self.build_unchecked())
    }

    pub(crate) fn build_unchecked(self) -> StatsdClient {
        let config = StateConfiguration {
            destination: self.destination,
            namespace: self.namespace,
            flush_delay: self.flush_delay,
            sampler_seed: self.sampler_seed,
            transport: self.transport,
            spawner: Spawner::default(),
        };

        StatsdClient::from_state(State::new(config))
    }
}

impl Default for StatsdBuilder {
    fn default() -> Self {
        StatsdBuilder {
            destination: Destination::default(),
            namespace: None,
            flush_delay: DEFAULT_FLUSH_DELAY,
            sampler_seed: None,
            transport: Arc::new(UdpTransport),
        }
    }
}
