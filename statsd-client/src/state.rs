use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::{
    error::Error,
    sampler::Sampler,
    scheduler::{FlushScheduler, Spawner},
    transport::{Destination, Transport},
    writer::{self, MetricType, MetricValue, PendingBatch},
};

/// Client state configuration.
pub(crate) struct StateConfiguration {
    /// Where payloads are sent.
    pub destination: Destination,

    /// Namespace prepended to every stat name.
    pub namespace: Option<String>,

    /// Delay between the first queued line and the flush that sends it.
    pub flush_delay: Duration,

    /// Fixed sampler seed, if sampling decisions should be reproducible.
    pub sampler_seed: Option<u64>,

    /// Transport used to send payloads.
    pub transport: Arc<dyn Transport>,

    /// Starts the thread that fires delayed flushes.
    pub spawner: Spawner,
}

struct Shared {
    destination: Destination,
    namespace: Option<String>,
    prefix: String,
    batch: PendingBatch,
    scheduler: FlushScheduler,
    sampler: Sampler,
}

/// Client state, shared by every clone of a client and weakly by its flush trigger.
pub(crate) struct State {
    shared: Mutex<Shared>,
    transport: Arc<dyn Transport>,
    flush_delay: Duration,
    spawner: Spawner,
}

fn prefix_for(namespace: Option<&str>) -> String {
    namespace.map(|ns| format!("{ns}.")).unwrap_or_default()
}

impl State {
    /// Creates a new `State` from the given configuration.
    pub fn new(config: StateConfiguration) -> Self {
        let namespace = config.namespace.filter(|ns| !ns.is_empty());
        let sampler = config.sampler_seed.map_or_else(Sampler::from_entropy, Sampler::with_seed);

        State {
            shared: Mutex::new(Shared {
                destination: config.destination,
                prefix: prefix_for(namespace.as_deref()),
                namespace,
                batch: PendingBatch::default(),
                scheduler: FlushScheduler::new(config.spawner.clone()),
                sampler,
            }),
            transport: config.transport,
            flush_delay: config.flush_delay,
            spawner: config.spawner,
        }
    }

    /// Creates a configuration for a new `State` that shares this state's destination and transport.
    pub fn derive_config(&self, namespace: Option<String>) -> StateConfiguration {
        StateConfiguration {
            destination: self.destination(),
            namespace,
            flush_delay: self.flush_delay,
            sampler_seed: None,
            transport: Arc::clone(&self.transport),
            spawner: self.spawner.clone(),
        }
    }

    pub fn destination(&self) -> Destination {
        self.shared.lock().destination.clone()
    }

    pub fn set_host(&self, host: String) {
        self.shared.lock().destination.set_host(host);
    }

    pub fn set_port(&self, port: u16) {
        self.shared.lock().destination.set_port(port);
    }

    pub fn namespace(&self) -> Option<String> {
        self.shared.lock().namespace.clone()
    }

    pub fn set_namespace(&self, namespace: Option<String>) {
        let namespace = namespace.filter(|ns| !ns.is_empty());

        let mut shared = self.shared.lock();
        shared.prefix = prefix_for(namespace.as_deref());
        shared.namespace = namespace;
    }

    /// Returns the number of lines waiting to be sent.
    pub fn pending_len(&self) -> usize {
        self.shared.lock().batch.len()
    }

    /// Returns `true` if a delayed flush is currently armed.
    pub fn is_flush_armed(&self) -> bool {
        self.shared.lock().scheduler.is_armed()
    }

    /// Samples, encodes and queues a single line, arming the flush trigger if it is idle.
    ///
    /// Lines rejected by the sampler are silently skipped, as are NaN and infinite values, which have no line
    /// representation a server would accept. If arming fails, the line stays queued and the next enqueue
    /// tries to arm again.
    pub fn enqueue(
        self: &Arc<Self>,
        stat: &str,
        value: MetricValue,
        metric_type: MetricType,
        sample_rate: f64,
    ) -> Result<(), Error> {
        if !value.is_finite() {
            debug!(stat, ?value, "Dropped non-finite value.");
            return Ok(());
        }

        let mut shared = self.shared.lock();
        if !shared.sampler.admit(sample_rate) {
            return Ok(());
        }

        let line = writer::write_line(&shared.prefix, stat, value, metric_type, sample_rate);
        trace!(%line, "Queued line.");
        shared.batch.push(line);

        if shared.scheduler.is_armed() {
            return Ok(());
        }

        let state = Arc::downgrade(self);
        shared
            .scheduler
            .arm(self.flush_delay, move |generation| flush_on_trigger(&state, generation))
            .map_err(Error::Schedule)?;

        Ok(())
    }

    /// Cancels any armed trigger and sends everything queued as a single payload.
    ///
    /// Nothing is sent if the queue is empty. The queue is always empty afterwards, even if the send failed.
    pub fn flush(&self) -> Result<(), Error> {
        self.flush_if(|_| true)
    }

    fn flush_if<F>(&self, should_flush: F) -> Result<(), Error>
    where
        F: FnOnce(&FlushScheduler) -> bool,
    {
        let (payload, destination) = {
            let mut shared = self.shared.lock();
            if !should_flush(&shared.scheduler) {
                return Ok(());
            }

            shared.scheduler.disarm();
            match shared.batch.take_payload() {
                Some(payload) => (payload, shared.destination.clone()),
                None => return Ok(()),
            }
        };

        match self.transport.send(&payload, &destination) {
            Ok(bytes) => {
                debug!(bytes, %destination, "Sent stats payload.");
                Ok(())
            }
            Err(source) => Err(Error::Send { destination, source }),
        }
    }
}

fn flush_on_trigger(state: &Weak<State>, generation: u64) {
    let Some(state) = state.upgrade() else {
        return;
    };

    if let Err(e) = state.flush_if(|scheduler| scheduler.is_current(generation)) {
        warn!(error = %e, "Failed to send stats.");
    }
}

impl Drop for State {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(error = %e, "Failed to send stats.");
        }
    }
}
