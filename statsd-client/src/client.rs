use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use tracing::warn;

use crate::{
    builder::StatsdBuilder,
    state::State,
    timer::{round_millis, Timer},
    writer::{MetricType, MetricValue},
};

const FULL_RATE: f64 = 1.0;

/// A StatsD client.
///
/// Lines are queued and sent together, as one UDP datagram, shortly after the first line of a burst is queued. Sending
/// is best-effort: failures to schedule or send are logged as warnings and never returned to the caller.
///
/// Cloning a client is cheap, and clones share the same queue and configuration. Changing the host, port or namespace
/// only affects lines queued or payloads sent afterwards.
#[derive(Clone)]
pub struct StatsdClient {
    state: Arc<State>,
}

impl StatsdClient {
    pub(crate) fn from_state(state: State) -> Self {
        StatsdClient { state: Arc::new(state) }
    }

    /// Creates a client sending to `host:port`, with no namespace.
    pub fn new<H: Into<String>>(host: H, port: u16) -> Self {
        StatsdBuilder::default().with_host(host).with_port(port).build_unchecked()
    }

    /// Creates a builder for configuring a client.
    pub fn builder() -> StatsdBuilder {
        StatsdBuilder::default()
    }

    /// Creates a new client with the same destination and transport, but with its own queue and the given namespace.
    pub fn with_namespace<N: Into<String>>(&self, namespace: N) -> StatsdClient {
        let config = self.state.derive_config(Some(namespace.into()));
        StatsdClient::from_state(State::new(config))
    }

    /// Host of the remote server.
    pub fn host(&self) -> String {
        self.state.destination().host().to_string()
    }

    /// Sets the host of the remote server.
    pub fn set_host<H: Into<String>>(&self, host: H) {
        self.state.set_host(host.into());
    }

    /// Port of the remote server.
    pub fn port(&self) -> u16 {
        self.state.destination().port()
    }

    /// Sets the port of the remote server.
    pub fn set_port(&self, port: u16) {
        self.state.set_port(port);
    }

    /// Namespace prepended to every stat name, if any.
    pub fn namespace(&self) -> Option<String> {
        self.state.namespace()
    }

    /// Sets the namespace prepended to every stat name.
    ///
    /// An empty namespace is the same as no namespace.
    pub fn set_namespace<N: Into<String>>(&self, namespace: N) {
        self.state.set_namespace(Some(namespace.into()));
    }

    /// Removes the namespace.
    pub fn clear_namespace(&self) {
        self.state.set_namespace(None);
    }

    /// Increments a counter by one.
    pub fn increment(&self, stat: &str) {
        self.count_sampled(stat, 1, FULL_RATE);
    }

    /// Increments a counter by one, sampled at `sample_rate`.
    pub fn increment_sampled(&self, stat: &str, sample_rate: f64) {
        self.count_sampled(stat, 1, sample_rate);
    }

    /// Decrements a counter by one.
    pub fn decrement(&self, stat: &str) {
        self.count_sampled(stat, -1, FULL_RATE);
    }

    /// Decrements a counter by one, sampled at `sample_rate`.
    pub fn decrement_sampled(&self, stat: &str, sample_rate: f64) {
        self.count_sampled(stat, -1, sample_rate);
    }

    /// Adds `delta` to a counter.
    pub fn count(&self, stat: &str, delta: i64) {
        self.count_sampled(stat, delta, FULL_RATE);
    }

    /// Adds `delta` to a counter, sampled at `sample_rate`.
    ///
    /// The remote server scales sampled counts back up by `1 / sample_rate`.
    pub fn count_sampled(&self, stat: &str, delta: i64, sample_rate: f64) {
        self.emit(stat, MetricValue::Integer(delta), MetricType::Counter, sample_rate);
    }

    /// Reports the current value of a gauge.
    pub fn gauge<V: Into<MetricValue>>(&self, stat: &str, value: V) {
        self.gauge_sampled(stat, value, FULL_RATE);
    }

    /// Reports the current value of a gauge, sampled at `sample_rate`.
    pub fn gauge_sampled<V: Into<MetricValue>>(&self, stat: &str, value: V, sample_rate: f64) {
        self.emit(stat, value.into(), MetricType::Gauge, sample_rate);
    }

    /// Reports a timing, in milliseconds.
    pub fn timing(&self, stat: &str, ms: u64) {
        self.timing_sampled(stat, ms, FULL_RATE);
    }

    /// Reports a timing, in milliseconds, sampled at `sample_rate`.
    pub fn timing_sampled(&self, stat: &str, ms: u64, sample_rate: f64) {
        self.emit(stat, MetricValue::Unsigned(ms), MetricType::Timing, sample_rate);
    }

    /// Reports a duration as a timing, rounded to the nearest millisecond.
    pub fn timing_duration(&self, stat: &str, duration: Duration) {
        self.timing_sampled(stat, round_millis(duration), FULL_RATE);
    }

    /// Runs `f` and reports how long it took as a timing.
    ///
    /// Returns whatever `f` returns. If `f` panics, nothing is reported.
    pub fn time<F, R>(&self, stat: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        self.time_sampled(stat, FULL_RATE, f)
    }

    /// Runs `f` and reports how long it took as a timing, sampled at `sample_rate`.
    pub fn time_sampled<F, R>(&self, stat: &str, sample_rate: f64, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let start = Instant::now();
        let result = f();
        self.timing_sampled(stat, round_millis(start.elapsed()), sample_rate);
        result
    }

    /// Runs `f` and reports how long it took as a timing, but only if it succeeded.
    ///
    /// # Errors
    ///
    /// Any error returned by `f` is passed through unchanged, and no timing is reported for it.
    pub fn time_result<F, T, E>(&self, stat: &str, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        self.time_result_sampled(stat, FULL_RATE, f)
    }

    /// Runs `f` and reports how long it took as a timing, sampled at `sample_rate`, but only if it succeeded.
    ///
    /// # Errors
    ///
    /// Any error returned by `f` is passed through unchanged, and no timing is reported for it.
    pub fn time_result_sampled<F, T, E>(&self, stat: &str, sample_rate: f64, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let start = Instant::now();
        let value = f()?;
        self.timing_sampled(stat, round_millis(start.elapsed()), sample_rate);
        Ok(value)
    }

    /// Starts a timer that reports to `stat` when stopped.
    pub fn start_timer(&self, stat: &str) -> Timer {
        self.start_timer_sampled(stat, FULL_RATE)
    }

    /// Starts a timer that reports to `stat`, sampled at `sample_rate`, when stopped.
    pub fn start_timer_sampled(&self, stat: &str, sample_rate: f64) -> Timer {
        Timer::start(self.clone(), stat, sample_rate)
    }

    /// Sends every queued line immediately, cancelling the pending delayed flush.
    pub fn flush(&self) {
        if let Err(e) = self.state.flush() {
            warn!(error = %e, "Failed to send stats.");
        }
    }

    /// Returns the number of lines waiting to be sent.
    pub fn pending(&self) -> usize {
        self.state.pending_len()
    }

    fn emit(&self, stat: &str, value: MetricValue, metric_type: MetricType, sample_rate: f64) {
        if let Err(e) = self.state.enqueue(stat, value, metric_type, sample_rate) {
            warn!(error = %e, "Failed to schedule stats send.");
        }
    }
}

impl Default for StatsdClient {
    fn default() -> Self {
        StatsdBuilder::default().build_unchecked()
    }
}

impl fmt::Debug for StatsdClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatsdClient")
            .field("destination", &self.state.destination())
            .field("namespace", &self.state.namespace())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::{thread::sleep, time::Duration};

    use crate::{transport::SpyTransport, StatsdBuilder, StatsdClient};

    fn spy_client() -> (StatsdClient, SpyTransport) {
        let spy = SpyTransport::new();
        let client = StatsdBuilder::default()
            .with_flush_delay(Duration::from_secs(60))
            .with_sampler_seed(1)
            .with_transport(spy.clone())
            .build()
            .expect("failed to build client");
        (client, spy)
    }

    #[test]
    fn count_without_sample_suffix() {
        let (client, spy) = spy_client();
        client.count("stat", 5);
        client.flush();

        assert_eq!(spy.payloads(), vec!["stat:5|c".to_string()]);
    }

    #[test]
    fn increment_and_decrement() {
        let (client, spy) = spy_client();
        client.increment("garets");
        client.decrement("garets");
        client.flush();

        assert_eq!(spy.lines(), vec!["garets:1|c".to_string(), "garets:-1|c".to_string()]);
    }

    #[test]
    fn gauge_and_timing() {
        let (client, spy) = spy_client();
        client.gauge("bork", 100);
        client.timing("glork", 320);
        client.flush();

        assert_eq!(spy.payloads(), vec!["bork:100|g\nglork:320|ms".to_string()]);
    }

    #[test]
    fn sampled_lines_carry_rate() {
        let (client, spy) = spy_client();
        for _ in 0..64 {
            client.count_sampled("stat", 5, 0.5);
        }
        client.flush();

        let lines = spy.lines();
        assert!(!lines.is_empty());
        assert!(lines.iter().all(|line| line == "stat:5|c|@0.5"));
    }

    #[test]
    fn sampled_fraction_converges() {
        const ITERATIONS: usize = 10_000;

        let (client, spy) = spy_client();
        for _ in 0..ITERATIONS {
            client.count_sampled("stat", 5, 0.5);
        }
        let queued = client.pending();
        client.flush();

        let fraction = queued as f64 / ITERATIONS as f64;
        assert!((fraction - 0.5).abs() < 0.03, "admitted fraction was {fraction}");
        assert_eq!(spy.lines().len(), queued);
    }

    #[test]
    fn line_breaks_in_names_stay_on_one_line() {
        let (client, spy) = spy_client();
        client.increment("a\nb:c");
        client.gauge("d\r\ne", 1);
        client.flush();

        assert_eq!(spy.lines(), vec!["a_b_c:1|c".to_string(), "d__e:1|g".to_string()]);
    }

    #[test]
    fn non_finite_values_are_dropped() {
        let (client, spy) = spy_client();
        client.gauge("ratio", f64::NAN);
        client.gauge("ratio", f64::INFINITY);
        client.gauge("spread", f32::NEG_INFINITY);
        assert_eq!(client.pending(), 0);

        client.gauge("ratio", 0.5);
        client.flush();
        assert_eq!(spy.payloads(), vec!["ratio:0.5|g".to_string()]);
    }

    #[test]
    fn namespaced_client() {
        let (client, spy) = spy_client();
        let account = client.with_namespace("account");
        account.increment("activate");
        account.flush();

        assert_eq!(account.namespace().as_deref(), Some("account"));
        assert_eq!(client.namespace(), None);
        assert_eq!(spy.payloads(), vec!["account.activate:1|c".to_string()]);
    }

    #[test]
    fn namespace_changes_apply_to_later_lines() {
        let (client, spy) = spy_client();
        client.increment("before");
        client.set_namespace("ns");
        client.increment("during");
        client.clear_namespace();
        client.increment("after");
        client.flush();

        assert_eq!(
            spy.lines(),
            vec!["before:1|c".to_string(), "ns.during:1|c".to_string(), "after:1|c".to_string()]
        );
    }

    #[test]
    fn explicit_flush_with_empty_queue_sends_nothing() {
        let (client, spy) = spy_client();
        client.flush();
        client.flush();

        assert_eq!(spy.send_count(), 0);
    }

    #[test]
    fn send_failure_still_clears_queue() {
        let (client, spy) = spy_client();
        spy.fail_sends(true);

        client.increment("doomed");
        client.flush();
        assert_eq!(client.pending(), 0);
        assert_eq!(spy.send_count(), 1);

        client.flush();
        assert_eq!(spy.send_count(), 1);
    }

    #[test]
    fn timer_stops_once() {
        let (client, spy) = spy_client();
        let mut timer = client.start_timer("work");
        assert!(!timer.is_stopped());

        timer.stop();
        timer.stop();
        timer.stop();
        assert!(timer.is_stopped());
        client.flush();

        let lines = spy.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("work:") && lines[0].ends_with("|ms"));
    }

    #[test]
    fn time_returns_closure_result() {
        let (client, spy) = spy_client();
        let value = client.time("account.activate", || {
            sleep(Duration::from_millis(5));
            42
        });
        client.flush();

        assert_eq!(value, 42);
        let lines = spy.lines();
        assert_eq!(lines.len(), 1);

        let elapsed: u64 = lines[0]
            .strip_prefix("account.activate:")
            .and_then(|rest| rest.strip_suffix("|ms"))
            .and_then(|ms| ms.parse().ok())
            .expect("timing line should carry milliseconds");
        assert!(elapsed >= 5);
    }

    #[test]
    fn time_result_skips_errors() {
        let (client, spy) = spy_client();

        let ok: Result<u8, &str> = client.time_result("attempt", || Ok(1));
        let err: Result<u8, &str> = client.time_result("attempt", || Err("nope"));
        client.flush();

        assert_eq!(ok, Ok(1));
        assert_eq!(err, Err("nope"));
        assert_eq!(spy.lines().len(), 1);
    }

    #[test]
    fn host_and_port_accessors() {
        let (client, spy) = spy_client();
        assert_eq!(client.host(), "127.0.0.1");
        assert_eq!(client.port(), 8125);

        client.set_host("stats.internal");
        client.set_port(9125);
        client.increment("moved");
        client.flush();

        assert_eq!(client.host(), "stats.internal");
        assert_eq!(client.port(), 9125);
        let destinations = spy.destinations();
        assert_eq!(destinations.len(), 1);
        assert_eq!(destinations[0].to_string(), "stats.internal:9125");
    }

    #[test]
    fn dropping_last_handle_flushes() {
        let spy = SpyTransport::new();
        {
            let client = StatsdBuilder::default()
                .with_flush_delay(Duration::from_secs(60))
                .with_transport(spy.clone())
                .build()
                .expect("failed to build client");
            let clone = client.clone();
            clone.increment("parting");
        }

        assert_eq!(spy.payloads(), vec!["parting:1|c".to_string()]);
    }
}
