use std::{thread::sleep, time::Duration};

use statsd_client::{global, StatsdClient};

fn main() {
    tracing_subscriber::fmt::init();

    let statsd = StatsdClient::builder()
        .with_remote_address("localhost:9125")
        .expect("failed to parse remote address")
        .build()
        .expect("failed to build client");

    statsd.increment("garets");
    statsd.timing("glork", 320);
    statsd.gauge("bork", 100);

    let account = statsd.with_namespace("account");
    account.time("activate", || sleep(Duration::from_millis(25)));

    let mut timer = statsd.start_timer("upload");
    sleep(Duration::from_millis(10));
    timer.stop();

    // The process-wide client reads `statsd.url` from the standard locations, or falls back to 127.0.0.1:8125.
    global::increment("demo.runs");
    global::flush();

    // Loop over and over, reporting a sampled heartbeat every second.
    loop {
        statsd.increment_sampled("heartbeat", 0.5);
        sleep(Duration::from_secs(1));
    }
}
