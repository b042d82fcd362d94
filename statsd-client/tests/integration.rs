use std::{
    net::UdpSocket,
    thread::{self, sleep},
    time::Duration,
};

use statsd_client::{transport::SpyTransport, StatsdBuilder, StatsdClient};

fn spy_client(flush_delay: Duration) -> (StatsdClient, SpyTransport) {
    let spy = SpyTransport::new();
    let client = StatsdBuilder::default()
        .with_flush_delay(flush_delay)
        .with_transport(spy.clone())
        .build()
        .expect("failed to build client");
    (client, spy)
}

#[test]
fn burst_is_sent_as_one_payload() {
    let (client, spy) = spy_client(Duration::from_millis(50));

    client.increment("first");
    client.gauge("second", 2);
    assert_eq!(spy.send_count(), 0);

    sleep(Duration::from_millis(500));

    assert_eq!(spy.payloads(), vec!["first:1|c\nsecond:2|g".to_string()]);
    assert_eq!(client.pending(), 0);
}

#[test]
fn trigger_rearms_after_firing() {
    let (client, spy) = spy_client(Duration::from_millis(50));

    client.increment("one");
    sleep(Duration::from_millis(500));
    client.increment("two");
    sleep(Duration::from_millis(500));

    assert_eq!(spy.payloads(), vec!["one:1|c".to_string(), "two:1|c".to_string()]);
}

#[test]
fn explicit_flush_cancels_pending_trigger() {
    let (client, spy) = spy_client(Duration::from_millis(100));

    client.increment("early");
    client.flush();
    assert_eq!(spy.send_count(), 1);

    sleep(Duration::from_millis(400));
    assert_eq!(spy.send_count(), 1);
}

#[test]
fn failed_delayed_send_is_not_retried() {
    let (client, spy) = spy_client(Duration::from_millis(50));
    spy.fail_sends(true);

    client.increment("lost");
    sleep(Duration::from_millis(500));
    assert_eq!(spy.send_count(), 1);
    assert_eq!(client.pending(), 0);

    spy.fail_sends(false);
    client.increment("found");
    client.flush();
    assert_eq!(spy.payloads(), vec!["lost:1|c".to_string(), "found:1|c".to_string()]);
}

#[test]
fn clones_share_one_queue_across_threads() {
    let (client, spy) = spy_client(Duration::from_secs(60));

    let handles = (0..4)
        .map(|i| {
            let client = client.clone();
            thread::spawn(move || {
                for _ in 0..25 {
                    client.count(&format!("worker{i}"), 1);
                }
            })
        })
        .collect::<Vec<_>>();
    for handle in handles {
        handle.join().expect("worker panicked");
    }

    client.flush();
    assert_eq!(spy.send_count(), 1);
    assert_eq!(spy.lines().len(), 100);
}

#[test]
fn sends_over_udp() {
    let server = UdpSocket::bind("127.0.0.1:0").expect("failed to bind test server");
    server.set_read_timeout(Some(Duration::from_secs(5))).expect("failed to set read timeout");
    let port = server.local_addr().expect("no local address").port();

    let client = StatsdClient::new("127.0.0.1", port).with_namespace("account");
    client.increment("activate");
    client.timing("glork", 320);
    client.flush();

    let mut buf = [0u8; 512];
    let received = server.recv(&mut buf).expect("no datagram received");
    assert_eq!(&buf[..received], b"account.activate:1|c\naccount.glork:320|ms");
}

#[test]
fn delayed_flushes_reuse_one_socket() {
    let server = UdpSocket::bind("127.0.0.1:0").expect("failed to bind test server");
    server.set_read_timeout(Some(Duration::from_secs(5))).expect("failed to set read timeout");
    let port = server.local_addr().expect("no local address").port();

    let client = StatsdBuilder::default()
        .with_host("127.0.0.1")
        .with_port(port)
        .with_flush_delay(Duration::from_millis(20))
        .build()
        .expect("failed to build client");

    let mut buf = [0u8; 512];
    let mut sources = Vec::new();
    for stat in ["first", "second", "third"] {
        client.increment(stat);
        let (received, source) = server.recv_from(&mut buf).expect("no datagram received");
        assert_eq!(&buf[..received], format!("{stat}:1|c").as_bytes());
        sources.push(source);
    }

    assert!(sources.iter().all(|source| *source == sources[0]), "sources differed: {sources:?}");
}
