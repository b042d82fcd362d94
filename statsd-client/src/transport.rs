//! Transports that carry payloads to the remote StatsD server.

use std::{
    cell::RefCell,
    fmt, io,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs as _, UdpSocket},
    sync::Arc,
};

use parking_lot::Mutex;
use tracing::trace;

/// Default StatsD host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default StatsD port.
pub const DEFAULT_PORT: u16 = 8125;

/// Where payloads are sent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Destination {
    host: String,
    port: u16,
}

impl Destination {
    /// Creates a new `Destination`.
    pub fn new<H: Into<String>>(host: H, port: u16) -> Self {
        Destination { host: host.into(), port }
    }

    /// Host name or IP address of the remote server.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port of the remote server.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub(crate) fn set_host(&mut self, host: String) {
        self.host = host;
    }

    pub(crate) fn set_port(&mut self, port: u16) {
        self.port = port;
    }

    fn resolve(&self) -> io::Result<SocketAddr> {
        (self.host.as_str(), self.port).to_socket_addrs()?.next().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no addresses found for '{self}'"))
        })
    }
}

impl Default for Destination {
    fn default() -> Self {
        Destination::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Sends a fully-built payload to a destination.
///
/// Sends are best-effort: implementations should not retry, and should not block for longer than a single write.
pub trait Transport: Send + Sync {
    /// Sends `payload` to `destination` as a single unit, returning the number of bytes written.
    ///
    /// # Errors
    ///
    /// If the payload could not be sent, an error is returned.
    fn send(&self, payload: &[u8], destination: &Destination) -> io::Result<usize>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send(&self, payload: &[u8], destination: &Destination) -> io::Result<usize> {
        (**self).send(payload, destination)
    }
}

#[derive(Default)]
struct ThreadSockets {
    v4: Option<UdpSocket>,
    v6: Option<UdpSocket>,
}

impl ThreadSockets {
    fn slot(&mut self, addr: &SocketAddr) -> &mut Option<UdpSocket> {
        if addr.is_ipv4() {
            &mut self.v4
        } else {
            &mut self.v6
        }
    }
}

thread_local! {
    static SOCKETS: RefCell<ThreadSockets> = RefCell::new(ThreadSockets::default());
}

fn bind_for(addr: &SocketAddr) -> io::Result<UdpSocket> {
    let socket = if addr.is_ipv4() {
        UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?
    } else {
        UdpSocket::bind((Ipv6Addr::UNSPECIFIED, 0))?
    };
    socket.set_nonblocking(true)?;
    Ok(socket)
}

/// Sends each payload as one UDP datagram.
///
/// Every thread lazily binds its own socket on first use and reuses it afterwards, so concurrent senders never
/// contend on a shared socket. A socket that fails to send is discarded and rebound on the next send.
#[derive(Clone, Copy, Debug, Default)]
pub struct UdpTransport;

impl Transport for UdpTransport {
    fn send(&self, payload: &[u8], destination: &Destination) -> io::Result<usize> {
        let addr = destination.resolve()?;

        SOCKETS.with(|sockets| {
            let mut sockets = sockets.borrow_mut();
            let slot = sockets.slot(&addr);

            let socket = match slot.take() {
                Some(socket) => socket,
                None => {
                    trace!(%addr, "Binding thread-local UDP socket.");
                    bind_for(&addr)?
                }
            };

            let result = socket.send_to(payload, addr);
            if result.is_ok() {
                *slot = Some(socket);
            }

            result
        })
    }
}

/// Discards every payload.
#[derive(Clone, Copy, Debug, Default)]
pub struct NopTransport;

impl Transport for NopTransport {
    fn send(&self, payload: &[u8], _: &Destination) -> io::Result<usize> {
        Ok(payload.len())
    }
}

#[derive(Default)]
struct SpyInner {
    payloads: Vec<(Destination, Vec<u8>)>,
    fail_sends: bool,
}

/// Records every payload instead of sending it.
///
/// Clones share the same record, so a test can hand one clone to a client and inspect the other. Sends can be made to
/// fail, in which case the payload is still recorded as attempted.
#[derive(Clone, Default)]
pub struct SpyTransport {
    inner: Arc<Mutex<SpyInner>>,
}

impl SpyTransport {
    /// Creates a new `SpyTransport`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent send fail (or succeed again).
    pub fn fail_sends(&self, fail: bool) {
        self.inner.lock().fail_sends = fail;
    }

    /// Returns every payload attempted so far, as strings.
    pub fn payloads(&self) -> Vec<String> {
        self.inner
            .lock()
            .payloads
            .iter()
            .map(|(_, payload)| String::from_utf8_lossy(payload).into_owned())
            .collect()
    }

    /// Returns every line attempted so far, across all payloads.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for payload in self.payloads() {
            lines.extend(payload.split('\n').map(str::to_owned));
        }
        lines
    }

    /// Returns the destinations of every payload attempted so far.
    pub fn destinations(&self) -> Vec<Destination> {
        self.inner.lock().payloads.iter().map(|(dest, _)| dest.clone()).collect()
    }

    /// Returns the number of sends attempted so far.
    pub fn send_count(&self) -> usize {
        self.inner.lock().payloads.len()
    }
}

impl Transport for SpyTransport {
    fn send(&self, payload: &[u8], destination: &Destination) -> io::Result<usize> {
        let mut inner = self.inner.lock();
        inner.payloads.push((destination.clone(), payload.to_vec()));

        if inner.fail_sends {
            Err(io::Error::new(io::ErrorKind::ConnectionRefused, "spy transport configured to fail"))
        } else {
            Ok(payload.len())
        }
    }
}
