//! A client for sending metrics to a [StatsD][statsd] server over UDP.
//!
//! [statsd]: https://github.com/statsd/statsd
//!
//! # Usage
//!
//! ```no_run
//! # use statsd_client::StatsdClient;
//! // Send to a server on localhost, with every stat name prefixed by `account.`.
//! let statsd = StatsdClient::builder()
//!     .with_remote_address("localhost:8125")
//!     .expect("failed to parse remote address")
//!     .with_namespace("account")
//!     .build()
//!     .expect("failed to build client");
//!
//! statsd.increment("activate");
//! statsd.gauge("sessions", 42);
//! statsd.timing("login", 320);
//!
//! // Time a closure, getting back whatever it returns.
//! let answer = statsd.time("compute", || 6 * 7);
//!
//! // Or time something by hand.
//! let mut timer = statsd.start_timer("upload");
//! // ... do the upload ...
//! timer.stop();
//! ```
//!
//! # Batching
//!
//! Stats are not sent as they are recorded. The first stat recorded arms a short delay (500 milliseconds by default),
//! and when it expires every stat recorded in the meantime is sent together as a single newline-delimited datagram.
//! Calling [`StatsdClient::flush`] sends everything immediately and cancels the delay.
//!
//! # Sampling
//!
//! Every method has a `_sampled` variant taking a sample rate between 0 and 1. Only that fraction of calls, chosen at
//! random, are actually sent, tagged with the rate so the server can scale them back up.
//!
//! # Failures
//!
//! Sending is best-effort. If a delayed flush can't be scheduled, or a datagram can't be sent, a warning is logged via
//! [`tracing`] and the stats involved are dropped. Errors never reach the caller.
//!
//! # Global client
//!
//! The [`global`] module holds a process-wide default client, configured from a `statsd.url` file if one exists. See
//! [`config`] for where those files are looked for.

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

mod builder;
pub use self::builder::{BuildError, StatsdBuilder};

mod client;
pub use self::client::StatsdClient;

pub mod config;
mod error;
pub mod global;
mod sampler;
mod scheduler;
pub use self::scheduler::DEFAULT_FLUSH_DELAY;

mod state;

mod timer;
pub use self::timer::Timer;

pub mod transport;

mod writer;
pub use self::writer::{sanitize_name, MetricValue};
