use std::io;

use thiserror::Error;

use crate::transport::Destination;

/// Errors that can occur while queueing or sending stats.
///
/// These never surface through the emission methods of [`StatsdClient`][crate::StatsdClient], which log them and carry
/// on.
#[derive(Debug, Error)]
pub enum Error {
    /// Arming the delayed flush failed.
    #[error("failed to schedule stats send: {0}")]
    Schedule(#[source] io::Error),

    /// Sending a payload to the remote server failed.
    #[error("failed to send stats to {destination}: {source}")]
    Send {
        /// Where the payload was headed.
        destination: Destination,

        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}
