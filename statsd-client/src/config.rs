//! Discovery of the remote server from well-known configuration files.
//!
//! A configuration file holds a single URL, such as `statsd://stats.internal:8125`. Its host and port become the
//! destination; either one may be left out, in which case the default host or port is used.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::transport::{Destination, DEFAULT_HOST, DEFAULT_PORT};

/// Name of the configuration file looked for in each location.
pub const CONFIG_FILE_NAME: &str = "statsd.url";

/// Application name used by [`ConfigLocations::default`].
pub const DEFAULT_APPLICATION: &str = "statsd";

/// Errors that could occur while reading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file exists but could not be read.
    #[error("failed to read '{}': {source}", path.display())]
    Io {
        /// Path of the configuration file.
        path: PathBuf,

        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The configuration file does not hold a valid URL.
    #[error("invalid URL in '{}': {source}", path.display())]
    InvalidUrl {
        /// Path of the configuration file.
        path: PathBuf,

        /// Underlying parse error.
        #[source]
        source: url::ParseError,
    },
}

/// Ordered list of candidate configuration files.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigLocations {
    candidates: Vec<PathBuf>,
}

impl ConfigLocations {
    /// Returns the standard locations for an application: the current directory, then `~/.<name>/`, then
    /// `/etc/<name>/`.
    ///
    /// The home directory candidate is skipped if the home directory cannot be determined.
    pub fn for_application(name: &str) -> Self {
        let mut candidates = vec![PathBuf::from(".").join(CONFIG_FILE_NAME)];
        if let Some(home) = home::home_dir() {
            candidates.push(home.join(format!(".{name}")).join(CONFIG_FILE_NAME));
        }
        candidates.push(PathBuf::from("/etc").join(name).join(CONFIG_FILE_NAME));

        ConfigLocations { candidates }
    }

    /// Creates locations from an explicit, ordered list of files.
    pub fn from_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        ConfigLocations { candidates: paths.into_iter().map(Into::into).collect() }
    }

    /// Candidate files, in the order they are checked.
    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }
}

impl Default for ConfigLocations {
    fn default() -> Self {
        ConfigLocations::for_application(DEFAULT_APPLICATION)
    }
}

/// Finds the destination configured in the first existing candidate file.
///
/// Returns `Ok(None)` if none of the candidates exist.
///
/// # Errors
///
/// If the first existing file cannot be read, or does not hold a valid URL, an error is returned. Later candidates are
/// not consulted in that case.
pub fn discover(locations: &ConfigLocations) -> Result<Option<Destination>, ConfigError> {
    let Some(path) = locations.candidates.iter().find(|path| path.is_file()) else {
        return Ok(None);
    };

    debug!(path = %path.display(), "Reading StatsD configuration.");
    read_destination(path).map(Some)
}

fn read_destination(path: &Path) -> Result<Destination, ConfigError> {
    let contents =
        fs::read_to_string(path).map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
    let url = Url::parse(contents.trim())
        .map_err(|source| ConfigError::InvalidUrl { path: path.to_path_buf(), source })?;

    Ok(destination_from_url(&url))
}

fn destination_from_url(url: &Url) -> Destination {
    let host = match url.host_str() {
        Some(host) if !host.is_empty() => {
            host.strip_prefix('[').and_then(|h| h.strip_suffix(']')).unwrap_or(host)
        }
        _ => DEFAULT_HOST,
    };

    Destination::new(host, url.port().unwrap_or(DEFAULT_PORT))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{discover, ConfigError, ConfigLocations, CONFIG_FILE_NAME};
    use crate::transport::Destination;

    #[test]
    fn standard_locations_are_ordered() {
        let locations = ConfigLocations::for_application("ssh-hammer");
        let candidates = locations.candidates();

        assert_eq!(candidates.first().unwrap(), &std::path::PathBuf::from("./statsd.url"));
        assert_eq!(candidates.last().unwrap(), &std::path::PathBuf::from("/etc/ssh-hammer/statsd.url"));
        if candidates.len() == 3 {
            assert!(candidates[1].ends_with(".ssh-hammer/statsd.url"));
        }
    }

    #[test]
    fn no_candidates_exist() {
        let dir = tempfile::tempdir().unwrap();
        let locations = ConfigLocations::from_paths([dir.path().join("missing.url")]);

        assert_eq!(discover(&locations).unwrap(), None);
    }

    #[test]
    fn first_existing_candidate_wins() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first").join(CONFIG_FILE_NAME);
        let second = dir.path().join("second.url");
        let third = dir.path().join("third.url");
        fs::write(&second, "statsd://stats.internal:9125\n").unwrap();
        fs::write(&third, "statsd://ignored:1\n").unwrap();

        let locations = ConfigLocations::from_paths([first, second, third]);
        assert_eq!(discover(&locations).unwrap(), Some(Destination::new("stats.internal", 9125)));
    }

    #[test]
    fn missing_parts_use_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let no_port = dir.path().join("no_port.url");
        let v6 = dir.path().join("v6.url");
        fs::write(&no_port, "statsd://stats.internal").unwrap();
        fs::write(&v6, "udp://[::1]:9000").unwrap();

        let locations = ConfigLocations::from_paths([&no_port]);
        assert_eq!(discover(&locations).unwrap(), Some(Destination::new("stats.internal", 8125)));

        let locations = ConfigLocations::from_paths([&v6]);
        assert_eq!(discover(&locations).unwrap(), Some(Destination::new("::1", 9000)));
    }

    #[test]
    fn invalid_url_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.url");
        fs::write(&path, "not a url").unwrap();

        let locations = ConfigLocations::from_paths([&path]);
        assert!(matches!(discover(&locations), Err(ConfigError::InvalidUrl { .. })));
    }
}
