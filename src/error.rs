//! Error taxonomy for the collector.
//!
//! Domain failures are typed so the fetcher and pool can decide what is
//! retried, what ends a job, and what ends a worker. Command-level code
//! wraps these in `anyhow` like the rest of the binary.

use std::path::PathBuf;
use thiserror::Error;

/// The symbol table is missing or malformed. Fatal before any job starts.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("symbol table unavailable at {path}: {reason}")]
    Unavailable { path: PathBuf, reason: String },
}

/// A page request failed. Always retried inside the fetcher.
#[derive(Debug, Error)]
pub enum TransportFailure {
    #[error("network error: {0}")]
    Network(String),

    #[error("upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode page: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for TransportFailure {
    fn from(err: reqwest::Error) -> Self {
        TransportFailure::Network(err.to_string())
    }
}

impl From<serde_json::Error> for TransportFailure {
    fn from(err: serde_json::Error) -> Self {
        TransportFailure::Decode(err.to_string())
    }
}

/// Rotating the network identity failed. Fatal for the affected worker.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("control port {addr} unreachable: {reason}")]
    Connect { addr: String, reason: String },

    #[error("control port rejected authentication: {0}")]
    Auth(String),

    #[error("identity signal failed: {0}")]
    Signal(String),

    #[error("could not build session: {0}")]
    Session(String),
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed cursor '{value}' in {path}")]
    MalformedCursor { path: PathBuf, value: String },

    #[error("archive task failed: {0}")]
    Task(String),
}

impl ArchiveError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ArchiveError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Why a fetch job stopped before reaching `Drained`.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("gave up after {attempts} failed requests: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: TransportFailure,
    },
}

impl FetchError {
    /// Identity failures take the worker down; everything else only fails the job.
    pub fn is_worker_fatal(&self) -> bool {
        matches!(self, FetchError::Identity(_))
    }
}
