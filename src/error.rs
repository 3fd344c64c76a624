//! error taxonomy shared by the relay core
//!
//! - `FetchError`: the remote endpoint could not be read (network category)
//! - `ValidationError`: a payload had the wrong shape
//! - `StoreError`: the storage engine failed
//! - `NoDataError`: the reconciler has nothing to render

use thiserror::Error;

/// failure pulling a reading from a remote sensor endpoint
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },

    #[error("{url} returned a body that is not JSON: {reason}")]
    Decode { url: String, reason: String },

    /// used by non-http fetchers (tests, emulators)
    #[error("sensor unavailable: {0}")]
    Unavailable(String),
}

/// payload rejected by the ingest validator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("validation failed: {cause}")]
pub struct ValidationError {
    pub cause: String,
}

impl ValidationError {
    pub fn new(cause: impl Into<String>) -> Self {
        Self { cause: cause.into() }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// both series handed to the reconciler were empty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no data points to align")]
pub struct NoDataError;
