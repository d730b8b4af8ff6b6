//! Datastore error types.

use thiserror::Error;

/// Result type for datastore operations.
pub type Result<T> = std::result::Result<T, DatastoreError>;

/// Errors from the time-series backend or the local write path.
#[derive(Debug, Error)]
pub enum DatastoreError {
    /// Invalid store configuration (bad URL, missing database, ...).
    #[error("invalid datastore configuration: {0}")]
    Config(String),

    /// Failed to read TLS material from disk.
    #[error("reading TLS material from '{path}': {source}")]
    TlsMaterial {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Transport-level failure talking to the backend.
    #[error("influxdb request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("influxdb returned {status}: {body}")]
    Server {
        status: reqwest::StatusCode,
        body: String,
    },

    /// The backend embedded an error in a query response.
    #[error("error executing query: {0}")]
    Query(String),

    /// A chunked response document could not be decoded.
    #[error("decoding query response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Queries require an application name to select a measurement.
    #[error("missing application name")]
    MissingAppName,

    /// The store is inside its reconnect backoff window; the batch was
    /// dropped without a network attempt.
    #[error("backend unavailable, backing off")]
    BackingOff,
}
