//! Persistent log storage over an external time-series database.
//!
//! The only production implementation is [`InfluxDbStore`], a batched writer
//! over the InfluxDB v1 HTTP API. Records accumulate in an in-memory buffer
//! and are flushed by a periodic loop; durability is explicitly traded for
//! uniform ingest latency (a failed flush discards its batch). A scheduled
//! rotation pass deletes points older than the retention period.
//!
//! Reads are streaming: [`DataStore::result_reader`] returns a lazy,
//! forward-only reader that pulls one chunked-query response per call.

mod error;
pub mod influxdb;
mod params;

pub use error::{DatastoreError, Result};
pub use influxdb::{InfluxDbConfig, InfluxDbStore};
pub use params::QueryParams;

use bytes::Bytes;
use serde::Serialize;

/// One stored log stream, named after the application that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogStream {
    pub log_name: String,
}

/// A forward-only, single-consumer reader over one stored stream.
#[async_trait::async_trait]
pub trait RecordReader: Send {
    /// Returns the next chunk of newline-separated messages, or `None`
    /// when the stream is exhausted. Not restartable.
    async fn read_next(&mut self) -> Result<Option<Bytes>>;
}

/// Query surface of a datastore, as consumed by the HTTP layer.
///
/// The write side is the [`coriolis_writers::LogWriter`] impl on the
/// concrete store; handlers only ever list streams and open readers.
#[async_trait::async_trait]
pub trait DataStore: Send + Sync {
    async fn list(&self) -> Result<Vec<LogStream>>;

    fn result_reader(&self, params: QueryParams) -> Box<dyn RecordReader>;
}
