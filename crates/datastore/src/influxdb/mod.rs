//! Batched InfluxDB v1 datastore.
//!
//! # Write path
//!
//! [`InfluxDbStore::write`] appends a point to an in-memory buffer guarded
//! by a mutex; no network I/O happens on the common path. A background loop
//! flushes the buffer every `write_interval` seconds as one line-protocol
//! bulk write, and once an hour deletes points older than the retention
//! period from every known measurement. The buffer has a hard cap; a write
//! that finds it full performs a synchronous flush first.
//!
//! # Failure policy
//!
//! A failed flush logs and discards its batch. After a failure the store
//! backs off exponentially (1s doubling up to 60s); flushes inside the
//! window drop their batch without a network attempt, so ingest latency
//! stays uniform while the backend is down.

mod client;
mod line;
mod query;

pub use client::InfluxClient;
pub use line::Point;
pub use query::{LogReader, build_query};

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use coriolis_record::LogRecord;
use coriolis_writers::{LogWriter, WriteError};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{DataStore, DatastoreError, LogStream, QueryParams, RecordReader, Result};

/// Hard cap on buffered points; reaching it forces a synchronous flush.
const MAX_BATCH: usize = 20_000;

/// Chunk size for streaming queries.
const QUERY_CHUNK_SIZE: usize = 20_000;

/// How often stored logs are checked against the retention period.
const ROTATION_INTERVAL: Duration = Duration::from_secs(3600);

/// Backoff bounds for reconnect attempts after a failed flush.
const BACKOFF_INITIAL: Duration = Duration::from_secs(1);
const BACKOFF_MAX: Duration = Duration::from_secs(60);

/// Connection settings for the InfluxDB v1 backend.
#[derive(Debug, Clone)]
pub struct InfluxDbConfig {
    /// Base URL, e.g. `http://127.0.0.1:8086`.
    pub url: String,
    pub username: String,
    pub password: String,
    pub database: String,
    /// Verify the server certificate when connecting over https.
    pub verify_server: bool,
    /// Optional PEM paths for TLS toward the backend.
    pub ca_cert: Option<String>,
    pub client_crt: Option<String>,
    pub client_key: Option<String>,
    /// Seconds between flushes; 0 is treated as 1.
    pub write_interval: u64,
    /// Days of retention enforced by the hourly rotation pass.
    pub log_retention_period: u32,
}

impl InfluxDbConfig {
    pub fn validate(&self) -> Result<()> {
        let url: reqwest::Url = self
            .url
            .parse()
            .map_err(|_| DatastoreError::Config(format!("invalid InfluxDB URL: {:?}", self.url)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(DatastoreError::Config(format!(
                "invalid InfluxDB URL scheme: {:?}",
                url.scheme()
            )));
        }
        if url.host_str().is_none() {
            return Err(DatastoreError::Config("InfluxDB URL has no host".into()));
        }
        if self.database.is_empty() {
            return Err(DatastoreError::Config("invalid database name".into()));
        }
        Ok(())
    }

    pub fn write_interval(&self) -> Duration {
        Duration::from_secs(self.write_interval.max(1))
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.log_retention_period))
    }
}

/// Reconnect backoff state, bumped on flush failure and cleared on success.
#[derive(Debug, Default)]
struct Backoff {
    failures: u32,
    retry_at: Option<Instant>,
}

impl Backoff {
    fn is_waiting(&self) -> bool {
        self.retry_at.is_some_and(|at| Instant::now() < at)
    }

    fn bump(&mut self) {
        let delay = Self::delay_after(self.failures);
        self.failures = self.failures.saturating_add(1);
        self.retry_at = Some(Instant::now() + delay);
    }

    fn reset(&mut self) {
        self.failures = 0;
        self.retry_at = None;
    }

    fn delay_after(failures: u32) -> Duration {
        let exp = failures.min(6); // 1s << 6 == 64s, clamped below
        (BACKOFF_INITIAL * 2u32.pow(exp)).min(BACKOFF_MAX)
    }
}

struct Inner {
    cfg: InfluxDbConfig,
    client: InfluxClient,
    points: Mutex<Vec<Point>>,
    backoff: Mutex<Backoff>,
}

/// Batched, periodically flushed writer over InfluxDB, with a scheduled
/// retention pass and a streaming query reader. Cheap to clone.
#[derive(Clone)]
pub struct InfluxDbStore {
    inner: Arc<Inner>,
}

impl InfluxDbStore {
    /// Build the HTTP client and verify the backend is reachable.
    ///
    /// A backend that does not answer the ping aborts startup.
    pub async fn connect(cfg: InfluxDbConfig) -> Result<Self> {
        cfg.validate()?;
        let client = InfluxClient::new(&cfg)?;
        client.ping().await?;

        Ok(Self {
            inner: Arc::new(Inner {
                cfg,
                client,
                points: Mutex::new(Vec::new()),
                backoff: Mutex::new(Backoff::default()),
            }),
        })
    }

    pub(crate) fn client(&self) -> &InfluxClient {
        &self.inner.client
    }

    /// Spawn the flush/rotation loop. Cancelling the token stops the loop
    /// after a final drain flush; await the handle to observe the drain.
    pub fn start(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut write_tick = tokio::time::interval(store.inner.cfg.write_interval());
            write_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut rotation_tick = tokio::time::interval(ROTATION_INTERVAL);
            rotation_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first interval tick fires immediately; skip the initial
            // rotation so startup does not race a half-configured backend.
            rotation_tick.tick().await;

            info!(
                database = %store.inner.cfg.database,
                interval_secs = store.inner.cfg.write_interval().as_secs(),
                retention_days = store.inner.cfg.log_retention_period,
                "influxdb flush loop started"
            );

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = write_tick.tick() => {
                        if let Err(e) = store.flush().await {
                            error!(error = %e, "failed to flush logs to backend");
                        }
                    }
                    _ = rotation_tick.tick() => {
                        let retention = store.inner.cfg.retention();
                        info!(days = store.inner.cfg.log_retention_period, "deleting logs older than retention period");
                        let older_than = Utc::now() - retention;
                        if let Err(e) = store.rotate(older_than).await {
                            error!(error = %e, "failed to rotate logs");
                        }
                    }
                }
            }

            // Drain whatever arrived since the last tick.
            if let Err(e) = store.flush().await {
                error!(error = %e, "final flush failed, discarding remaining batch");
            }
            info!("influxdb flush loop stopped");
        })
    }

    /// Swap out the pending batch and write it as one bulk request.
    ///
    /// The mutex is only held for the swap, never across network I/O. On
    /// failure the batch is gone; the caller gets the error for logging.
    pub async fn flush(&self) -> Result<()> {
        let batch = std::mem::take(&mut *self.inner.points.lock());
        if batch.is_empty() {
            return Ok(());
        }

        if self.inner.backoff.lock().is_waiting() {
            debug!(dropped = batch.len(), "inside backoff window, discarding batch");
            return Err(DatastoreError::BackingOff);
        }

        let count = batch.len();
        let body = line::encode_batch(&batch);
        match self.inner.client.write_batch(body).await {
            Ok(()) => {
                self.inner.backoff.lock().reset();
                debug!(points = count, "flushed batch to influxdb");
                Ok(())
            }
            Err(e) => {
                self.inner.backoff.lock().bump();
                Err(e)
            }
        }
    }

    /// Delete points older than `older_than` from every known measurement.
    pub async fn rotate(&self, older_than: DateTime<Utc>) -> Result<()> {
        let cutoff = line::timestamp_ns(&older_than);
        for stream in self.list().await? {
            let q = format!(
                r#"delete from "{}" where time < {}"#,
                line::escape_identifier(&stream.log_name),
                cutoff
            );
            self.inner.client.exec(&q).await?;
        }
        Ok(())
    }

    async fn list_streams(&self) -> Result<Vec<LogStream>> {
        let mut resp = self
            .inner
            .client
            .query_chunked("SHOW MEASUREMENTS", QUERY_CHUNK_SIZE)
            .await?;

        let mut streams = Vec::new();
        while let Some(result) = resp.next_result().await? {
            for series in result.series {
                for row in series.values {
                    if let Some(serde_json::Value::String(name)) = row.first() {
                        streams.push(LogStream {
                            log_name: name.clone(),
                        });
                    }
                }
            }
        }
        Ok(streams)
    }
}

#[async_trait::async_trait]
impl DataStore for InfluxDbStore {
    async fn list(&self) -> Result<Vec<LogStream>> {
        self.list_streams().await
    }

    fn result_reader(&self, params: QueryParams) -> Box<dyn RecordReader> {
        Box::new(LogReader::new(self.clone(), params))
    }
}

#[async_trait::async_trait]
impl LogWriter for InfluxDbStore {
    async fn write(&self, record: LogRecord) -> std::result::Result<(), WriteError> {
        let point = Point::from_record(&record);
        loop {
            {
                let mut points = self.inner.points.lock();
                if points.len() < MAX_BATCH {
                    points.push(point);
                    return Ok(());
                }
            }
            // At the cap: flush synchronously before appending. The
            // flush empties the buffer whether or not the write lands,
            // so the retry always has room.
            if let Err(e) = self.flush().await {
                warn!(error = %e, "synchronous flush at batch cap failed");
            }
        }
    }
}
