//! Thin HTTP client for the InfluxDB v1 API.
//!
//! Covers the three endpoints the store needs: `/ping` for the startup
//! probe, `/write` for line-protocol bulk writes, and `/query` for
//! management statements and chunked reads. Chunked responses arrive as
//! newline-delimited JSON documents and are decoded incrementally.

use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use tracing::debug;

use crate::{DatastoreError, Result};

use super::InfluxDbConfig;

/// Client over the v1 HTTP API. Cheap to clone; connection pooling is
/// handled by reqwest.
#[derive(Debug, Clone)]
pub struct InfluxClient {
    http: reqwest::Client,
    base: reqwest::Url,
    username: String,
    password: String,
    database: String,
}

impl InfluxClient {
    pub fn new(cfg: &InfluxDbConfig) -> Result<Self> {
        let base: reqwest::Url = cfg
            .url
            .parse()
            .map_err(|_| DatastoreError::Config(format!("invalid InfluxDB URL: {:?}", cfg.url)))?;

        let mut builder = reqwest::Client::builder();
        if let Some(path) = &cfg.ca_cert {
            let pem = std::fs::read(path).map_err(|e| DatastoreError::TlsMaterial {
                path: path.clone(),
                source: e,
            })?;
            let cert = reqwest::Certificate::from_pem(&pem)?;
            builder = builder.add_root_certificate(cert);
        }
        if let (Some(crt), Some(key)) = (&cfg.client_crt, &cfg.client_key) {
            let mut pem = std::fs::read(crt).map_err(|e| DatastoreError::TlsMaterial {
                path: crt.clone(),
                source: e,
            })?;
            let key_pem = std::fs::read(key).map_err(|e| DatastoreError::TlsMaterial {
                path: key.clone(),
                source: e,
            })?;
            pem.extend_from_slice(&key_pem);
            builder = builder.identity(reqwest::Identity::from_pem(&pem)?);
        }
        if !cfg.verify_server {
            builder = builder.danger_accept_invalid_certs(true);
        }

        Ok(Self {
            http: builder.build()?,
            base,
            username: cfg.username.clone(),
            password: cfg.password.clone(),
            database: cfg.database.clone(),
        })
    }

    fn with_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.username.is_empty() {
            req
        } else {
            req.basic_auth(&self.username, Some(&self.password))
        }
    }

    fn endpoint(&self, path: &str) -> Result<reqwest::Url> {
        self.base
            .join(path)
            .map_err(|e| DatastoreError::Config(format!("building request URL: {e}")))
    }

    /// Startup probe; any non-success status is a connection failure.
    pub async fn ping(&self) -> Result<()> {
        let url = self.endpoint("ping")?;
        let resp = self.with_auth(self.http.get(url)).send().await?;
        check_status(resp).await?;
        Ok(())
    }

    /// Bulk-write a line-protocol body with nanosecond precision.
    pub async fn write_batch(&self, body: String) -> Result<()> {
        let url = self.endpoint("write")?;
        let resp = self
            .with_auth(self.http.post(url))
            .query(&[("db", self.database.as_str()), ("precision", "ns")])
            .body(body)
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }

    /// Execute a management statement (e.g. a delete) and surface any
    /// in-band error.
    pub async fn exec(&self, statement: &str) -> Result<()> {
        let url = self.endpoint("query")?;
        let resp = self
            .with_auth(self.http.post(url))
            .query(&[
                ("db", self.database.as_str()),
                ("q", statement),
                ("epoch", "ns"),
            ])
            .send()
            .await?;
        let resp = check_status(resp).await?;

        let body: ChunkDocument = resp.json().await?;
        for result in body.into_results()? {
            debug!(series = result.series.len(), "statement executed");
        }
        Ok(())
    }

    /// Issue a chunked query; results stream back one document per chunk.
    pub async fn query_chunked(&self, q: &str, chunk_size: usize) -> Result<ChunkedResponse> {
        let url = self.endpoint("query")?;
        let chunk_size = chunk_size.to_string();
        let resp = self
            .with_auth(self.http.post(url))
            .query(&[
                ("db", self.database.as_str()),
                ("q", q),
                ("epoch", "ns"),
                ("chunked", "true"),
                ("chunk_size", chunk_size.as_str()),
            ])
            .send()
            .await?;
        let resp = check_status(resp).await?;

        Ok(ChunkedResponse::new(resp.bytes_stream()))
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(DatastoreError::Server { status, body })
}

// =============================================================================
// Chunked response decoding
// =============================================================================

/// One `results` entry of a query response document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatementResult {
    #[serde(default)]
    pub series: Vec<Series>,
    #[serde(default)]
    pub error: Option<String>,
}

/// One series of a statement result.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Series {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub values: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct ChunkDocument {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    error: Option<String>,
}

impl ChunkDocument {
    fn into_results(self) -> Result<Vec<StatementResult>> {
        if let Some(err) = self.error {
            return Err(DatastoreError::Query(err));
        }
        for result in &self.results {
            if let Some(err) = &result.error {
                return Err(DatastoreError::Query(err.clone()));
            }
        }
        Ok(self.results)
    }
}

type ByteStream =
    std::pin::Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send + 'static>>;

/// Incremental decoder over a chunked query body: newline-delimited JSON
/// documents, one per chunk.
pub struct ChunkedResponse {
    stream: Option<ByteStream>,
    buf: BytesMut,
    pending: Vec<StatementResult>,
}

impl ChunkedResponse {
    fn new(stream: impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static) -> Self {
        Self {
            stream: Some(Box::pin(stream)),
            buf: BytesMut::new(),
            pending: Vec::new(),
        }
    }

    /// Decoder over an in-memory body. Test seam; the wire path goes
    /// through [`InfluxClient::query_chunked`].
    #[cfg(test)]
    pub(crate) fn from_bytes(body: Bytes) -> Self {
        Self::new(futures_util::stream::iter([Ok(body)]))
    }

    /// The next statement result, or `None` once the body is exhausted.
    pub async fn next_result(&mut self) -> Result<Option<StatementResult>> {
        loop {
            if let Some(result) = self.pending.pop() {
                return Ok(Some(result));
            }

            let Some(doc) = self.next_document().await? else {
                return Ok(None);
            };
            let mut results = doc.into_results()?;
            // Reverse so pop() hands them back in document order.
            results.reverse();
            self.pending = results;
        }
    }

    async fn next_document(&mut self) -> Result<Option<ChunkDocument>> {
        loop {
            if let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
                let line = self.buf.split_to(pos + 1);
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                return Ok(Some(serde_json::from_slice(&line)?));
            }

            let Some(stream) = self.stream.as_mut() else {
                return Ok(None);
            };
            match stream.next().await {
                Some(chunk) => self.buf.extend_from_slice(&chunk?),
                None => {
                    // The final document may lack a trailing newline.
                    self.stream = None;
                    if self.buf.iter().all(u8::is_ascii_whitespace) {
                        self.buf.clear();
                        return Ok(None);
                    }
                    let line = self.buf.split();
                    return Ok(Some(serde_json::from_slice(&line)?));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn decodes_newline_delimited_chunks() {
        let body = concat!(
            r#"{"results":[{"statement_id":0,"series":[{"name":"myapp","columns":["time","severity","message"],"values":[[1,"6","a"]],"partial":true}],"partial":true}]}"#,
            "\n",
            r#"{"results":[{"statement_id":0,"series":[{"name":"myapp","columns":["time","severity","message"],"values":[[2,"6","b"]]}]}]}"#,
            "\n",
        );
        let mut resp = ChunkedResponse::from_bytes(Bytes::from_static(body.as_bytes()));

        let first = resp.next_result().await.unwrap().unwrap();
        assert_eq!(first.series[0].values[0][2], "a");
        let second = resp.next_result().await.unwrap().unwrap();
        assert_eq!(second.series[0].values[0][2], "b");
        assert!(resp.next_result().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn final_document_without_newline_is_decoded() {
        let body = r#"{"results":[{"statement_id":0,"series":[{"name":"m","columns":["name"],"values":[["myapp"]]}]}]}"#;
        let mut resp = ChunkedResponse::from_bytes(Bytes::from_static(body.as_bytes()));

        let result = resp.next_result().await.unwrap().unwrap();
        assert_eq!(result.series[0].values[0][0], "myapp");
        assert!(resp.next_result().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn in_band_errors_are_surfaced() {
        let body = r#"{"results":[{"statement_id":0,"error":"database not found: logs"}]}"#;
        let mut resp = ChunkedResponse::from_bytes(Bytes::from_static(body.as_bytes()));

        let err = resp.next_result().await.unwrap_err();
        assert!(matches!(err, DatastoreError::Query(msg) if msg.contains("database not found")));
    }

    #[tokio::test]
    async fn empty_body_yields_no_results() {
        let mut resp = ChunkedResponse::from_bytes(Bytes::from_static(b"\n"));
        assert!(resp.next_result().await.unwrap().is_none());
    }
}
