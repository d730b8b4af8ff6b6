//! Sink contract and fan-out.
//!
//! Every destination a record can reach (stdout, the datastore, the
//! WebSocket hub) implements [`LogWriter`]. The ingest worker only ever
//! talks to a single writer; in production that is the [`AggregateWriter`],
//! which dispatches to all configured sinks concurrently and isolates their
//! failures from each other and from ingestion.

mod aggregate;
mod stdout;

pub use aggregate::AggregateWriter;
pub use stdout::StdoutWriter;

use coriolis_record::LogRecord;

/// A sink write failure. Sinks wrap their own error with one level of
/// context; the pipeline logs it and moves on.
#[derive(Debug, thiserror::Error)]
#[error("{context}: {source}")]
pub struct WriteError {
    context: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
}

impl WriteError {
    pub fn new(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

/// The minimal sink contract: deliver one record.
///
/// Writers are responsible for their own buffering and backpressure. A
/// `write` call must not block ingestion for longer than the writer's own
/// documented deadline.
#[async_trait::async_trait]
pub trait LogWriter: Send + Sync {
    async fn write(&self, record: LogRecord) -> Result<(), WriteError>;
}
