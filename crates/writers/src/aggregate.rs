//! Concurrent fan-out over a fixed set of sinks.

use std::sync::Arc;

use coriolis_record::LogRecord;
use tracing::error;

use crate::{LogWriter, WriteError};

/// Dispatches each record to every configured sink on its own task.
///
/// The sink list is set at startup and immutable. A slow or broken sink
/// only affects itself: `write` returns once all dispatches have been
/// spawned, and per-sink failures are logged rather than propagated.
pub struct AggregateWriter {
    writers: Vec<Arc<dyn LogWriter>>,
}

impl AggregateWriter {
    pub fn new(writers: Vec<Arc<dyn LogWriter>>) -> Self {
        Self { writers }
    }

    pub fn sink_count(&self) -> usize {
        self.writers.len()
    }
}

#[async_trait::async_trait]
impl LogWriter for AggregateWriter {
    async fn write(&self, record: LogRecord) -> Result<(), WriteError> {
        for writer in &self.writers {
            let writer = Arc::clone(writer);
            let record = record.clone();
            tokio::spawn(async move {
                if let Err(e) = writer.write(record).await {
                    error!(error = %e, "failed to write log record to sink");
                }
            });
        }
        Ok(())
    }
}
