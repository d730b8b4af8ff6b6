//! Echo sink for standard output.

use coriolis_record::LogRecord;
use tokio::io::AsyncWriteExt;

use crate::{LogWriter, WriteError};

/// Writes each record's message to stdout.
///
/// The reference implementation of the sink contract; also what
/// `LogToStdout` composes into the pipeline for debugging.
#[derive(Debug, Default)]
pub struct StdoutWriter;

impl StdoutWriter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl LogWriter for StdoutWriter {
    async fn write(&self, record: LogRecord) -> Result<(), WriteError> {
        let mut line = record.message.into_bytes();
        line.push(b'\n');

        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(&line)
            .await
            .map_err(|e| WriteError::new("writing log message to stdout", e))?;
        Ok(())
    }
}
