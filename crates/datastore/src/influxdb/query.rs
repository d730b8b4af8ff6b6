//! Query construction and the streaming log reader.

use bytes::{BufMut, Bytes, BytesMut};
use coriolis_record::Severity;
use tracing::warn;

use crate::{DatastoreError, QueryParams, RecordReader, Result};

use super::client::{ChunkedResponse, StatementResult};
use super::line::{escape_identifier, timestamp_ns};
use super::{InfluxDbStore, QUERY_CHUNK_SIZE};

/// Build the select statement for a stored-log read.
///
/// The application name is required; optional predicates are joined with
/// `and`. The severity floor becomes a tag regex: tag values are single
/// digits, so a character class covers "at least this severe" exactly.
pub fn build_query(params: &QueryParams) -> Result<String> {
    if params.app_name.is_empty() {
        return Err(DatastoreError::MissingAppName);
    }

    let mut q = format!(
        r#"select time,severity,message from "{}""#,
        escape_identifier(&params.app_name)
    );

    let mut options = Vec::new();
    if let Some(start) = &params.start_date {
        options.push(format!("time >= {}", timestamp_ns(start)));
    }
    if let Some(end) = &params.end_date {
        options.push(format!("time <= {}", timestamp_ns(end)));
    }
    if let Some(hostname) = params.hostname.as_deref()
        && !hostname.is_empty()
    {
        options.push(format!("hostname = '{}'", hostname.replace('\'', "\\'")));
    }
    if let Some(severity) = params.severity
        && severity < Severity::Debug
    {
        options.push(format!("severity =~ /[0-{}]/", severity.as_u8()));
    }

    if !options.is_empty() {
        q.push_str(" where ");
        q.push_str(&options.join(" and "));
    }

    Ok(q)
}

/// Concatenate the `message` column of one chunk, newline-terminating
/// every value that does not already end with one.
fn concat_messages(result: &StatementResult) -> Bytes {
    let mut buf = BytesMut::new();
    for series in &result.series {
        for row in &series.values {
            let Some(serde_json::Value::String(message)) = row.get(2) else {
                continue;
            };
            buf.put_slice(message.as_bytes());
            if !message.ends_with('\n') {
                buf.put_u8(b'\n');
            }
        }
    }
    buf.freeze()
}

/// Lazy reader over one stored stream.
///
/// The query is only issued on the first [`read_next`]; before that the
/// store's pending batch is flushed so a reader observes its own recent
/// writes. Single-consumer, forward-only, not restartable.
///
/// [`read_next`]: RecordReader::read_next
pub struct LogReader {
    store: InfluxDbStore,
    params: QueryParams,
    response: Option<ChunkedResponse>,
    done: bool,
}

impl LogReader {
    pub(crate) fn new(store: InfluxDbStore, params: QueryParams) -> Self {
        Self {
            store,
            params,
            response: None,
            done: false,
        }
    }
}

#[async_trait::async_trait]
impl RecordReader for LogReader {
    async fn read_next(&mut self) -> Result<Option<Bytes>> {
        if self.done {
            return Ok(None);
        }

        let response = match &mut self.response {
            Some(response) => response,
            None => {
                if let Err(e) = self.store.flush().await {
                    warn!(error = %e, "pre-read flush failed, query may miss recent writes");
                }
                let query = build_query(&self.params)?;
                let response = self
                    .store
                    .client()
                    .query_chunked(&query, QUERY_CHUNK_SIZE)
                    .await?;
                self.response.insert(response)
            }
        };

        match response.next_result().await? {
            Some(result) => Ok(Some(concat_messages(&result))),
            None => {
                self.done = true;
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use chrono::Utc;

    use super::*;

    #[test]
    fn app_name_is_required() {
        let err = build_query(&QueryParams::default()).unwrap_err();
        assert!(matches!(err, DatastoreError::MissingAppName));
    }

    #[test]
    fn bare_query_has_no_where_clause() {
        let q = build_query(&QueryParams::new("myapp")).unwrap();
        assert_eq!(q, r#"select time,severity,message from "myapp""#);
    }

    #[test]
    fn predicates_are_joined_with_and() {
        let params = QueryParams {
            app_name: "myapp".into(),
            hostname: Some("host1".into()),
            start_date: Some(Utc.timestamp_opt(1_700_000_000, 0).unwrap()),
            end_date: Some(Utc.timestamp_opt(1_700_003_600, 0).unwrap()),
            severity: None,
        };
        let q = build_query(&params).unwrap();
        assert_eq!(
            q,
            r#"select time,severity,message from "myapp" where time >= 1700000000000000000 and time <= 1700003600000000000 and hostname = 'host1'"#
        );
    }

    #[test]
    fn unbounded_sides_are_omitted() {
        let params = QueryParams {
            app_name: "myapp".into(),
            start_date: Some(Utc.timestamp_opt(1_700_000_000, 0).unwrap()),
            ..Default::default()
        };
        let q = build_query(&params).unwrap();
        assert!(q.contains("time >= 1700000000000000000"));
        assert!(!q.contains("time <="));
    }

    #[test]
    fn severity_floor_becomes_a_tag_regex() {
        let params = QueryParams {
            app_name: "myapp".into(),
            severity: Some(Severity::Error),
            ..Default::default()
        };
        let q = build_query(&params).unwrap();
        assert!(q.ends_with("where severity =~ /[0-3]/"));
    }

    #[test]
    fn debug_floor_matches_everything_and_is_omitted() {
        let params = QueryParams {
            app_name: "myapp".into(),
            severity: Some(Severity::Debug),
            ..Default::default()
        };
        let q = build_query(&params).unwrap();
        assert!(!q.contains("where"));
    }

    #[test]
    fn messages_are_newline_terminated_once() {
        let result: StatementResult = serde_json::from_str(
            r#"{"series":[{"name":"myapp","columns":["time","severity","message"],
                "values":[[1,"6","plain"],[2,"6","has newline\n"],[3,"6",""]]}]}"#,
        )
        .unwrap();
        let bytes = concat_messages(&result);
        assert_eq!(&bytes[..], b"plain\nhas newline\n\n");
    }

    #[test]
    fn rows_without_a_message_column_are_skipped() {
        let result: StatementResult = serde_json::from_str(
            r#"{"series":[{"name":"myapp","columns":["time"],"values":[[1]]}]}"#,
        )
        .unwrap();
        assert!(concat_messages(&result).is_empty());
    }
}
