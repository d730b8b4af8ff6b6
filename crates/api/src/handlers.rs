//! Route handlers: WebSocket upgrade, stream listing, stream download.

use std::io::Write;

use axum::body::Body;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use coriolis_datastore::{QueryParams, RecordReader};
use coriolis_hub::{FilterSpec, Subscriber};
use coriolis_record::Severity;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::auth::{can_access, MaybeAuth};
use crate::{ApiError, AppState};

// =============================================================================
// Query parameter handling
// =============================================================================

/// Severity from a query parameter; anything missing, malformed or out of
/// range falls back to the default level.
fn get_severity(raw: Option<&str>) -> Severity {
    let Some(raw) = raw.filter(|raw| !raw.is_empty()) else {
        return Severity::default_level();
    };
    raw.parse::<i64>()
        .ok()
        .and_then(|value| u8::try_from(value).ok())
        .and_then(|value| Severity::try_from(value).ok())
        .unwrap_or_else(|| {
            warn!(severity = %raw, "invalid severity, using default");
            Severity::default_level()
        })
}

/// Unix-seconds timestamp parameter; empty means unbounded.
fn timestamp_to_time(raw: Option<&str>) -> Result<Option<DateTime<Utc>>, ()> {
    let Some(raw) = raw.filter(|raw| !raw.is_empty()) else {
        return Ok(None);
    };
    let seconds: i64 = raw.parse().map_err(|_| ())?;
    match Utc.timestamp_opt(seconds, 0) {
        chrono::LocalResult::Single(ts) => Ok(Some(ts)),
        _ => Err(()),
    }
}

/// Permissive bool in the strconv.ParseBool family; unparsable values
/// count as false.
fn parse_bool_param(raw: Option<&str>) -> bool {
    matches!(raw, Some("1" | "t" | "T" | "true" | "TRUE" | "True"))
}

/// Origin allow-list check for WebSocket upgrades. A missing `Origin`
/// header and an empty allow-list both pass; `*` matches everything.
fn origin_allowed(allowed: &[String], headers: &HeaderMap) -> bool {
    if allowed.is_empty() {
        return true;
    }
    let Some(origin) = headers.get(header::ORIGIN).and_then(|o| o.to_str().ok()) else {
        return true;
    };
    allowed.iter().any(|a| a == "*" || a == origin)
}

// =============================================================================
// WebSocket subscription
// =============================================================================

#[derive(Debug, Deserialize)]
pub(crate) struct WsQuery {
    severity: Option<String>,
    app_name: Option<String>,
}

pub(crate) async fn ws_handler(
    State(state): State<AppState>,
    MaybeAuth(details): MaybeAuth,
    Query(params): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    if !can_access(state.auth.is_some(), details.as_ref()) {
        return Err(ApiError::admin_required());
    }
    if !origin_allowed(&state.cors_origins, &headers) {
        return Err(ApiError::Forbidden("origin not allowed".into()));
    }

    let filter = FilterSpec::new(
        Some(get_severity(params.severity.as_deref())),
        params.app_name,
    );
    let expires_at = details.and_then(|d| d.expires_at);
    let hub = state.hub.clone();

    let response = ws
        .max_message_size(coriolis_hub::MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| async move {
            let (subscriber, entry) = Subscriber::new(socket, filter, expires_at, hub.clone());
            if let Err(e) = hub.register(entry).await {
                error!(error = %e, "failed to register new subscriber");
                return;
            }
            subscriber.spawn();
        });
    Ok(response)
}

// =============================================================================
// Stream listing
// =============================================================================

#[derive(Debug, Serialize)]
pub(crate) struct ListResponse {
    logs: Vec<coriolis_datastore::LogStream>,
}

pub(crate) async fn list_handler(
    State(state): State<AppState>,
    MaybeAuth(details): MaybeAuth,
) -> Result<Json<ListResponse>, ApiError> {
    if !can_access(state.auth.is_some(), details.as_ref()) {
        return Err(ApiError::admin_required());
    }

    let logs = state.store.list().await.map_err(|e| {
        error!(error = %e, "error listing logs");
        ApiError::Internal("error listing logs".into())
    })?;
    Ok(Json(ListResponse { logs }))
}

// =============================================================================
// Stream download
// =============================================================================

#[derive(Debug, Deserialize)]
pub(crate) struct DownloadQuery {
    severity: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    disable_chunked: Option<String>,
}

pub(crate) async fn download_handler(
    State(state): State<AppState>,
    MaybeAuth(details): MaybeAuth,
    Path(log): Path<String>,
    Query(params): Query<DownloadQuery>,
) -> Result<Response, ApiError> {
    if !can_access(state.auth.is_some(), details.as_ref()) {
        return Err(ApiError::admin_required());
    }
    if log.is_empty() {
        return Err(ApiError::bad_request("missing log name"));
    }

    let start_date = timestamp_to_time(params.start_date.as_deref()).map_err(|()| {
        ApiError::bad_request(format!(
            "invalid start date: {:?}",
            params.start_date.as_deref().unwrap_or_default()
        ))
    })?;
    let end_date = timestamp_to_time(params.end_date.as_deref()).map_err(|()| {
        ApiError::bad_request(format!(
            "invalid end date: {:?}",
            params.end_date.as_deref().unwrap_or_default()
        ))
    })?;

    // Only filter on severity when the client asked for it; a bare
    // download returns the full stream.
    let severity = params
        .severity
        .as_deref()
        .filter(|raw| !raw.is_empty())
        .map(|raw| get_severity(Some(raw)));

    let query = QueryParams {
        app_name: log.clone(),
        hostname: None,
        start_date,
        end_date,
        severity,
    };
    let reader = state.store.result_reader(query);

    if parse_bool_param(params.disable_chunked.as_deref()) {
        download_as_file(reader, &log).await
    } else {
        download_as_chunks(reader, &log).await
    }
}

fn download_headers(log: &str) -> Result<[(header::HeaderName, String); 2], ApiError> {
    if log.contains(['\r', '\n']) {
        return Err(ApiError::bad_request("invalid log name"));
    }
    Ok([
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename={log}"),
        ),
        (header::CONTENT_TYPE, "text/plain".to_string()),
    ])
}

/// Spool the whole stream into an anonymous temp file, then serve it with
/// an exact `Content-Length`. Some browsers mishandle chunked downloads;
/// the file is unlinked by the OS on every exit path.
async fn download_as_file(
    mut reader: Box<dyn RecordReader>,
    log: &str,
) -> Result<Response, ApiError> {
    let mut tmpfile = tempfile::tempfile().map_err(|e| {
        error!(error = %e, "error creating temp file");
        ApiError::Internal("error preparing download".into())
    })?;

    let mut size: u64 = 0;
    loop {
        let chunk = match reader.read_next().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "error reading log");
                return Err(ApiError::Internal("error reading log".into()));
            }
        };
        size += chunk.len() as u64;
        if let Err(e) = tmpfile.write_all(&chunk) {
            error!(error = %e, "error writing to temp file");
            return Err(ApiError::Internal("error preparing download".into()));
        }
    }

    use std::io::Seek;
    tmpfile.rewind().map_err(|e| {
        error!(error = %e, "error seeking log");
        ApiError::Internal("error preparing download".into())
    })?;

    let file = tokio::fs::File::from_std(tmpfile);
    let body = Body::from_stream(tokio_util::io::ReaderStream::new(file));

    let headers = download_headers(log)?;
    let mut response = (headers, body).into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_LENGTH, size.into());
    Ok(response)
}

/// Stream chunks straight through, no `Content-Length`. The first read
/// happens before the response starts so storage errors can still become
/// a 500; later errors truncate the body.
async fn download_as_chunks(
    mut reader: Box<dyn RecordReader>,
    log: &str,
) -> Result<Response, ApiError> {
    let first = reader.read_next().await.map_err(|e| {
        error!(error = %e, "error fetching logs");
        ApiError::Internal("error fetching logs".into())
    })?;

    let stream =
        futures_util::stream::unfold((reader, first), |(mut reader, pending)| async move {
            if let Some(chunk) = pending {
                return Some((Ok::<Bytes, std::io::Error>(chunk), (reader, None)));
            }
            match reader.read_next().await {
                Ok(Some(chunk)) => Some((Ok(chunk), (reader, None))),
                Ok(None) => None,
                Err(e) => {
                    error!(error = %e, "error fetching logs");
                    None
                }
            }
        });

    let headers = download_headers(log)?;
    Ok((headers, Body::from_stream(stream)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_defaults_and_clamps() {
        assert_eq!(get_severity(None), Severity::Informational);
        assert_eq!(get_severity(Some("")), Severity::Informational);
        assert_eq!(get_severity(Some("3")), Severity::Error);
        assert_eq!(get_severity(Some("0")), Severity::Emergency);
        // Out-of-range and malformed values fall back to the default.
        assert_eq!(get_severity(Some("8")), Severity::Informational);
        assert_eq!(get_severity(Some("-1")), Severity::Informational);
        assert_eq!(get_severity(Some("abc")), Severity::Informational);
    }

    #[test]
    fn timestamps_parse_unix_seconds() {
        assert_eq!(timestamp_to_time(None), Ok(None));
        assert_eq!(timestamp_to_time(Some("")), Ok(None));
        assert_eq!(
            timestamp_to_time(Some("1700000000")),
            Ok(Some(Utc.timestamp_opt(1_700_000_000, 0).unwrap()))
        );
        assert!(timestamp_to_time(Some("not-a-stamp")).is_err());
    }

    #[test]
    fn bool_params_are_permissive() {
        assert!(parse_bool_param(Some("true")));
        assert!(parse_bool_param(Some("1")));
        assert!(parse_bool_param(Some("T")));
        assert!(!parse_bool_param(Some("false")));
        assert!(!parse_bool_param(Some("yes")));
        assert!(!parse_bool_param(None));
    }

    #[test]
    fn origin_allow_list() {
        let mut headers = HeaderMap::new();

        // Empty list or missing Origin header always passes.
        assert!(origin_allowed(&[], &headers));
        assert!(origin_allowed(&["https://a".into()], &headers));

        headers.insert(header::ORIGIN, "https://a".parse().unwrap());
        assert!(origin_allowed(&["https://a".into()], &headers));
        assert!(!origin_allowed(&["https://b".into()], &headers));
        assert!(origin_allowed(&["*".into()], &headers));
    }

    #[test]
    fn download_headers_reject_header_injection() {
        assert!(download_headers("myapp").is_ok());
        assert!(download_headers("bad\r\nname").is_err());
    }
}
