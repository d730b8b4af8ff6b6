use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use bytes::Bytes;
use tower::ServiceExt;

use coriolis_datastore::{DataStore, DatastoreError, LogStream, QueryParams, RecordReader};
use coriolis_hub::Hub;
use tokio_util::sync::CancellationToken;

use crate::auth::{AuthDetails, AuthError, Authenticator, AUTH_TOKEN_HEADER};

use super::*;

struct StubReader {
    chunks: Vec<Bytes>,
    fail: bool,
}

#[async_trait::async_trait]
impl RecordReader for StubReader {
    async fn read_next(&mut self) -> coriolis_datastore::Result<Option<Bytes>> {
        if self.fail {
            return Err(DatastoreError::Query("backend exploded".into()));
        }
        if self.chunks.is_empty() {
            Ok(None)
        } else {
            Ok(Some(self.chunks.remove(0)))
        }
    }
}

struct StubStore {
    fail_reads: bool,
}

#[async_trait::async_trait]
impl DataStore for StubStore {
    async fn list(&self) -> coriolis_datastore::Result<Vec<LogStream>> {
        Ok(vec![LogStream {
            log_name: "myapp".into(),
        }])
    }

    fn result_reader(&self, params: QueryParams) -> Box<dyn RecordReader> {
        assert_eq!(params.app_name, "myapp");
        Box::new(StubReader {
            chunks: vec![Bytes::from_static(b"one\n"), Bytes::from_static(b"two\n")],
            fail: self.fail_reads,
        })
    }
}

/// Token-table authenticator: `admin-token` is an admin, `user-token` is
/// not, anything else is rejected.
struct StubAuthenticator;

#[async_trait::async_trait]
impl Authenticator for StubAuthenticator {
    async fn authenticate(
        &self,
        headers: &axum::http::HeaderMap,
    ) -> Result<AuthDetails, AuthError> {
        let token = headers
            .get(AUTH_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or(AuthError::MissingToken)?;
        match token {
            "admin-token" => Ok(AuthDetails {
                user_id: "admin".into(),
                is_admin: true,
                expires_at: None,
            }),
            "user-token" => Ok(AuthDetails {
                user_id: "user".into(),
                is_admin: false,
                expires_at: None,
            }),
            _ => Err(AuthError::Validation("unknown token".into())),
        }
    }
}

fn router_with_auth(fail_reads: bool) -> axum::Router {
    let (hub, _task) = Hub::spawn(CancellationToken::new());
    let state = AppState::new(
        hub,
        Arc::new(StubStore { fail_reads }),
        Some(Arc::new(StubAuthenticator)),
        Vec::new(),
    );
    build_router(state)
}

fn router_without_auth() -> axum::Router {
    let (hub, _task) = Hub::spawn(CancellationToken::new());
    let state = AppState::new(hub, Arc::new(StubStore { fail_reads: false }), None, Vec::new());
    build_router(state)
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header(AUTH_TOKEN_HEADER, token);
    }
    builder.body(Body::empty()).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Bytes {
    axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap()
}

#[tokio::test]
async fn list_requires_a_token() {
    let response = router_with_auth(false)
        .oneshot(get("/api/v1/logs", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn list_rejects_non_admin_principals() {
    let response = router_with_auth(false)
        .oneshot(get("/api/v1/logs", Some("user-token")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn list_returns_streams_for_admins() {
    let response = router_with_auth(false)
        .oneshot(get("/api/v1/logs", Some("admin-token")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_bytes(response).await;
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json, serde_json::json!({"logs": [{"log_name": "myapp"}]}));
}

#[tokio::test]
async fn trailing_slashes_are_tolerated() {
    let response = router_with_auth(false)
        .oneshot(get("/api/v1/logs/", Some("admin-token")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn disabled_auth_allows_anonymous_access() {
    let response = router_without_auth()
        .oneshot(get("/api/v1/logs", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn bulk_download_carries_a_content_length() {
    let response = router_with_auth(false)
        .oneshot(get(
            "/api/v1/logs/myapp?disable_chunked=true",
            Some("admin-token"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(axum::http::header::CONTENT_DISPOSITION)
            .unwrap(),
        "attachment; filename=myapp"
    );
    assert_eq!(
        response
            .headers()
            .get(axum::http::header::CONTENT_LENGTH)
            .unwrap(),
        "8"
    );

    let body = body_bytes(response).await;
    assert_eq!(&body[..], b"one\ntwo\n");
}

#[tokio::test]
async fn chunked_download_streams_without_content_length() {
    let response = router_with_auth(false)
        .oneshot(get("/api/v1/logs/myapp", Some("admin-token")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get(axum::http::header::CONTENT_LENGTH)
        .is_none());

    let body = body_bytes(response).await;
    assert_eq!(&body[..], b"one\ntwo\n");
}

#[tokio::test]
async fn malformed_dates_are_rejected() {
    let response = router_with_auth(false)
        .oneshot(get(
            "/api/v1/logs/myapp?start_date=tomorrow",
            Some("admin-token"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn storage_errors_become_500s() {
    let response = router_with_auth(true)
        .oneshot(get("/api/v1/logs/myapp", Some("admin-token")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

/// A well-formed WebSocket handshake request.
fn ws_handshake(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .uri(uri)
        .header("connection", "upgrade")
        .header("upgrade", "websocket")
        .header("sec-websocket-version", "13")
        .header("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==");
    if let Some(token) = token {
        builder = builder.header(AUTH_TOKEN_HEADER, token);
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn ws_upgrade_requires_a_token() {
    let response = router_with_auth(false)
        .oneshot(ws_handshake("/api/v1/ws", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn ws_upgrade_rejects_non_admin_principals() {
    let response = router_with_auth(false)
        .oneshot(ws_handshake("/api/v1/ws", Some("user-token")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn ws_upgrade_enforces_the_origin_allow_list() {
    let (hub, _task) = Hub::spawn(CancellationToken::new());
    let state = AppState::new(
        hub,
        Arc::new(StubStore { fail_reads: false }),
        None,
        vec!["https://allowed.example.com".into()],
    );
    let router = build_router(state);

    let mut request = ws_handshake("/api/v1/ws", None);
    request.headers_mut().insert(
        axum::http::header::ORIGIN,
        "https://evil.example.com".parse().unwrap(),
    );
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
