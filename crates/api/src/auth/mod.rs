//! Authentication for the API surface.
//!
//! The [`Authenticator`] trait validates a request's `X-Auth-Token`
//! header into an [`AuthDetails`] principal; [`KeystoneAuthenticator`] is
//! the production implementation. The middleware runs the authenticator
//! and stashes the principal in request extensions for the handlers'
//! admin check.

mod keystone;

pub use keystone::KeystoneAuthenticator;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::error;

use crate::AppState;

/// Header carrying the bearer token.
pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// An authenticated principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthDetails {
    pub user_id: String,
    pub is_admin: bool,
    /// Token expiry; live subscriptions are cut off at this instant.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Authentication failures; all of them surface as 403.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing token in headers")]
    MissingToken,

    #[error("authenticating token: {0}")]
    Validation(String),
}

/// Validates a request into a principal.
#[async_trait::async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, headers: &HeaderMap) -> Result<AuthDetails, AuthError>;
}

/// Run the configured authenticator and attach the principal. Only
/// layered onto the router when authentication is enabled.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(authenticator) = &state.auth else {
        return next.run(request).await;
    };

    match authenticator.authenticate(request.headers()).await {
        Ok(details) => {
            request.extensions_mut().insert(details);
            next.run(request).await
        }
        Err(e) => {
            let message = format!("Failed to authenticate: {e}");
            error!("{message}");
            (StatusCode::FORBIDDEN, message).into_response()
        }
    }
}

/// The principal attached by the middleware, if any. Never rejects: the
/// admin gate in the handlers decides what an absent principal means.
#[derive(Debug, Clone)]
pub struct MaybeAuth(pub Option<AuthDetails>);

impl<S> FromRequestParts<S> for MaybeAuth
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeAuth(parts.extensions.get::<AuthDetails>().cloned()))
    }
}

/// Admin gate used by every handler. With authentication disabled there
/// is no principal and access is anonymous.
pub fn can_access(auth_enabled: bool, details: Option<&AuthDetails>) -> bool {
    if !auth_enabled {
        return true;
    }
    details.is_some_and(|d| d.is_admin)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin() -> AuthDetails {
        AuthDetails {
            user_id: "u1".into(),
            is_admin: true,
            expires_at: None,
        }
    }

    #[test]
    fn anonymous_access_requires_disabled_auth() {
        assert!(can_access(false, None));
        assert!(!can_access(true, None));
    }

    #[test]
    fn admin_flag_is_enforced() {
        let mut details = admin();
        assert!(can_access(true, Some(&details)));
        details.is_admin = false;
        assert!(!can_access(true, Some(&details)));
    }
}
