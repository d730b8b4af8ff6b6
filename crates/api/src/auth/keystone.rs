//! Keystone token validation.
//!
//! Validates the `X-Auth-Token` header against a Keystone v3 endpoint
//! (`GET <auth_uri>/auth/tokens` with the token as both subject and
//! credential). A principal is admin when any of its roles is named
//! `admin`.

use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use super::{AuthDetails, AuthError, Authenticator, AUTH_TOKEN_HEADER};

const ADMIN_ROLE_NAME: &str = "admin";

/// Authenticator backed by a Keystone identity service.
pub struct KeystoneAuthenticator {
    http: reqwest::Client,
    tokens_url: String,
}

impl KeystoneAuthenticator {
    pub fn new(auth_uri: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            tokens_url: format!("{}/auth/tokens", auth_uri.trim_end_matches('/')),
        }
    }
}

#[async_trait::async_trait]
impl Authenticator for KeystoneAuthenticator {
    async fn authenticate(&self, headers: &HeaderMap) -> Result<AuthDetails, AuthError> {
        let token = headers
            .get(AUTH_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MissingToken)?;

        let response = self
            .http
            .get(&self.tokens_url)
            .header("X-Auth-Token", token)
            .header("X-Subject-Token", token)
            .send()
            .await
            .map_err(|e| AuthError::Validation(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::Validation(format!(
                "keystone returned {}",
                response.status()
            )));
        }

        let body: TokenDocument = response
            .json()
            .await
            .map_err(|e| AuthError::Validation(e.to_string()))?;

        let details = body.token.into_details();
        debug!(user = %details.user_id, admin = details.is_admin, "token validated");
        Ok(details)
    }
}

#[derive(Debug, Deserialize)]
struct TokenDocument {
    token: Token,
}

#[derive(Debug, Deserialize)]
struct Token {
    #[serde(default)]
    expires_at: Option<String>,
    #[serde(default)]
    roles: Vec<Role>,
    #[serde(default)]
    user: Option<User>,
}

#[derive(Debug, Deserialize)]
struct Role {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct User {
    #[serde(default)]
    id: String,
}

impl Token {
    fn into_details(self) -> AuthDetails {
        let is_admin = self.roles.iter().any(|role| role.name == ADMIN_ROLE_NAME);
        let expires_at = self
            .expires_at
            .as_deref()
            .and_then(|stamp| DateTime::parse_from_rfc3339(stamp).ok())
            .map(|ts| ts.with_timezone(&Utc));
        AuthDetails {
            user_id: self.user.map(|u| u.id).unwrap_or_default(),
            is_admin,
            expires_at,
        }
    }
}
