//! Identity gate: every protected request carries `Authorization: Bearer <token>`,
//! verified against the external identity service on each request. Nothing is
//! cached between requests.

use std::time::Duration;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;

const IDENTITY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("missing bearer token")]
    MissingToken,

    #[error("token rejected by identity service")]
    InvalidToken,

    #[error("identity service call failed: {0}")]
    Oracle(String),
}

/// The verified caller. Handlers take this as an extractor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

#[async_trait]
pub trait IdentityOracle: Send + Sync {
    async fn verify(&self, token: &str) -> Result<AuthUser, IdentityError>;
}

/// Supabase-style identity service: `GET {base}/auth/v1/user`.
pub struct SupabaseIdentity {
    client: Client,
    user_url: String,
    api_key: String,
}

impl SupabaseIdentity {
    pub fn new(base_url: &str, api_key: String) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().timeout(IDENTITY_TIMEOUT).build()?,
            user_url: format!("{}/auth/v1/user", base_url.trim_end_matches('/')),
            api_key,
        })
    }
}

#[async_trait]
impl IdentityOracle for SupabaseIdentity {
    async fn verify(&self, token: &str) -> Result<AuthUser, IdentityError> {
        let response = self
            .client
            .get(&self.user_url)
            .header("apikey", &self.api_key)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| IdentityError::Oracle(e.to_string()))?;

        match response.status() {
            status if status.is_success() => {
                let user: AuthUser = response
                    .json()
                    .await
                    .map_err(|e| IdentityError::Oracle(format!("bad user payload: {e}")))?;
                debug!(
                    "Authenticated user {} ({})",
                    user.id,
                    user.email.as_deref().unwrap_or("no email")
                );
                Ok(user)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
                Err(IdentityError::InvalidToken)
            }
            status => {
                warn!("Identity service returned {status}");
                Err(IdentityError::Oracle(format!("unexpected status {status}")))
            }
        }
    }
}

/// Returns the token of an `Authorization: Bearer <token>` header, if any.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        let token = bearer_token(&parts.headers).ok_or(IdentityError::MissingToken)?;
        Ok(state.identity.verify(token).await?)
    }
}
