//! Remote auth API.
//!
//! `AuthBackend` is the seam the session store calls through; the HTTP
//! implementation posts JSON to `{base}/login` and `{base}/users`.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::ApiError;
use crate::models::User;

/// Role given to every account created through signup
pub const DEFAULT_ROLE: &str = "user";

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Account creation payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Exchange an identifier and secret for the user's record
    async fn login_user(&self, identifier: &str, secret: &str) -> Result<User>;

    /// Create an account. Success carries no session.
    async fn create_user(&self, user: NewUser) -> Result<()>;
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// Login replies are either the user itself or `{ "user": {...} }`
#[derive(Deserialize)]
#[serde(untagged)]
enum LoginResponse {
    Wrapped { user: User },
    Bare(User),
}

impl LoginResponse {
    fn into_user(self) -> User {
        match self {
            LoginResponse::Wrapped { user } => user,
            LoginResponse::Bare(user) => user,
        }
    }
}

/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpAuthBackend {
    client: Client,
    base_url: String,
}

impl HttpAuthBackend {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_response_body(status, &body).into())
        }
    }
}

#[async_trait]
impl AuthBackend for HttpAuthBackend {
    async fn login_user(&self, identifier: &str, secret: &str) -> Result<User> {
        let url = self.url("login");
        debug!(url = %url, identifier, "Sending login request");

        let response = self
            .client
            .post(&url)
            .header(header::ACCEPT, "application/json")
            .json(&LoginRequest {
                email: identifier,
                password: secret,
            })
            .send()
            .await
            .map_err(ApiError::from)?;

        let response = Self::check_response(response).await?;
        let parsed: LoginResponse = response.json().await.context("Failed to parse login response")?;
        Ok(parsed.into_user())
    }

    async fn create_user(&self, user: NewUser) -> Result<()> {
        let url = self.url("users");
        debug!(url = %url, email = %user.email, role = %user.role, "Sending create-user request");

        let response = self
            .client
            .post(&url)
            .header(header::ACCEPT, "application/json")
            .json(&user)
            .send()
            .await
            .map_err(ApiError::from)?;

        Self::check_response(response).await?;
        Ok(())
    }
}
