//! HTTP client for the dashboard backend
//!
//! Uses a long-lived reqwest::Client for connection pooling.
//! No request timeout is imposed here; the backend owns that policy.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{error, info, warn};

use super::{AnalyzeRequest, Credentials, PortfolioBackend};
use crate::error::{AuthError, ChatError};
use crate::models::{Holding, ResponseModel};
use crate::Result;

/// Reusable backend client (connection-pooled)
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[derive(Debug, Deserialize)]
struct PortfolioResponse {
    #[serde(default)]
    data: Vec<Holding>,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
}

#[async_trait]
impl PortfolioBackend for HttpBackend {
    async fn get_holdings(&self) -> Result<Vec<Holding>> {
        let response = self
            .client
            .get(self.url("/api/portfolio"))
            .send()
            .await
            .map_err(|e| {
                error!("Portfolio request failed: {}", e);
                ChatError::Remote(e.to_string())
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            info!("Portfolio endpoint requires login");
            return Err(ChatError::AuthRequired);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Remote(error_detail(status, &body)));
        }

        let portfolio: PortfolioResponse = response
            .json()
            .await
            .map_err(|e| ChatError::MalformedResponse(format!("portfolio: {}", e)))?;

        info!("Loaded {} holdings", portfolio.data.len());
        Ok(portfolio.data)
    }

    async fn login(&self, credentials: &Credentials) -> std::result::Result<(), AuthError> {
        info!(username = %credentials.username, "Submitting brokerage login");

        let response = self
            .client
            .post(self.url("/api/auth/login"))
            .json(credentials)
            .send()
            .await
            .map_err(|e| {
                error!("Login request failed: {}", e);
                AuthError::Rejected(e.to_string())
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            warn!(status = %status, "Login rejected");
            return Err(AuthError::Rejected(error_detail(status, &body)));
        }

        let parsed: LoginResponse = serde_json::from_str(&body)
            .map_err(|e| AuthError::Rejected(format!("Unexpected login response: {}", e)))?;

        match parsed.status.as_str() {
            "success" => Ok(()),
            "mfa_required" => Err(AuthError::SecondFactorRequired(
                parsed
                    .message
                    .unwrap_or_else(|| "MFA code required".to_string()),
            )),
            other => Err(AuthError::Rejected(
                parsed
                    .message
                    .unwrap_or_else(|| format!("Login failed ({})", other)),
            )),
        }
    }

    async fn analyze(&self, request: &AnalyzeRequest) -> Result<ResponseModel> {
        info!(
            history_len = request.conversation_history.len(),
            holdings = request.portfolio_context.len(),
            "Calling analysis backend"
        );

        let response = self
            .client
            .post(self.url("/api/analyze"))
            .json(request)
            .send()
            .await
            .map_err(|e| {
                error!("Analysis request failed: {}", e);
                ChatError::Remote(e.to_string())
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            info!("Analysis endpoint requires login");
            return Err(ChatError::AuthRequired);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Analysis backend error response: {}", body);
            return Err(ChatError::Remote(error_detail(status, &body)));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ChatError::MalformedResponse(e.to_string()))?;

        ResponseModel::from_wire(payload)
    }
}

/// Best-effort human readable message from an error body
fn error_detail(status: StatusCode, body: &str) -> String {
    let from_json = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            ["detail", "message", "error"]
                .iter()
                .find_map(|key| v.get(*key).and_then(|d| d.as_str()).map(str::to_string))
        });

    match from_json {
        Some(detail) => detail,
        None if !body.trim().is_empty() => body.trim().to_string(),
        None => format!("HTTP {}", status),
    }
}
