//! Backend boundary
//!
//! The dashboard backend owns research, price targets, brokerage access and
//! credential checks. This core only talks to it through `PortfolioBackend`.

use crate::error::AuthError;
use crate::memory::HistoryEntry;
use crate::models::{Holding, ResponseModel};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod http;
pub use http::HttpBackend;

#[cfg(test)]
pub(crate) mod mock;

/// Login credentials for the brokerage connection
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    #[serde(rename = "mfa_code")]
    pub second_factor_code: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field(
                "second_factor_code",
                &self.second_factor_code.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Body of an analysis request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub query: String,
    pub portfolio_context: Vec<Holding>,
    pub conversation_history: Vec<HistoryEntry>,
}

/// Outbound calls this core issues
#[async_trait]
pub trait PortfolioBackend: Send + Sync {
    /// Current holdings. Fails with `ChatError::AuthRequired` when no
    /// brokerage session exists.
    async fn get_holdings(&self) -> Result<Vec<Holding>>;

    /// One credential check. No retries.
    async fn login(&self, credentials: &Credentials) -> std::result::Result<(), AuthError>;

    /// One analysis request. Failures surface as `ChatError::Remote`
    /// or `ChatError::MalformedResponse`.
    async fn analyze(&self, request: &AnalyzeRequest) -> Result<ResponseModel>;
}
