//! Scripted backend for unit tests

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{AnalyzeRequest, Credentials, PortfolioBackend};
use crate::error::{AuthError, ChatError};
use crate::models::{Holding, ResponseModel};
use crate::Result;

#[derive(Default)]
pub(crate) struct MockBackend {
    /// `None` means the brokerage session is not authenticated
    holdings: Mutex<Option<Vec<Holding>>>,
    logins: Mutex<VecDeque<std::result::Result<(), AuthError>>>,
    analyses: Mutex<VecDeque<Result<ResponseModel>>>,
    latency: Duration,
    pub login_calls: AtomicUsize,
    pub analyze_calls: AtomicUsize,
    pub holdings_calls: AtomicUsize,
    pub credentials_seen: Mutex<Vec<Credentials>>,
    pub requests: Mutex<Vec<AnalyzeRequest>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn set_holdings(&self, holdings: Option<Vec<Holding>>) {
        *self.holdings.lock().unwrap() = holdings;
    }

    pub fn push_login(&self, outcome: std::result::Result<(), AuthError>) {
        self.logins.lock().unwrap().push_back(outcome);
    }

    /// Queue an analysis outcome; an `Err` message becomes `ChatError::Remote`
    pub fn push_analysis(&self, outcome: std::result::Result<ResponseModel, String>) {
        self.push_analysis_result(outcome.map_err(ChatError::Remote));
    }

    pub fn push_analysis_result(&self, outcome: Result<ResponseModel>) {
        self.analyses.lock().unwrap().push_back(outcome);
    }

    async fn wait(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl PortfolioBackend for MockBackend {
    async fn get_holdings(&self) -> Result<Vec<Holding>> {
        self.holdings_calls.fetch_add(1, Ordering::SeqCst);
        self.holdings
            .lock()
            .unwrap()
            .clone()
            .ok_or(ChatError::AuthRequired)
    }

    async fn login(&self, credentials: &Credentials) -> std::result::Result<(), AuthError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        self.credentials_seen.lock().unwrap().push(credentials.clone());
        self.wait().await;
        self.logins
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AuthError::Rejected("no scripted login".to_string())))
    }

    async fn analyze(&self, request: &AnalyzeRequest) -> Result<ResponseModel> {
        self.analyze_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        self.wait().await;
        self.analyses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ChatError::Remote("no scripted analysis".to_string())))
    }
}
