//! Chat controller
//!
//! Ties the pieces together for one dashboard session: holdings context,
//! transcript, analysis runs, the login dialog and UI preferences.
//!
//! An `AuthRequired` from any backend call opens the login dialog; a query
//! that hit it is answered with a connect prompt rather than an error line.
//! A successful login refreshes holdings, which become the context for the
//! next query.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::auth::{ChallengeOutcome, CredentialChallenge};
use crate::backend::PortfolioBackend;
use crate::config::ClientConfig;
use crate::error::{ChallengeError, ChatError};
use crate::memory::ConversationSession;
use crate::models::{HoldingsSnapshot, ResponseModel};
use crate::orchestrator::{AnalysisOrchestrator, ProgressSnapshot};
use crate::preferences::{PreferenceStore, Theme};
use crate::Result;

/// Result of a holdings refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldingsStatus {
    Loaded(usize),
    /// The login dialog has been opened
    LoginRequired,
}

pub struct ChatController {
    backend: Arc<dyn PortfolioBackend>,
    orchestrator: AnalysisOrchestrator,
    session: ConversationSession,
    holdings: HoldingsSnapshot,
    challenge: Option<CredentialChallenge>,
    preferences: PreferenceStore,
}

impl ChatController {
    pub fn new(backend: Arc<dyn PortfolioBackend>, config: &ClientConfig) -> Result<Self> {
        let preferences = match &config.preferences_path {
            Some(path) => PreferenceStore::load(path)?,
            None => PreferenceStore::in_memory(),
        };

        Ok(Self::with_preferences(backend, config, preferences))
    }

    pub fn with_preferences(
        backend: Arc<dyn PortfolioBackend>,
        config: &ClientConfig,
        preferences: PreferenceStore,
    ) -> Self {
        let orchestrator = AnalysisOrchestrator::new(Arc::clone(&backend), config.orchestrator.clone());
        let session = ConversationSession::with_greeting();
        info!(session_id = %session.session_id, theme = preferences.theme().as_str(), "Chat session started");

        Self {
            backend,
            orchestrator,
            session,
            holdings: HoldingsSnapshot::empty(),
            challenge: None,
            preferences,
        }
    }

    pub fn session(&self) -> &ConversationSession {
        &self.session
    }

    pub fn holdings(&self) -> &HoldingsSnapshot {
        &self.holdings
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<ProgressSnapshot> {
        self.orchestrator.subscribe_progress()
    }

    pub fn theme(&self) -> Theme {
        self.preferences.theme()
    }

    pub fn toggle_theme(&mut self) -> Result<Theme> {
        self.preferences.toggle_theme()
    }

    /// Reload holdings; opens the login dialog when the backend wants a login.
    /// On any other failure the previous snapshot stays in place.
    pub async fn refresh_holdings(&mut self) -> Result<HoldingsStatus> {
        match self.backend.get_holdings().await {
            Ok(holdings) => {
                let count = holdings.len();
                self.holdings = HoldingsSnapshot::new(holdings);
                info!(count, context_hash = %self.holdings.context_hash, "Holdings refreshed");
                Ok(HoldingsStatus::Loaded(count))
            }
            Err(ChatError::AuthRequired) => {
                self.open_challenge();
                Ok(HoldingsStatus::LoginRequired)
            }
            Err(e) => {
                warn!("Holdings refresh failed: {}", e);
                Err(e)
            }
        }
    }

    /// Open the login dialog, reusing one that is already open
    pub fn open_challenge(&mut self) -> &CredentialChallenge {
        self.challenge.get_or_insert_with(|| {
            info!("Opening credential challenge");
            CredentialChallenge::new()
        })
    }

    pub fn challenge(&self) -> Option<&CredentialChallenge> {
        self.challenge.as_ref()
    }

    pub fn cancel_challenge(&mut self) {
        if let Some(challenge) = self.challenge.take() {
            challenge.cancel();
        }
    }

    /// Submit the open login dialog. On success the dialog is dropped and
    /// holdings are reloaded.
    pub async fn submit_challenge(&mut self) -> Result<HoldingsStatus> {
        let outcome = match &self.challenge {
            Some(challenge) => challenge.submit(self.backend.as_ref()).await?,
            None => return Err(ChallengeError::Closed.into()),
        };

        match outcome {
            ChallengeOutcome::RefreshHoldings => {
                self.challenge = None;
                self.refresh_holdings().await
            }
        }
    }

    /// Send a user query. Blank input is ignored.
    ///
    /// Failures are already reflected in the transcript when this returns;
    /// `AuthRequired` additionally opens the login dialog.
    pub async fn send(&mut self, query: &str) -> Result<Option<ResponseModel>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(None);
        }

        match self
            .orchestrator
            .run(&mut self.session, query, &self.holdings)
            .await
        {
            Ok(response) => Ok(Some(response)),
            Err(ChatError::AuthRequired) => {
                self.open_challenge();
                Err(ChatError::AuthRequired)
            }
            Err(e) => Err(e),
        }
    }
}
