//! Credential challenge flow
//!
//! State machine behind the brokerage login dialog:
//! IDLE → SUBMITTING → { SUCCEEDED | FAILED }, FAILED → SUBMITTING after edits.
//!
//! Second-factor field visibility is an orthogonal flag. It is flipped by the
//! user, or switched on when a rejection says a second factor is needed.

use std::sync::Mutex;
use tracing::{info, warn};

use crate::backend::{Credentials, PortfolioBackend};
use crate::error::{AuthError, ChallengeError, ChatError};
use crate::Result;

/// Legacy fallback for backends that only report the second-factor
/// requirement inside the error text (matched case-sensitively)
const SECOND_FACTOR_HINTS: &[&str] = &["MFA", "challenge"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengePhase {
    Idle,
    Submitting,
    Succeeded,
    Failed,
    /// Cancelled by the user
    Closed,
}

/// Fields and flags of the login dialog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeState {
    pub username: String,
    pub password: String,
    pub second_factor_code: Option<String>,
    pub second_factor_visible: bool,
    pub last_error: Option<String>,
    pub in_flight: bool,
    pub phase: ChallengePhase,
}

impl ChallengeState {
    fn new() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            second_factor_code: None,
            second_factor_visible: false,
            last_error: None,
            in_flight: false,
            phase: ChallengePhase::Idle,
        }
    }

    fn is_finished(&self) -> bool {
        matches!(self.phase, ChallengePhase::Succeeded | ChallengePhase::Closed)
    }

    fn clear_credentials(&mut self) {
        self.username.clear();
        self.password.clear();
        self.second_factor_code = None;
    }
}

/// What the caller should do after a successful challenge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeOutcome {
    /// Session is authenticated; holdings-dependent context must be reloaded
    RefreshHoldings,
}

/// One open login dialog.
///
/// Methods take `&self` so the dialog can be edited while a submission is
/// awaiting the backend; the lock is never held across that await.
pub struct CredentialChallenge {
    state: Mutex<ChallengeState>,
}

impl CredentialChallenge {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ChallengeState::new()),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut ChallengeState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    fn edit(&self, f: impl FnOnce(&mut ChallengeState)) -> std::result::Result<(), ChallengeError> {
        self.with_state(|state| {
            if state.is_finished() {
                return Err(ChallengeError::Closed);
            }
            f(state);
            Ok(())
        })
    }

    /// Copy of the current dialog state
    pub fn snapshot(&self) -> ChallengeState {
        self.with_state(|state| state.clone())
    }

    pub fn phase(&self) -> ChallengePhase {
        self.with_state(|state| state.phase)
    }

    pub fn second_factor_visible(&self) -> bool {
        self.with_state(|state| state.second_factor_visible)
    }

    pub fn last_error(&self) -> Option<String> {
        self.with_state(|state| state.last_error.clone())
    }

    pub fn set_username(&self, username: impl Into<String>) -> std::result::Result<(), ChallengeError> {
        let username = username.into();
        self.edit(|state| state.username = username)
    }

    pub fn set_password(&self, password: impl Into<String>) -> std::result::Result<(), ChallengeError> {
        let password = password.into();
        self.edit(|state| state.password = password)
    }

    /// Blank codes are treated as no code
    pub fn set_second_factor_code(&self, code: impl Into<String>) -> std::result::Result<(), ChallengeError> {
        let code = code.into();
        self.edit(|state| {
            state.second_factor_code = Some(code.trim().to_string()).filter(|c| !c.is_empty());
        })
    }

    /// Show or hide the second-factor field
    pub fn toggle_second_factor(&self) -> bool {
        self.with_state(|state| {
            state.second_factor_visible = !state.second_factor_visible;
            state.second_factor_visible
        })
    }

    /// Close the dialog without logging in. Entered credentials are dropped.
    pub fn cancel(&self) {
        self.with_state(|state| {
            state.clear_credentials();
            state.phase = ChallengePhase::Closed;
        });
        info!("Credential challenge cancelled");
    }

    /// Submit the entered credentials. Exactly one backend call per submission;
    /// a second submission while one is outstanding is rejected.
    pub async fn submit(&self, backend: &dyn PortfolioBackend) -> Result<ChallengeOutcome> {
        let credentials = self.with_state(|state| {
            if state.is_finished() {
                return Err(ChallengeError::Closed);
            }
            if state.in_flight {
                return Err(ChallengeError::InFlight);
            }
            state.in_flight = true;
            state.phase = ChallengePhase::Submitting;
            state.last_error = None;

            Ok(Credentials {
                username: state.username.clone(),
                password: state.password.clone(),
                second_factor_code: state.second_factor_code.clone(),
            })
        })?;

        let result = backend.login(&credentials).await;

        self.with_state(|state| {
            state.in_flight = false;

            // Cancelled while the request was outstanding
            if state.phase == ChallengePhase::Closed {
                return Err(ChallengeError::Closed.into());
            }

            match result {
                Ok(()) => {
                    info!(username = %credentials.username, "Brokerage login succeeded");
                    state.clear_credentials();
                    state.last_error = None;
                    state.phase = ChallengePhase::Succeeded;
                    Ok(ChallengeOutcome::RefreshHoldings)
                }
                Err(error) => {
                    warn!(username = %credentials.username, "Brokerage login rejected: {}", error);
                    if needs_second_factor(&error) {
                        state.second_factor_visible = true;
                    }
                    state.last_error = Some(error.message().to_string());
                    state.clear_credentials();
                    state.phase = ChallengePhase::Failed;
                    Err(ChatError::Auth(error))
                }
            }
        })
    }
}

impl Default for CredentialChallenge {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether a rejection asks for a second factor
fn needs_second_factor(error: &AuthError) -> bool {
    match error {
        AuthError::SecondFactorRequired(_) => true,
        AuthError::Rejected(message) => SECOND_FACTOR_HINTS.iter().any(|hint| message.contains(hint)),
    }
}
