//! Error types for the portfolio chat core

use crate::memory::MessageId;
use thiserror::Error;

/// Result type alias for chat core operations
pub type Result<T> = std::result::Result<T, ChatError>;

#[derive(Error, Debug)]
pub enum ChatError {

    // =============================
    // Backend Boundary Errors
    // =============================

    /// The backend needs an authenticated brokerage session.
    /// Recovered by opening the credential challenge; the transcript only gets a connect prompt.
    #[error("Authentication required")]
    AuthRequired,

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Remote error: {0}")]
    Remote(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    // =============================
    // Core Contract Errors
    // =============================

    #[error("Message not found or already resolved: {0}")]
    NotFound(MessageId),

    #[error("An analysis request is already in flight")]
    Busy,

    #[error("Credential challenge error: {0}")]
    Challenge(#[from] ChallengeError),

    #[error("Configuration error: {0}")]
    Config(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ChatError {
    /// Text shown to the user when a pending turn is resolved with this failure.
    pub fn user_message(&self) -> String {
        match self {
            ChatError::Remote(message) | ChatError::MalformedResponse(message) => message.clone(),
            ChatError::HttpError(e) => e.to_string(),
            other => other.to_string(),
        }
    }
}

/// Rejection of a credential challenge submission.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Wrong credentials or any other rejection, carrying the backend's message.
    #[error("{0}")]
    Rejected(String),

    /// Credentials accepted so far, but a second factor is needed.
    #[error("{0}")]
    SecondFactorRequired(String),
}

impl AuthError {
    pub fn message(&self) -> &str {
        match self {
            AuthError::Rejected(message) | AuthError::SecondFactorRequired(message) => message,
        }
    }
}

/// Misuse of the credential challenge state machine.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeError {
    #[error("a submission is already in flight")]
    InFlight,

    #[error("the challenge is closed")]
    Closed,
}
