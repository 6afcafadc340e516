//! Portfolio Chat Core
//!
//! Client-side conversational core of an investment dashboard:
//! - Classifies free-text queries as holdings lookups, analysis requests or general chat
//! - Runs each query against the remote analysis backend, one at a time
//! - Shows cosmetic multi-stage progress while an analysis is in flight
//! - Keeps the ordered chat transcript and renders each response shape
//! - Drives the brokerage login dialog, including the second-factor retry
//!
//! QUERY LOOP:
//! INPUT → CLASSIFY → RESERVE TURN → ANALYZE (+ PROGRESS) → RENDER → RESOLVE TURN

pub mod auth;
pub mod backend;
pub mod classifier;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod memory;
pub mod models;
pub mod orchestrator;
pub mod preferences;
pub mod render;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use classifier::{QueryClassifier, QueryIntent};
pub use dashboard::{ChatController, HoldingsStatus};
pub use error::{AuthError, ChatError};
