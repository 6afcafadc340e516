//! Conversation Memory
//!
//! In-process transcript for one chat session and the bounded history
//! derived from it. Nothing here outlives the process.

pub mod history;
pub mod transcript;

pub use history::{HistoryConfig, HistoryEntry};
pub use transcript::{ConversationSession, Message, MessageContent, MessageId, MessageRole};
