//! Conversation transcript
//!
//! Ordered, append-only record of user and assistant turns for one session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, error};
use uuid::Uuid;

use crate::error::ChatError;
use crate::models::AnalysisResult;
use crate::Result;

/// Greeting shown as the first assistant turn of a fresh session
pub const GREETING: &str = "Hello! I'm your AI Investment Analyst. I can analyze stocks with technical, fundamental, and sentiment data. Try asking 'Analyze AAPL' or 'What's going on with my portfolio?'";

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// Monotonic per-session message identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Final content of a turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MessageContent {
    /// Markdown-capable text
    Text(String),
    /// Structured analysis card
    Structured(Box<AnalysisResult>),
}

/// A single turn in the transcript
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub role: MessageRole,
    pub created_at: DateTime<Utc>,
    /// `None` only while an assistant turn is pending
    content: Option<MessageContent>,
}

impl Message {
    pub fn content(&self) -> Option<&MessageContent> {
        self.content.as_ref()
    }

    pub fn text(&self) -> Option<&str> {
        match &self.content {
            Some(MessageContent::Text(text)) => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn structured_result(&self) -> Option<&AnalysisResult> {
        match &self.content {
            Some(MessageContent::Structured(result)) => Some(result.as_ref()),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.content.is_none()
    }
}

/// Transcript for a single chat session
#[derive(Debug, Clone)]
pub struct ConversationSession {
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    messages: Vec<Message>,
    next_id: u64,
}

impl ConversationSession {
    /// Create an empty session
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            created_at: Utc::now(),
            messages: Vec::new(),
            next_id: 1,
        }
    }

    /// Create a session opened by the assistant's greeting
    pub fn with_greeting() -> Self {
        let mut session = Self::new();
        session.push(MessageRole::Assistant, Some(MessageContent::Text(GREETING.to_string())));
        session
    }

    fn push(&mut self, role: MessageRole, content: Option<MessageContent>) -> MessageId {
        let id = MessageId(self.next_id);
        self.next_id += 1;
        self.messages.push(Message {
            id,
            role,
            created_at: Utc::now(),
            content,
        });
        id
    }

    /// Append a user turn
    pub fn append_user_turn(&mut self, text: impl Into<String>) -> MessageId {
        let id = self.push(MessageRole::User, Some(MessageContent::Text(text.into())));
        debug!(session_id = %self.session_id, message_id = %id, "User turn appended");
        id
    }

    /// Reserve the transcript slot for an assistant reply whose content
    /// is not known yet
    pub fn append_pending_assistant_turn(&mut self) -> MessageId {
        let id = self.push(MessageRole::Assistant, None);
        debug!(session_id = %self.session_id, message_id = %id, "Pending assistant turn reserved");
        id
    }

    /// Fill in a pending assistant turn. Each pending turn resolves at most once.
    pub fn resolve_assistant_turn(&mut self, id: MessageId, content: MessageContent) -> Result<()> {
        let message = self
            .messages
            .iter_mut()
            .find(|m| m.id == id && m.role == MessageRole::Assistant && m.content.is_none())
            .ok_or(ChatError::NotFound(id))?;

        message.content = Some(content);
        debug!(session_id = %self.session_id, message_id = %id, "Assistant turn resolved");
        Ok(())
    }

    /// Resolve a turn the caller itself reserved. A failure here is a broken
    /// internal contract: fatal in debug builds, logged and ignored in release.
    pub(crate) fn resolve_or_log(&mut self, id: MessageId, content: MessageContent) {
        if let Err(e) = self.resolve_assistant_turn(id, content) {
            error!(session_id = %self.session_id, "Transcript contract violated: {}", e);
            debug_assert!(false, "transcript contract violated: {}", e);
        }
    }

    /// Iterate over all messages in append order
    pub fn messages(&self) -> impl DoubleEndedIterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn pending_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_pending()).count()
    }
}

impl Default for ConversationSession {
    fn default() -> Self {
        Self::new()
    }
}
