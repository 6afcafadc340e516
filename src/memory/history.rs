//! Prior-turn history sent with each analysis request
//!
//! Every prior turn is reduced to its role and a short summary so the
//! request stays bounded no matter how long the session runs.

use serde::{Deserialize, Serialize};

use crate::memory::transcript::{ConversationSession, Message, MessageContent, MessageRole};

/// Configuration for history serialization
#[derive(Debug, Clone)]
pub struct HistoryConfig {
    /// Number of most recent turns included in a request
    pub max_turns: usize,
    /// Character cap for a single text turn
    pub max_chars_per_turn: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_turns: 20,
            max_chars_per_turn: 1_000,
        }
    }
}

/// Wire shape of one prior turn
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    pub role: MessageRole,
    pub content: String,
}

impl HistoryConfig {
    /// Summarize the session's resolved turns, oldest first.
    ///
    /// Pending turns carry nothing yet and are skipped.
    pub fn summarize(&self, session: &ConversationSession) -> Vec<HistoryEntry> {
        let mut entries: Vec<HistoryEntry> = session
            .messages()
            .rev()
            .filter_map(|m| self.summarize_message(m))
            .take(self.max_turns)
            .collect();

        entries.reverse();
        entries
    }

    fn summarize_message(&self, message: &Message) -> Option<HistoryEntry> {
        let content = match message.content()? {
            MessageContent::Text(text) => truncate_chars(text, self.max_chars_per_turn),
            // Analysis cards are referenced by ticker, never sent back in full
            MessageContent::Structured(analysis) => match analysis.ticker() {
                Some(ticker) => format!("Analysis for {}", ticker),
                None => truncate_chars(&analysis.synthesis, self.max_chars_per_turn),
            },
        };

        Some(HistoryEntry {
            role: message.role,
            content,
        })
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
