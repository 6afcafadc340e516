//! Response rendering
//!
//! Turns a settled backend response into transcript content. Dispatch is on
//! the response tag only.

use crate::error::ChatError;
use crate::memory::MessageContent;
use crate::models::{HoldingsLookupResult, ResponseModel};

/// Shown in place of an error when the backend wants a brokerage login
pub const CONNECT_PROMPT: &str = "Please connect your brokerage account to continue.";

/// Stateless renderer for backend responses
pub struct ResponseRenderer;

impl ResponseRenderer {
    pub fn render(response: &ResponseModel) -> MessageContent {
        match response {
            ResponseModel::HoldingsLookup(holding) => {
                MessageContent::Text(render_holdings_summary(holding))
            }
            ResponseModel::Analysis(analysis) => {
                if analysis.ticker().is_some() {
                    MessageContent::Structured(Box::new(analysis.clone()))
                } else {
                    MessageContent::Text(analysis.synthesis.clone())
                }
            }
            ResponseModel::GeneralChat(chat) => MessageContent::Text(chat.synthesis.clone()),
        }
    }

    /// Transcript content for a failed run. A missing login is not an error
    /// from the user's point of view; the caller opens the login dialog.
    pub fn render_failure(error: &ChatError) -> MessageContent {
        match error {
            ChatError::AuthRequired => MessageContent::Text(CONNECT_PROMPT.to_string()),
            other => Self::render_error(&other.user_message()),
        }
    }

    /// Transcript text for a failed request
    pub fn render_error(message: &str) -> MessageContent {
        let message = if message.trim().is_empty() {
            "An unexpected error occurred."
        } else {
            message
        };
        MessageContent::Text(format!("Error: {}", message))
    }
}

fn render_holdings_summary(h: &HoldingsLookupResult) -> String {
    format!(
        "**{} ({}) Position:**\n- Shares: {}\n- Market Value: {}\n- Unrealized P&L: {} ({:.2}%)",
        h.company_name,
        h.ticker,
        h.shares_held,
        format_currency(h.total_value),
        format_currency(h.unrealized_pl_dollars),
        h.unrealized_pl_percent,
    )
}

/// `$1,234.56`, with the sign ahead of the currency symbol
fn format_currency(amount: f64) -> String {
    let fixed = format!("{:.2}", amount.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if amount < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{}${}.{}", sign, grouped, cents)
}
