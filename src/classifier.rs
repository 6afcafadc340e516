//! Query Classifier
//!
//! Classifies user queries into one of three intents:
//! - Holdings: a question about a position the user actually holds ("how many AAPL shares do I own?")
//! - Analysis: a request for a research call ("analyze NVDA", "should I sell TSLA?")
//! - General: everything else, answered as plain chat

use crate::models::Holding;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryIntent {
    Holdings,
    Analysis,
    General,
}

/// Static keyword lists, zero allocation
const HOLDINGS_KEYWORDS: &[&str] = &[
    // Positions
    "position", "holding", "shares", "own",
    // Cost basis
    "avg cost", "average cost",
    // Quotes and P&L
    "price of", "my pl", "my p&l",
];

const ANALYSIS_KEYWORDS: &[&str] = &[
    // Research
    "analyze", "outlook", "forecast", "target",
    // Decisions
    "should i", "buy", "sell", "recommendation",
    // Sentiment
    "bullish", "bearish",
];

/// Query classifier
pub struct QueryClassifier;

impl QueryClassifier {
    /// Classify a query against the user's current holdings.
    ///
    /// Rules apply in order and the first match wins. The holdings rule needs
    /// both a holdings keyword and a held symbol, so "should I sell my AAPL
    /// shares" is a holdings lookup when AAPL is held, while "should I sell
    /// AAPL" is an analysis request.
    pub fn classify(query: &str, holdings: &[Holding]) -> QueryIntent {
        let lower = query.to_lowercase();

        if contains_any(&lower, HOLDINGS_KEYWORDS) && mentions_held_symbol(query, holdings) {
            QueryIntent::Holdings
        } else if contains_any(&lower, ANALYSIS_KEYWORDS) {
            QueryIntent::Analysis
        } else {
            QueryIntent::General
        }
    }
}

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|kw| text.contains(kw))
}

/// Literal substring match of any held symbol in the uppercased query
fn mentions_held_symbol(query: &str, holdings: &[Holding]) -> bool {
    let upper = query.to_uppercase();
    holdings
        .iter()
        .map(|h| h.symbol.trim())
        // an empty symbol would match every query
        .filter(|symbol| !symbol.is_empty())
        .any(|symbol| upper.contains(symbol))
}

impl fmt::Display for QueryIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QueryIntent::Holdings => "holdings",
            QueryIntent::Analysis => "analysis",
            QueryIntent::General => "general",
        };
        write!(f, "{}", s)
    }
}
