//! Core data models for the portfolio chat core

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

use crate::error::ChatError;
use crate::Result;

//
// ================= Enums =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Recommendation {
    Buy,
    Sell,
    /// Hold and anything the backend sends that is not a clear buy/sell call.
    #[default]
    Hold,
}

impl Recommendation {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "BUY" => Recommendation::Buy,
            "SELL" => Recommendation::Sell,
            _ => Recommendation::Hold,
        }
    }
}

fn deserialize_recommendation<'de, D>(deserializer: D) -> std::result::Result<Recommendation, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().map(Recommendation::parse).unwrap_or_default())
}

//
// ================= Holdings =================
//

/// A brokerage position, as supplied by the portfolio endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Holding {
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub quantity: f64,
    #[serde(default)]
    pub value: f64,
    /// Percent change
    #[serde(default)]
    pub change: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_buy_price: Option<f64>,
}

/// Point-in-time, read-only view of the user's holdings.
///
/// Replaced wholesale on refresh; never mutated in place.
#[derive(Debug, Clone)]
pub struct HoldingsSnapshot {
    holdings: Arc<[Holding]>,
    pub taken_at: DateTime<Utc>,
    pub context_hash: String,
}

impl HoldingsSnapshot {
    pub fn new(holdings: Vec<Holding>) -> Self {
        let context_hash = compute_holdings_hash(&holdings);
        Self {
            holdings: holdings.into(),
            taken_at: Utc::now(),
            context_hash,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn holdings(&self) -> &[Holding] {
        &self.holdings
    }

    pub fn is_empty(&self) -> bool {
        self.holdings.is_empty()
    }

    pub fn total_value(&self) -> f64 {
        self.holdings.iter().map(|h| h.value).sum()
    }
}

impl Default for HoldingsSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

/// Stable fingerprint of a holdings list, logged alongside each analysis run
fn compute_holdings_hash(holdings: &[Holding]) -> String {
    let mut hasher = Sha256::new();
    for holding in holdings {
        hasher.update(holding.symbol.as_bytes());
        hasher.update(holding.quantity.to_le_bytes());
        hasher.update(holding.price.to_le_bytes());
    }
    hex::encode(hasher.finalize())
}

//
// ================= Responses =================
//

/// Response shapes the analysis backend may return.
///
/// The variant comes from the explicit `response_type` discriminant on the
/// wire; it is never inferred from which fields happen to be present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "response_type")]
pub enum ResponseModel {
    #[serde(rename = "analysis")]
    Analysis(AnalysisResult),
    #[serde(rename = "holdings_lookup")]
    HoldingsLookup(HoldingsLookupResult),
    #[serde(rename = "general")]
    GeneralChat(GeneralChatResult),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AnalysisResult {
    #[serde(default)]
    pub ticker: Option<String>,
    #[serde(default)]
    pub stock_info: Option<StockInfo>,
    #[serde(default, deserialize_with = "deserialize_recommendation")]
    pub recommendation: Recommendation,
    #[serde(default)]
    pub confidence: Option<String>,
    #[serde(default)]
    pub price_target: Option<String>,
    pub synthesis: String,
    #[serde(default)]
    pub technical_report: Option<String>,
    #[serde(default)]
    pub fundamental_report: Option<String>,
    #[serde(default)]
    pub sentiment_report: Option<String>,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub catalysts: Vec<String>,
    /// Partial failures reported by individual research stages
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

impl AnalysisResult {
    /// Ticker, if the payload carries a non-blank one.
    pub fn ticker(&self) -> Option<&str> {
        self.ticker
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StockInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub current_price: Option<f64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HoldingsLookupResult {
    pub ticker: String,
    pub company_name: String,
    pub shares_held: f64,
    pub total_value: f64,
    pub unrealized_pl_dollars: f64,
    pub unrealized_pl_percent: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_cost: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralChatResult {
    pub synthesis: String,
}

impl ResponseModel {
    /// Decode a backend payload, rejecting anything without a known
    /// discriminant or missing a required field of its variant.
    pub fn from_wire(payload: serde_json::Value) -> Result<Self> {
        match payload.get("response_type").and_then(|v| v.as_str()) {
            Some("analysis" | "holdings_lookup" | "general") => {}
            Some(other) => {
                return Err(ChatError::MalformedResponse(format!(
                    "unknown response_type '{}'",
                    other
                )))
            }
            None => {
                return Err(ChatError::MalformedResponse(
                    "missing response_type discriminant".to_string(),
                ))
            }
        }

        let model: ResponseModel = serde_json::from_value(payload)
            .map_err(|e| ChatError::MalformedResponse(e.to_string()))?;
        model.validate()?;
        Ok(model)
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            ResponseModel::HoldingsLookup(h) if h.ticker.trim().is_empty() => Err(
                ChatError::MalformedResponse("holdings lookup without ticker".to_string()),
            ),
            ResponseModel::HoldingsLookup(h)
                if !(h.shares_held.is_finite() && h.total_value.is_finite()) =>
            {
                Err(ChatError::MalformedResponse(format!(
                    "non-finite position figures for {}",
                    h.ticker
                )))
            }
            ResponseModel::Analysis(a) if a.synthesis.trim().is_empty() && a.ticker().is_none() => {
                Err(ChatError::MalformedResponse(
                    "analysis without ticker or synthesis".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ResponseModel::Analysis(_) => "analysis",
            ResponseModel::HoldingsLookup(_) => "holdings_lookup",
            ResponseModel::GeneralChat(_) => "general",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Recommendation::Buy => "BUY",
            Recommendation::Sell => "SELL",
            Recommendation::Hold => "HOLD",
        };
        write!(f, "{}", s)
    }
}
