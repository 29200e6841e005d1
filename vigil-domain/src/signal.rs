//! Advisory trade signals
//!
//! Signals come from an untrusted source (typically a language model's free
//! text). Everything is parsed at this boundary into [`ProposedSignal`], whose
//! `Malformed` variant forces callers to handle bad input explicitly.

use crate::entities::PositionStatus;
use crate::value_objects::{Price, Side, Symbol};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

// =============================================================================
// SignalAction
// =============================================================================

/// What the signal asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalAction {
    /// Go (or stay) long
    Buy,
    /// Go (or stay) short
    Sell,
    /// Be flat
    Hold,
}

impl SignalAction {
    /// Direction a Buy/Sell asks for
    pub fn side(&self) -> Option<Side> {
        match self {
            SignalAction::Buy => Some(Side::Long),
            SignalAction::Sell => Some(Side::Short),
            SignalAction::Hold => None,
        }
    }
}

impl FromStr for SignalAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" | "long" => Ok(SignalAction::Buy),
            "sell" | "short" => Ok(SignalAction::Sell),
            "hold" | "none" | "flat" => Ok(SignalAction::Hold),
            other => Err(format!("unknown action {:?}", other)),
        }
    }
}

impl fmt::Display for SignalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalAction::Buy => write!(f, "BUY"),
            SignalAction::Sell => write!(f, "SELL"),
            SignalAction::Hold => write!(f, "HOLD"),
        }
    }
}

// =============================================================================
// RawSignal
// =============================================================================

/// Signal exactly as received, every field possibly absent or mistyped
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawSignal {
    /// "buy" / "sell" / "hold"
    pub action: Option<Value>,
    /// Suggested entry price
    #[serde(alias = "entry_price")]
    pub entry: Option<Value>,
    /// Suggested stop-loss
    pub stop_loss: Option<Value>,
    /// Suggested take-profit
    pub take_profit: Option<Value>,
    /// Advisor confidence, kept on the advisor's own scale (0-100 in practice)
    pub confidence: Option<Value>,
    /// Free-form explanation
    pub reasoning: Option<Value>,
}

/// Read a JSON number or numeric string as a Decimal
fn as_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .ok()
            .or_else(|| Decimal::from_scientific(&n.to_string()).ok()),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

fn as_price(value: Option<&Value>) -> Option<Price> {
    value.and_then(as_decimal).and_then(|d| Price::new(d).ok())
}

// =============================================================================
// ProposedSignal
// =============================================================================

/// A parsed advisory signal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProposedSignal {
    /// Buy or Sell with numeric stop and target
    Trade {
        /// Direction asked for
        side: Side,
        /// Advisory entry price, when one was given
        entry: Option<Price>,
        /// Stop-loss level
        stop_loss: Price,
        /// Take-profit level
        take_profit: Price,
        /// Signal confidence
        confidence: Decimal,
    },
    /// Explicit Hold
    Hold {
        /// Signal confidence
        confidence: Decimal,
    },
    /// Unusable input; treated as Hold with zero confidence
    Malformed {
        /// What was wrong
        reason: String,
    },
}

impl ProposedSignal {
    /// Classify a raw signal
    pub fn from_raw(raw: &RawSignal) -> Self {
        let action = match raw.action.as_ref() {
            Some(Value::String(s)) => match s.parse::<SignalAction>() {
                Ok(action) => action,
                Err(e) => return Self::malformed(e),
            },
            Some(other) => return Self::malformed(format!("action is not a string: {}", other)),
            None => return Self::malformed("missing action"),
        };

        let confidence = raw.confidence.as_ref().and_then(as_decimal).unwrap_or(Decimal::ZERO);

        let side = match action.side() {
            Some(side) => side,
            None => return ProposedSignal::Hold { confidence },
        };

        // Entry is advisory: validation runs against the last close.
        // A present but unreadable entry still marks the signal unusable.
        let entry = as_price(raw.entry.as_ref());
        let entry_unreadable = raw.entry.as_ref().is_some_and(|v| !v.is_null()) && entry.is_none();
        let stop_loss = as_price(raw.stop_loss.as_ref());
        let take_profit = as_price(raw.take_profit.as_ref());

        match (entry_unreadable, stop_loss, take_profit) {
            (false, Some(stop_loss), Some(take_profit)) => ProposedSignal::Trade {
                side,
                entry,
                stop_loss,
                take_profit,
                confidence,
            },
            _ => Self::malformed(format!(
                "{} signal with missing or non-numeric levels (entry={}, stop_loss={}, take_profit={})",
                action,
                describe(raw.entry.as_ref()),
                describe(raw.stop_loss.as_ref()),
                describe(raw.take_profit.as_ref()),
            )),
        }
    }

    /// Extract and classify the first JSON object with an `"action"` key
    /// embedded in free text.
    ///
    /// # Examples
    /// ```
    /// # use vigil_domain::signal::{ProposedSignal, SignalAction};
    /// let text = r#"Momentum is fading. {"action": "hold", "confidence": 0.4} Stay flat."#;
    /// assert_eq!(ProposedSignal::from_advisory_text(text).action(), SignalAction::Hold);
    /// ```
    pub fn from_advisory_text(text: &str) -> Self {
        for (start, _) in text.match_indices('{') {
            let mut stream =
                serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
            if let Some(Ok(value)) = stream.next() {
                if value.get("action").is_some() {
                    return match serde_json::from_value::<RawSignal>(value) {
                        Ok(raw) => Self::from_raw(&raw),
                        Err(e) => Self::malformed(format!("signal object unreadable: {}", e)),
                    };
                }
            }
        }
        Self::malformed("no JSON object with an action found")
    }

    fn malformed(reason: impl Into<String>) -> Self {
        ProposedSignal::Malformed { reason: reason.into() }
    }

    /// Effective action (Malformed acts as Hold)
    pub fn action(&self) -> SignalAction {
        match self {
            ProposedSignal::Trade { side: Side::Long, .. } => SignalAction::Buy,
            ProposedSignal::Trade { side: Side::Short, .. } => SignalAction::Sell,
            ProposedSignal::Hold { .. } | ProposedSignal::Malformed { .. } => SignalAction::Hold,
        }
    }

    /// Effective confidence (Malformed has zero)
    pub fn confidence(&self) -> Decimal {
        match self {
            ProposedSignal::Trade { confidence, .. } | ProposedSignal::Hold { confidence } => {
                *confidence
            },
            ProposedSignal::Malformed { .. } => Decimal::ZERO,
        }
    }

    /// Check if the input was unusable
    pub fn is_malformed(&self) -> bool {
        matches!(self, ProposedSignal::Malformed { .. })
    }

    /// Stop and target of a Trade signal
    pub fn levels(&self) -> Option<(Price, Price)> {
        match self {
            ProposedSignal::Trade { stop_loss, take_profit, .. } => Some((*stop_loss, *take_profit)),
            _ => None,
        }
    }
}

fn describe(value: Option<&Value>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "missing".to_string(),
    }
}

// =============================================================================
// SignalContext
// =============================================================================

/// What the signal provider is told about the current situation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalContext {
    /// Instrument being traded
    pub symbol: Symbol,
    /// Position status after reconciliation
    pub status: PositionStatus,
    /// Entry price of the open position
    pub entry_price: Option<Price>,
    /// Latest close
    pub last_price: Option<Decimal>,
    /// When the context was built
    pub as_of: DateTime<Utc>,
}
