//! Persisted trading state
//!
//! The unit loaded at cycle start and saved at cycle end.

use crate::entities::Position;
use crate::ledger::TradeLedger;
use serde::{Deserialize, Serialize};

/// Position record plus trade history
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingState {
    /// Current local position
    pub position: Position,
    /// Closed trade history
    pub ledger: TradeLedger,
}

impl TradingState {
    /// Flat state with an empty ledger
    pub fn new() -> Self {
        Self::default()
    }
}
