//! Domain Entities for Vigil
//!
//! The single local position record and the immutable trades it produces.
//! `Position` is a plain value: it is loaded, passed through each
//! reconciliation/decision step explicitly, and saved at the end of a cycle.

use crate::value_objects::{DomainError, Price, Side};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Identifiers
// =============================================================================

/// Broker-assigned order identifier
pub type OrderId = String;

// =============================================================================
// PositionStatus
// =============================================================================

/// Local belief about the open position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    /// Flat, nothing open
    #[default]
    None,
    /// Long position open
    Long,
    /// Short position open
    Short,
}

impl PositionStatus {
    /// Direction of the open position, if any
    pub fn side(&self) -> Option<Side> {
        match self {
            PositionStatus::None => None,
            PositionStatus::Long => Some(Side::Long),
            PositionStatus::Short => Some(Side::Short),
        }
    }
}

impl From<Side> for PositionStatus {
    fn from(side: Side) -> Self {
        match side {
            Side::Long => PositionStatus::Long,
            Side::Short => PositionStatus::Short,
        }
    }
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionStatus::None => write!(f, "NONE"),
            PositionStatus::Long => write!(f, "LONG"),
            PositionStatus::Short => write!(f, "SHORT"),
        }
    }
}

// =============================================================================
// Position
// =============================================================================

/// The canonical local position record
///
/// # Invariants
/// - `status == None` ⇒ every price and order field is empty
/// - `status != None` ⇒ `entry_price` and `entry_time` are set
/// - Protective levels and order ids may be missing while open; that is
///   the "needs repair" state, not an error.
///
/// Unknown fields in a persisted record are ignored and missing optional
/// fields default to empty, so older and newer state files both load.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Position {
    /// Flat, long or short
    pub status: PositionStatus,

    // Entry
    /// Entry fill price
    pub entry_price: Option<Price>,
    /// Entry fill time
    pub entry_time: Option<DateTime<Utc>>,

    // Protective levels
    /// Stop-loss level
    pub stop_loss: Option<Price>,
    /// Take-profit level
    pub take_profit: Option<Price>,

    // Associated broker orders
    /// Entry order (market)
    pub entry_order_id: Option<OrderId>,
    /// Stop-loss order (stop-limit)
    pub stop_order_id: Option<OrderId>,
    /// Take-profit order (limit)
    pub take_profit_order_id: Option<OrderId>,

    /// Informational only; recomputed every cycle
    pub unrealized_pnl: Decimal,
}

impl Position {
    /// A flat position record
    pub fn flat() -> Self {
        Self::default()
    }

    /// Record a freshly opened position (protective orders not yet placed)
    pub fn open(
        side: Side,
        entry_price: Price,
        entry_time: DateTime<Utc>,
        entry_order_id: Option<OrderId>,
    ) -> Self {
        Self {
            status: side.into(),
            entry_price: Some(entry_price),
            entry_time: Some(entry_time),
            entry_order_id,
            ..Self::default()
        }
    }

    /// Direction of the open position, if any
    pub fn side(&self) -> Option<Side> {
        self.status.side()
    }

    /// Check if nothing is open
    pub fn is_flat(&self) -> bool {
        self.status == PositionStatus::None
    }

    /// Check the record's structural invariants
    ///
    /// # Errors
    /// Returns `DomainError::InvalidPosition` describing the first violation
    pub fn validate(&self) -> Result<(), DomainError> {
        match self.status {
            PositionStatus::None => {
                let dangling = self.entry_price.is_some()
                    || self.entry_time.is_some()
                    || self.stop_loss.is_some()
                    || self.take_profit.is_some()
                    || self.entry_order_id.is_some()
                    || self.stop_order_id.is_some()
                    || self.take_profit_order_id.is_some();
                if dangling {
                    return Err(DomainError::InvalidPosition(
                        "flat position carries price or order fields".to_string(),
                    ));
                }
            },
            PositionStatus::Long | PositionStatus::Short => {
                if self.entry_price.is_none() {
                    return Err(DomainError::InvalidPosition(format!(
                        "{} position has no entry price",
                        self.status
                    )));
                }
                if self.entry_time.is_none() {
                    return Err(DomainError::InvalidPosition(format!(
                        "{} position has no entry time",
                        self.status
                    )));
                }
            },
        }
        Ok(())
    }

    /// Open but missing a stop-loss or take-profit order
    pub fn missing_protection(&self) -> bool {
        !self.is_flat() && (self.stop_order_id.is_none() || self.take_profit_order_id.is_none())
    }

    /// Ids of protective orders currently believed to be working
    pub fn protective_order_ids(&self) -> Vec<OrderId> {
        self.stop_order_id
            .iter()
            .chain(self.take_profit_order_id.iter())
            .cloned()
            .collect()
    }

    /// Record a confirmed stop-loss order
    pub fn set_stop(&mut self, level: Price, order_id: OrderId) {
        self.stop_loss = Some(level);
        self.stop_order_id = Some(order_id);
    }

    /// Record a confirmed take-profit order
    pub fn set_take_profit(&mut self, level: Price, order_id: OrderId) {
        self.take_profit = Some(level);
        self.take_profit_order_id = Some(order_id);
    }

    /// Forget protective order ids after they were confirmed cancelled.
    ///
    /// Levels are kept so a later repair can re-place them.
    pub fn clear_protective_orders(&mut self) {
        self.stop_order_id = None;
        self.take_profit_order_id = None;
    }

    /// Forget one protective order after it was confirmed cancelled
    pub fn forget_order(&mut self, order_id: &str) {
        if self.stop_order_id.as_deref() == Some(order_id) {
            self.stop_order_id = None;
        }
        if self.take_profit_order_id.as_deref() == Some(order_id) {
            self.take_profit_order_id = None;
        }
    }

    /// Mark-to-market P/L of the open position (zero when flat)
    pub fn pnl_at(&self, mark: Price, size: Decimal) -> Decimal {
        match (self.side(), self.entry_price) {
            (Some(side), Some(entry)) => side.pnl(entry.as_decimal(), mark.as_decimal(), size),
            _ => Decimal::ZERO,
        }
    }

    /// Close the position, producing the trade and resetting to flat.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidStateTransition` if the position is flat
    /// or lacks its entry fields.
    pub fn close(
        &mut self,
        exit_price: Price,
        exit_time: DateTime<Utc>,
        size: Decimal,
        reason: ExitReason,
        note: Option<String>,
    ) -> Result<ClosedTrade, DomainError> {
        let (side, entry_price, entry_time) = match (self.side(), self.entry_price, self.entry_time) {
            (Some(side), Some(price), Some(time)) => (side, price, time),
            _ => {
                return Err(DomainError::InvalidStateTransition(format!(
                    "cannot close a {} position without entry data",
                    self.status
                )))
            },
        };

        let trade = ClosedTrade::new(
            side,
            entry_price,
            exit_price,
            entry_time,
            exit_time,
            size,
            reason,
            note,
        );
        *self = Self::flat();
        Ok(trade)
    }

    /// Drop the record without producing a trade (the entry never filled)
    pub fn discard(&mut self) {
        *self = Self::flat();
    }
}

// =============================================================================
// Exit Reason
// =============================================================================

/// Why a position was closed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// Stop-loss level reached
    StopHit,
    /// Take-profit level reached
    TargetHit,
    /// Broker shows the position gone and no protective fill explains it
    ClosedExternally,
    /// Signal asked to exit (hold, reversal, or rejected reversal)
    Signal,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::StopHit => write!(f, "stop hit"),
            ExitReason::TargetHit => write!(f, "target hit"),
            ExitReason::ClosedExternally => write!(f, "closed externally"),
            ExitReason::Signal => write!(f, "signal exit"),
        }
    }
}

// =============================================================================
// ClosedTrade
// =============================================================================

/// A completed round trip, immutable once appended to the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedTrade {
    /// Direction of the closed position
    #[serde(rename = "type")]
    pub side: Side,
    /// Entry fill price
    pub entry_price: Price,
    /// Exit fill (or detected crossing) price
    pub exit_price: Price,
    /// When the position was opened
    pub entry_time: DateTime<Utc>,
    /// When the position was closed
    pub exit_time: DateTime<Utc>,
    /// Position size in base units
    #[serde(default)]
    pub size: Decimal,
    /// Signed realized P/L
    pub profit_loss: Decimal,
    /// Why it closed
    #[serde(default = "default_exit_reason")]
    pub reason: ExitReason,
    /// Free-form closure note, e.g. "closed externally"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

fn default_exit_reason() -> ExitReason {
    ExitReason::Signal
}

impl ClosedTrade {
    /// Build a trade, deriving `profit_loss` from side, prices and size
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        side: Side,
        entry_price: Price,
        exit_price: Price,
        entry_time: DateTime<Utc>,
        exit_time: DateTime<Utc>,
        size: Decimal,
        reason: ExitReason,
        note: Option<String>,
    ) -> Self {
        let profit_loss = side.pnl(entry_price.as_decimal(), exit_price.as_decimal(), size);
        Self {
            side,
            entry_price,
            exit_price,
            entry_time,
            exit_time,
            size,
            profit_loss,
            reason,
            note,
        }
    }

    /// Check if the trade made money
    pub fn is_win(&self) -> bool {
        self.profit_loss > Decimal::ZERO
    }

    /// Check if the trade lost money
    pub fn is_loss(&self) -> bool {
        self.profit_loss < Decimal::ZERO
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn t(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 1, 12, minute, 0).unwrap()
    }

    fn open_long() -> Position {
        Position::open(Side::Long, Price::new(dec!(3820)).unwrap(), t(0), Some("E-1".into()))
    }

    #[test]
    fn test_flat_position_is_valid() {
        let position = Position::flat();
        assert!(position.is_flat());
        assert!(position.validate().is_ok());
        assert!(!position.missing_protection());
    }

    #[test]
    fn test_flat_position_with_order_is_invalid() {
        let position = Position {
            stop_order_id: Some("S-1".into()),
            ..Position::flat()
        };
        assert!(position.validate().is_err());
    }

    #[test]
    fn test_open_position_requires_entry() {
        let position = Position {
            status: PositionStatus::Short,
            ..Position::flat()
        };
        assert!(position.validate().is_err());

        assert!(open_long().validate().is_ok());
    }

    #[test]
    fn test_missing_protection() {
        let mut position = open_long();
        assert!(position.missing_protection());

        position.set_stop(Price::new(dec!(3800)).unwrap(), "S-1".into());
        assert!(position.missing_protection());

        position.set_take_profit(Price::new(dec!(3850)).unwrap(), "T-1".into());
        assert!(!position.missing_protection());
        assert_eq!(position.protective_order_ids(), vec!["S-1".to_string(), "T-1".to_string()]);

        position.forget_order("T-1");
        assert_eq!(position.protective_order_ids(), vec!["S-1".to_string()]);

        position.clear_protective_orders();
        assert!(position.missing_protection());
        assert_eq!(position.stop_loss, Some(Price::new(dec!(3800)).unwrap()));
    }

    #[test]
    fn test_close_long_pnl() {
        let mut position = open_long();
        let trade = position
            .close(Price::new(dec!(3830)).unwrap(), t(5), dec!(0.1), ExitReason::StopHit, None)
            .unwrap();

        assert_eq!(trade.profit_loss, dec!(1.0));
        assert!(trade.is_win());
        assert!(position.is_flat());
        assert!(position.validate().is_ok());
    }

    #[test]
    fn test_close_short_pnl_sign_reversed() {
        let mut position =
            Position::open(Side::Short, Price::new(dec!(4000)).unwrap(), t(0), None);
        let trade = position
            .close(Price::new(dec!(4010)).unwrap(), t(3), dec!(0.1), ExitReason::Signal, None)
            .unwrap();

        assert_eq!(trade.profit_loss, dec!(-1.0));
        assert!(trade.is_loss());
    }

    #[test]
    fn test_close_flat_is_error() {
        let mut position = Position::flat();
        let result =
            position.close(Price::new(dec!(1)).unwrap(), t(0), dec!(1), ExitReason::Signal, None);
        assert!(matches!(result, Err(DomainError::InvalidStateTransition(_))));
    }

    #[test]
    fn test_pnl_at() {
        let position = open_long();
        assert_eq!(position.pnl_at(Price::new(dec!(3810)).unwrap(), dec!(0.1)), dec!(-1.0));
        assert_eq!(Position::flat().pnl_at(Price::new(dec!(3810)).unwrap(), dec!(0.1)), dec!(0));
    }

    #[test]
    fn test_position_tolerates_unknown_and_missing_fields() {
        let json = r#"{"status":"long","entry_price":"3820","entry_time":"2025-10-01T12:00:00Z","mood":"optimistic"}"#;
        let position: Position = serde_json::from_str(json).unwrap();

        assert_eq!(position.status, PositionStatus::Long);
        assert_eq!(position.entry_price, Some(Price::new(dec!(3820)).unwrap()));
        assert!(position.stop_order_id.is_none());
        assert!(position.missing_protection());
    }

    #[test]
    fn test_closed_trade_serializes_type_field() {
        let trade = ClosedTrade::new(
            Side::Long,
            Price::new(dec!(100)).unwrap(),
            Price::new(dec!(101)).unwrap(),
            t(0),
            t(1),
            dec!(1),
            ExitReason::ClosedExternally,
            Some("closed externally".into()),
        );
        let json = serde_json::to_value(&trade).unwrap();
        assert_eq!(json["type"], "long");
        assert_eq!(json["reason"], "closed_externally");
        assert_eq!(json["note"], "closed externally");
    }
}
