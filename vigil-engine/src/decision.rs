//! Position management decisions
//!
//! Maps (position status, signal, validation result) to an ordered list of
//! broker actions. Pure: the caller executes the actions and mutates state.
//!
//! | status | signal    | validation | actions                                    |
//! |--------|-----------|------------|--------------------------------------------|
//! | None   | Buy/Sell  | Accepted   | cancel stale, open, place stop+target      |
//! | None   | Buy/Sell  | Rejected   | none (rejection surfaced)                  |
//! | None   | Hold      | -          | none                                       |
//! | Long   | Buy       | -          | none, or re-place missing stop/target      |
//! | Long   | Sell      | Accepted   | cancel, close, open Short, place protection|
//! | Long   | Sell      | Rejected   | cancel, close, stay flat                   |
//! | Long   | Hold      | -          | cancel, close, stay flat                   |
//!
//! Short mirrors Long.

use serde::{Deserialize, Serialize};
use tracing::debug;
use vigil_domain::{ExitReason, OrderId, Position, Price, ProposedSignal, Side};

use crate::validator::{RejectionReason, ValidationResult};

// =============================================================================
// Actions
// =============================================================================

/// A single broker-facing step, executed in order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum EngineAction {
    /// Cancel every open order on the instrument (before a fresh entry)
    CancelStaleOrders,
    /// Cancel the position's known protective orders
    CancelOrders {
        /// Orders to cancel
        order_ids: Vec<OrderId>,
    },
    /// Close the open position at market
    ClosePosition {
        /// Side being closed
        side: Side,
        /// Why
        reason: ExitReason,
    },
    /// Open a position at market
    OpenPosition {
        /// Side to open
        side: Side,
    },
    /// Place whichever of stop-loss / take-profit is not already working
    PlaceProtectiveOrders {
        /// Side being protected
        side: Side,
        /// Stop-loss level
        stop_loss: Price,
        /// Take-profit level
        take_profit: Price,
    },
}

// =============================================================================
// Decision
// =============================================================================

/// Summary of what the decision does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    /// Nothing to do
    Idle,
    /// Signal rejected while flat
    Rejected,
    /// Open from flat
    Open,
    /// Keep the position as is
    Maintain,
    /// Keep the position and re-place missing protection
    Repair,
    /// Close and stay flat
    Exit,
    /// Close and open the opposite side
    Reverse,
}

/// Outcome of [`decide`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Summary
    pub kind: DecisionKind,
    /// Steps to execute, in order
    pub actions: Vec<EngineAction>,
    /// Rejection surfaced to the caller, if validation failed
    pub rejection: Option<(RejectionReason, String)>,
}

impl Decision {
    fn new(kind: DecisionKind, actions: Vec<EngineAction>) -> Self {
        Self { kind, actions, rejection: None }
    }

    fn with_rejection(mut self, validation: &ValidationResult) -> Self {
        if let ValidationResult::Rejected { reason, message } = validation {
            self.rejection = Some((*reason, message.clone()));
        }
        self
    }

    /// Check if there is nothing to execute
    pub fn is_noop(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Decide the management actions for this cycle.
///
/// `validation` is the result for the signal's trade; it is ignored for
/// Hold and Malformed signals. Malformed signals act as Hold.
pub fn decide(position: &Position, signal: &ProposedSignal, validation: &ValidationResult) -> Decision {
    let wanted = match signal {
        ProposedSignal::Trade { side, stop_loss, take_profit, .. } => {
            Some((*side, *stop_loss, *take_profit))
        },
        ProposedSignal::Hold { .. } | ProposedSignal::Malformed { .. } => None,
    };

    let decision = match (position.side(), wanted) {
        // Flat
        (None, None) => Decision::new(DecisionKind::Idle, vec![]),
        (None, Some((side, stop_loss, take_profit))) => {
            if validation.is_accepted() {
                Decision::new(DecisionKind::Open, open_actions(side, stop_loss, take_profit))
            } else {
                Decision::new(DecisionKind::Rejected, vec![]).with_rejection(validation)
            }
        },

        // Open, signal agrees
        (Some(held), Some((side, stop_loss, take_profit))) if held == side => {
            if position.missing_protection() {
                Decision::new(
                    DecisionKind::Repair,
                    vec![EngineAction::PlaceProtectiveOrders {
                        side: held,
                        stop_loss: position.stop_loss.unwrap_or(stop_loss),
                        take_profit: position.take_profit.unwrap_or(take_profit),
                    }],
                )
            } else {
                Decision::new(DecisionKind::Maintain, vec![])
            }
        },

        // Open, signal reverses
        (Some(held), Some((side, stop_loss, take_profit))) => {
            let mut actions = exit_actions(position, held);
            if validation.is_accepted() {
                actions.extend(open_actions(side, stop_loss, take_profit));
                Decision::new(DecisionKind::Reverse, actions)
            } else {
                Decision::new(DecisionKind::Exit, actions).with_rejection(validation)
            }
        },

        // Open, signal says hold
        (Some(held), None) => Decision::new(DecisionKind::Exit, exit_actions(position, held)),
    };

    debug!(
        status = %position.status,
        signal = %signal.action(),
        kind = ?decision.kind,
        actions = decision.actions.len(),
        "Decision made"
    );

    decision
}

fn open_actions(side: Side, stop_loss: Price, take_profit: Price) -> Vec<EngineAction> {
    vec![
        EngineAction::CancelStaleOrders,
        EngineAction::OpenPosition { side },
        EngineAction::PlaceProtectiveOrders { side, stop_loss, take_profit },
    ]
}

fn exit_actions(position: &Position, held: Side) -> Vec<EngineAction> {
    let mut actions = Vec::with_capacity(2);
    let order_ids = position.protective_order_ids();
    if !order_ids.is_empty() {
        actions.push(EngineAction::CancelOrders { order_ids });
    }
    actions.push(EngineAction::ClosePosition { side: held, reason: ExitReason::Signal });
    actions
}
