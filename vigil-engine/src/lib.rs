//! Vigil Engine Layer
//!
//! Pure decision logic, deterministic, no I/O.
//! Takes position + market data + signal → returns actions to execute.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod crossing;
pub mod decision;
pub mod validator;

pub use crossing::{detect_crossing, detect_crossing_since, LevelCrossing};
pub use decision::{decide, Decision, DecisionKind, EngineAction};
pub use validator::{RejectionReason, TradeValidator, ValidationConfig, ValidationResult, VolumeRule};

use vigil_domain::{Position, Price, PriceSeries, ProposedSignal};

// =============================================================================
// Engine
// =============================================================================

/// Validation plus decision for one cycle
#[derive(Debug, Clone, Default)]
pub struct Engine {
    validator: TradeValidator,
}

/// Validation result and the decision it led to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    /// Result for the signal's trade (`None` for Hold/Malformed)
    pub validation: Option<ValidationResult>,
    /// Actions to execute
    pub decision: Decision,
}

impl Engine {
    /// Create an engine with the given validation thresholds
    pub fn new(config: ValidationConfig) -> Self {
        Self { validator: TradeValidator::new(config) }
    }

    /// The trade validator
    pub fn validator(&self) -> &TradeValidator {
        &self.validator
    }

    /// Validate the signal's trade and decide.
    ///
    /// The trade is validated at the latest close, where a market entry would
    /// fill, falling back to the signal's advisory entry when no close is
    /// known. With neither, the trade is rejected. Volume is checked only when
    /// the trade would open a position.
    pub fn evaluate(
        &self,
        position: &Position,
        signal: &ProposedSignal,
        series: &PriceSeries,
    ) -> Evaluation {
        let validation = match signal {
            ProposedSignal::Trade { side, entry, stop_loss, take_profit, .. } => {
                let reference = series.last_close().and_then(|c| Price::new(c).ok()).or(*entry);
                let opens_new = position.side() != Some(*side);
                let volumes = series.recent_volumes(self.validator.config().volume.lookback);

                Some(match reference {
                    Some(entry) => self.validator.validate(
                        *side,
                        entry,
                        *stop_loss,
                        *take_profit,
                        opens_new.then_some(volumes.as_slice()),
                    ),
                    None => ValidationResult::Rejected {
                        reason: RejectionReason::NoEntryPrice,
                        message: "no close and no advisory entry".to_string(),
                    },
                })
            },
            ProposedSignal::Hold { .. } | ProposedSignal::Malformed { .. } => None,
        };

        let decision = decide(
            position,
            signal,
            validation.as_ref().unwrap_or(&ValidationResult::Accepted),
        );

        Evaluation { validation, decision }
    }
}
