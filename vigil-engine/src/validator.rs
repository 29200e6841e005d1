//! Trade validation
//!
//! Risk checks on a proposed entry/stop/target. Rejections are ordinary
//! return values; the first failing check, in a fixed order, is reported.
//!
//! Distances are percentages of the entry price (`0.3` means 0.3%).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use vigil_domain::{Price, Side};

// =============================================================================
// Configuration
// =============================================================================

/// Liquidity requirement applied before opening a new position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeRule {
    /// Number of most recent bars considered
    pub lookback: usize,
    /// Average volume over the lookback must exceed this
    pub min_avg_volume: Decimal,
    /// A bar counts as active when its volume exceeds this
    pub min_bar_volume: Decimal,
    /// Minimum number of active bars in the lookback
    pub min_active_bars: usize,
}

impl Default for VolumeRule {
    fn default() -> Self {
        Self {
            lookback: 10,
            min_avg_volume: Decimal::ONE_HUNDRED,
            min_bar_volume: Decimal::from(20),
            min_active_bars: 6,
        }
    }
}

/// Validation thresholds, all inclusive bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Minimum stop distance (% of entry)
    pub min_stop_pct: Decimal,
    /// Maximum stop distance (% of entry)
    pub max_stop_pct: Decimal,
    /// Minimum target distance (% of entry)
    pub min_target_pct: Decimal,
    /// Maximum target distance (% of entry)
    pub max_target_pct: Decimal,
    /// Minimum reward/risk
    pub min_rr: Decimal,
    /// Maximum reward/risk
    pub max_rr: Decimal,
    /// Liquidity rule for new positions
    pub volume: VolumeRule,
}

impl Default for ValidationConfig {
    /// Scalping bounds for a 15m ETH futures chart
    fn default() -> Self {
        Self {
            min_stop_pct: Decimal::new(10, 2),   // 0.10%
            max_stop_pct: Decimal::new(50, 2),   // 0.50%
            min_target_pct: Decimal::new(10, 2), // 0.10%
            max_target_pct: Decimal::new(50, 2), // 0.50%
            min_rr: Decimal::new(5, 1),          // 0.5
            max_rr: Decimal::new(30, 1),         // 3.0
            volume: VolumeRule::default(),
        }
    }
}

// =============================================================================
// Result
// =============================================================================

/// Which check failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// Levels on the wrong side of the entry
    BadDirection,
    /// Stop too close or too far
    StopDistance,
    /// Target too close or too far
    TargetDistance,
    /// Reward/risk out of bounds
    RiskReward,
    /// Not enough traded volume
    LowVolume,
    /// Neither a close nor an advisory entry to measure from
    NoEntryPrice,
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            RejectionReason::BadDirection => "BAD_DIRECTION",
            RejectionReason::StopDistance => "STOP_DISTANCE",
            RejectionReason::TargetDistance => "TARGET_DISTANCE",
            RejectionReason::RiskReward => "RISK_REWARD",
            RejectionReason::LowVolume => "LOW_VOLUME",
            RejectionReason::NoEntryPrice => "NO_ENTRY_PRICE",
        };
        write!(f, "{}", code)
    }
}

/// Accept, or reject with a reason code and a human-readable message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ValidationResult {
    /// All checks passed
    Accepted,
    /// First failing check
    Rejected {
        /// Reason code
        reason: RejectionReason,
        /// What exactly was out of bounds
        message: String,
    },
}

impl ValidationResult {
    fn rejected(reason: RejectionReason, message: String) -> Self {
        ValidationResult::Rejected { reason, message }
    }

    /// Check if accepted
    pub fn is_accepted(&self) -> bool {
        matches!(self, ValidationResult::Accepted)
    }

    /// Reason code if rejected
    pub fn reason(&self) -> Option<RejectionReason> {
        match self {
            ValidationResult::Accepted => None,
            ValidationResult::Rejected { reason, .. } => Some(*reason),
        }
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationResult::Accepted => write!(f, "accepted"),
            ValidationResult::Rejected { reason, message } => write!(f, "{}: {}", reason, message),
        }
    }
}

// =============================================================================
// Validator
// =============================================================================

/// Applies [`ValidationConfig`] to proposed trades
#[derive(Debug, Clone, Default)]
pub struct TradeValidator {
    config: ValidationConfig,
}

impl TradeValidator {
    /// Create a validator with the given thresholds
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Thresholds in use
    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Validate a proposed trade.
    ///
    /// `volumes` are recent bar volumes (oldest first) and are checked only
    /// when given; pass `None` when the trade does not open a new position.
    ///
    /// Order: direction, stop distance, target distance, reward/risk, volume.
    pub fn validate(
        &self,
        side: Side,
        entry: Price,
        stop: Price,
        target: Price,
        volumes: Option<&[Decimal]>,
    ) -> ValidationResult {
        let c = &self.config;
        let (e, s, t) = (entry.as_decimal(), stop.as_decimal(), target.as_decimal());

        // 1. Direction
        let ordered = match side {
            Side::Long => s < e && e < t,
            Side::Short => t < e && e < s,
        };
        if !ordered {
            let expected = match side {
                Side::Long => "stop < entry < target",
                Side::Short => "target < entry < stop",
            };
            return ValidationResult::rejected(
                RejectionReason::BadDirection,
                format!(
                    "{} requires {} (entry={}, stop={}, target={})",
                    side, expected, entry, stop, target
                ),
            );
        }

        // 2. Stop distance
        let stop_pct = entry.distance_pct(stop);
        if stop_pct < c.min_stop_pct || stop_pct > c.max_stop_pct {
            return ValidationResult::rejected(
                RejectionReason::StopDistance,
                format!(
                    "stop distance {}% outside [{}%, {}%]",
                    stop_pct.round_dp(3),
                    c.min_stop_pct,
                    c.max_stop_pct
                ),
            );
        }

        // 3. Target distance
        let target_pct = entry.distance_pct(target);
        if target_pct < c.min_target_pct || target_pct > c.max_target_pct {
            return ValidationResult::rejected(
                RejectionReason::TargetDistance,
                format!(
                    "target distance {}% outside [{}%, {}%]",
                    target_pct.round_dp(3),
                    c.min_target_pct,
                    c.max_target_pct
                ),
            );
        }

        // 4. Reward/risk
        let rr = (t - e).abs() / (e - s).abs();
        if rr < c.min_rr || rr > c.max_rr {
            return ValidationResult::rejected(
                RejectionReason::RiskReward,
                format!("risk/reward {} outside [{}, {}]", rr.round_dp(2), c.min_rr, c.max_rr),
            );
        }

        // 5. Volume (new positions only)
        if let Some(volumes) = volumes {
            if let Some(rejection) = self.check_volume(volumes) {
                return rejection;
            }
        }

        ValidationResult::Accepted
    }

    fn check_volume(&self, volumes: &[Decimal]) -> Option<ValidationResult> {
        let rule = &self.config.volume;
        let window = &volumes[volumes.len().saturating_sub(rule.lookback)..];

        let average = if window.is_empty() {
            Decimal::ZERO
        } else {
            window.iter().copied().sum::<Decimal>() / Decimal::from(window.len() as u64)
        };
        let active = window.iter().filter(|v| **v > rule.min_bar_volume).count();

        if average > rule.min_avg_volume && active >= rule.min_active_bars {
            return None;
        }

        Some(ValidationResult::rejected(
            RejectionReason::LowVolume,
            format!(
                "average volume {} (need > {}), {}/{} bars above {} (need {})",
                average.round_dp(2),
                rule.min_avg_volume,
                active,
                window.len(),
                rule.min_bar_volume,
                rule.min_active_bars
            ),
        ))
    }
}
