//! Level crossing detection
//!
//! Finds whether, and in which bar, a stop or target level was touched since
//! the position was opened. The loop polls minutes apart, so the latest price
//! alone can miss a wick that already hit a level.
//!
//! Within a single bar the target is tested before the stop. OHLC cannot tell
//! which extreme came first; this bias is deliberate and kept as is.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vigil_domain::{Bar, Price, PriceSeries, Side};

/// Outcome of scanning bars for a level touch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LevelCrossing {
    /// Neither level touched
    None,
    /// Stop-loss touched
    StopHit {
        /// The stop level
        price: Price,
        /// Open time of the bar that touched it
        time: DateTime<Utc>,
    },
    /// Take-profit touched
    TargetHit {
        /// The target level
        price: Price,
        /// Open time of the bar that touched it
        time: DateTime<Utc>,
    },
}

impl LevelCrossing {
    /// Check if any level was touched
    pub fn is_hit(&self) -> bool {
        !matches!(self, LevelCrossing::None)
    }
}

/// Scan `bars` (oldest first) for the first stop or target touch.
///
/// - Long: target if `high >= target`, stop if `low <= stop`
/// - Short: target if `low <= target`, stop if `high >= stop`
///
/// A missing level, or a zero high/low, never crosses.
pub fn detect_crossing(
    bars: &[Bar],
    side: Side,
    stop: Option<Price>,
    target: Option<Price>,
) -> LevelCrossing {
    for bar in bars {
        if let Some(target) = target {
            if target_touched(bar, side, target) {
                return LevelCrossing::TargetHit { price: target, time: bar.time };
            }
        }
        if let Some(stop) = stop {
            if stop_touched(bar, side, stop) {
                return LevelCrossing::StopHit { price: stop, time: bar.time };
            }
        }
    }
    LevelCrossing::None
}

/// [`detect_crossing`] over the bars strictly after `entry_time`
pub fn detect_crossing_since(
    series: &PriceSeries,
    entry_time: DateTime<Utc>,
    side: Side,
    stop: Option<Price>,
    target: Option<Price>,
) -> LevelCrossing {
    detect_crossing(series.after(entry_time), side, stop, target)
}

fn target_touched(bar: &Bar, side: Side, target: Price) -> bool {
    let level = target.as_decimal();
    match side {
        Side::Long => bar.reported_high().is_some_and(|high| high >= level),
        Side::Short => bar.reported_low().is_some_and(|low| low <= level),
    }
}

fn stop_touched(bar: &Bar, side: Side, stop: Price) -> bool {
    let level = stop.as_decimal();
    match side {
        Side::Long => bar.reported_low().is_some_and(|low| low <= level),
        Side::Short => bar.reported_high().is_some_and(|high| high >= level),
    }
}
