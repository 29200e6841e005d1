//! Market Data Types
//!
//! OHLCV bars as delivered by the price-series collaborator.
//! A zero field means "not reported" and never counts as a price.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Bar
// =============================================================================

/// OHLCV bar.
///
/// `time` is the bar open time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    /// Bar open time
    pub time: DateTime<Utc>,
    /// Opening price
    #[serde(default)]
    pub open: Decimal,
    /// Highest price
    #[serde(default)]
    pub high: Decimal,
    /// Lowest price
    #[serde(default)]
    pub low: Decimal,
    /// Closing price
    #[serde(default)]
    pub close: Decimal,
    /// Traded volume
    #[serde(default)]
    pub volume: Decimal,
}

impl Bar {
    /// Create a new bar.
    pub fn new(
        time: DateTime<Utc>,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Self {
        Self { time, open, high, low, close, volume }
    }

    /// High if reported
    pub fn reported_high(&self) -> Option<Decimal> {
        (self.high > Decimal::ZERO).then_some(self.high)
    }

    /// Low if reported
    pub fn reported_low(&self) -> Option<Decimal> {
        (self.low > Decimal::ZERO).then_some(self.low)
    }

    /// Close if reported
    pub fn reported_close(&self) -> Option<Decimal> {
        (self.close > Decimal::ZERO).then_some(self.close)
    }
}

// =============================================================================
// PriceSeries
// =============================================================================

/// Chronologically ordered bars (oldest first)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceSeries {
    bars: Vec<Bar>,
}

impl PriceSeries {
    /// Build a series, sorting bars by time
    pub fn new(mut bars: Vec<Bar>) -> Self {
        bars.sort_by_key(|b| b.time);
        Self { bars }
    }

    /// All bars, oldest first
    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    /// Number of bars
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    /// Check if there are no bars
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Bars strictly after `time`
    pub fn after(&self, time: DateTime<Utc>) -> &[Bar] {
        let start = self.bars.partition_point(|b| b.time <= time);
        &self.bars[start..]
    }

    /// Most recent reported close
    pub fn last_close(&self) -> Option<Decimal> {
        self.bars.iter().rev().find_map(Bar::reported_close)
    }

    /// Volumes of the last `n` bars, oldest first
    pub fn recent_volumes(&self, n: usize) -> Vec<Decimal> {
        let start = self.bars.len().saturating_sub(n);
        self.bars[start..].iter().map(|b| b.volume).collect()
    }
}

impl From<Vec<Bar>> for PriceSeries {
    fn from(bars: Vec<Bar>) -> Self {
        Self::new(bars)
    }
}
