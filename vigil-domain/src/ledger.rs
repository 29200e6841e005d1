//! Trade Ledger
//!
//! Append-only history of closed trades. The win/loss counters are a cache of
//! what the sequence says and are rebuilt from it whenever they are loaded.

use crate::entities::ClosedTrade;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Append-only record of closed trades plus derived counters
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TradeLedger {
    /// Closed trades in chronological (insertion) order
    trades: Vec<ClosedTrade>,
    /// All trades, including zero-P/L ones
    total_trades: u64,
    /// Trades with positive P/L
    winning_trades: u64,
    /// Trades with negative P/L
    losing_trades: u64,
}

impl TradeLedger {
    /// Empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a ledger from a trade history, deriving every counter
    pub fn from_trades(trades: Vec<ClosedTrade>) -> Self {
        let mut ledger = Self { trades, ..Self::default() };
        ledger.rebuild_counters();
        ledger
    }

    /// Append a closed trade and bump the counters.
    ///
    /// A zero-P/L trade counts toward the total only.
    pub fn append(&mut self, trade: ClosedTrade) {
        self.total_trades += 1;
        if trade.is_win() {
            self.winning_trades += 1;
        } else if trade.is_loss() {
            self.losing_trades += 1;
        }
        self.trades.push(trade);
    }

    /// All trades, oldest first
    pub fn trades(&self) -> &[ClosedTrade] {
        &self.trades
    }

    /// Most recent trade
    pub fn last(&self) -> Option<&ClosedTrade> {
        self.trades.last()
    }

    /// Number of recorded trades
    pub fn total_trades(&self) -> u64 {
        self.total_trades
    }

    /// Number of trades with positive P/L
    pub fn winning_trades(&self) -> u64 {
        self.winning_trades
    }

    /// Number of trades with negative P/L
    pub fn losing_trades(&self) -> u64 {
        self.losing_trades
    }

    /// Check the stored counters against the trade sequence
    pub fn counters_consistent(&self) -> bool {
        let recomputed = Self::from_trades(self.trades.clone());
        recomputed.total_trades == self.total_trades
            && recomputed.winning_trades == self.winning_trades
            && recomputed.losing_trades == self.losing_trades
    }

    /// Recompute every counter from the trade sequence.
    ///
    /// Returns `true` if the stored counters had drifted.
    pub fn rebuild_counters(&mut self) -> bool {
        let total = self.trades.len() as u64;
        let wins = self.trades.iter().filter(|t| t.is_win()).count() as u64;
        let losses = self.trades.iter().filter(|t| t.is_loss()).count() as u64;

        let drifted =
            total != self.total_trades || wins != self.winning_trades || losses != self.losing_trades;

        self.total_trades = total;
        self.winning_trades = wins;
        self.losing_trades = losses;
        drifted
    }

    /// Aggregate statistics, computed from the trade sequence on every call
    pub fn stats(&self) -> LedgerStats {
        let total = self.trades.len() as u64;
        let wins: Vec<Decimal> =
            self.trades.iter().filter(|t| t.is_win()).map(|t| t.profit_loss).collect();
        let losses: Vec<Decimal> =
            self.trades.iter().filter(|t| t.is_loss()).map(|t| t.profit_loss.abs()).collect();

        let win_rate = if total == 0 {
            Decimal::ZERO
        } else {
            Decimal::from(wins.len() as u64) / Decimal::from(total)
        };

        let avg_win = mean(&wins);
        let avg_loss = mean(&losses);

        // No losses yet: the ratio degenerates to the average win
        let avg_win_loss_ratio = if avg_loss.is_zero() { avg_win } else { avg_win / avg_loss };

        LedgerStats {
            total_trades: total,
            winning_trades: wins.len() as u64,
            losing_trades: losses.len() as u64,
            win_rate,
            avg_win,
            avg_loss,
            avg_win_loss_ratio,
            net_pnl: self.trades.iter().map(|t| t.profit_loss).sum(),
        }
    }
}

fn mean(values: &[Decimal]) -> Decimal {
    if values.is_empty() {
        return Decimal::ZERO;
    }
    values.iter().copied().sum::<Decimal>() / Decimal::from(values.len() as u64)
}

/// Snapshot of ledger statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStats {
    /// Number of closed trades
    pub total_trades: u64,
    /// Trades with positive P/L
    pub winning_trades: u64,
    /// Trades with negative P/L
    pub losing_trades: u64,
    /// `winning_trades / total_trades`, zero with no trades
    pub win_rate: Decimal,
    /// Mean P/L of winning trades
    pub avg_win: Decimal,
    /// Mean absolute P/L of losing trades
    pub avg_loss: Decimal,
    /// `avg_win / avg_loss`, or `avg_win` when there are no losses
    pub avg_win_loss_ratio: Decimal,
    /// Sum of all realized P/L
    pub net_pnl: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::ExitReason;
    use crate::value_objects::{Price, Side};
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn trade(side: Side, entry: Decimal, exit: Decimal) -> ClosedTrade {
        let at = Utc.with_ymd_and_hms(2025, 10, 1, 0, 0, 0).unwrap();
        ClosedTrade::new(
            side,
            Price::new(entry).unwrap(),
            Price::new(exit).unwrap(),
            at,
            at,
            dec!(1),
            ExitReason::Signal,
            None,
        )
    }

    #[test]
    fn test_empty_ledger_stats() {
        let stats = TradeLedger::new().stats();
        assert_eq!(stats.total_trades, 0);
        assert_eq!(stats.win_rate, dec!(0));
        assert_eq!(stats.avg_win_loss_ratio, dec!(0));
    }

    #[test]
    fn test_append_counts_zero_pnl_in_total_only() {
        let mut ledger = TradeLedger::new();
        ledger.append(trade(Side::Long, dec!(100), dec!(110)));
        ledger.append(trade(Side::Short, dec!(100), dec!(105)));
        ledger.append(trade(Side::Long, dec!(100), dec!(100)));

        assert_eq!(ledger.total_trades(), 3);
        assert_eq!(ledger.winning_trades(), 1);
        assert_eq!(ledger.losing_trades(), 1);
        assert_eq!(
            ledger.total_trades(),
            ledger.winning_trades() + ledger.losing_trades() + 1
        );
        assert!(ledger.counters_consistent());
    }

    #[test]
    fn test_stats() {
        let mut ledger = TradeLedger::new();
        ledger.append(trade(Side::Long, dec!(100), dec!(110))); // +10
        ledger.append(trade(Side::Long, dec!(100), dec!(120))); // +20
        ledger.append(trade(Side::Short, dec!(100), dec!(105))); // -5
        ledger.append(trade(Side::Short, dec!(100), dec!(100))); // 0

        let stats = ledger.stats();
        assert_eq!(stats.total_trades, 4);
        assert_eq!(stats.win_rate, dec!(0.5));
        assert_eq!(stats.avg_win, dec!(15));
        assert_eq!(stats.avg_loss, dec!(5));
        assert_eq!(stats.avg_win_loss_ratio, dec!(3));
        assert_eq!(stats.net_pnl, dec!(25));
    }

    #[test]
    fn test_ratio_falls_back_to_avg_win_without_losses() {
        let mut ledger = TradeLedger::new();
        ledger.append(trade(Side::Long, dec!(100), dec!(104)));
        ledger.append(trade(Side::Long, dec!(100), dec!(102)));

        let stats = ledger.stats();
        assert_eq!(stats.avg_loss, dec!(0));
        assert_eq!(stats.avg_win_loss_ratio, dec!(3));
    }

    #[test]
    fn test_rebuild_counters_after_tampered_load() {
        let json = r#"{"trades":[{"type":"long","entry_price":"100","exit_price":"101","entry_time":"2025-10-01T00:00:00Z","exit_time":"2025-10-01T01:00:00Z","profit_loss":"1"}],"total_trades":7,"winning_trades":0}"#;
        let mut ledger: TradeLedger = serde_json::from_str(json).unwrap();
        assert!(!ledger.counters_consistent());

        assert!(ledger.rebuild_counters());
        assert_eq!(ledger.total_trades(), 1);
        assert_eq!(ledger.winning_trades(), 1);
        assert_eq!(ledger.losing_trades(), 0);
        assert!(!ledger.rebuild_counters());
    }
}
