//! Cycle report handed to the notification collaborator.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use vigil_domain::{ClosedTrade, LedgerStats, PositionStatus, Price, Symbol, TradingState};
use vigil_engine::Decision;
use vigil_exec::{ActionResult, ReconcileEvent};

/// What one cycle saw and did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    /// Instrument traded
    pub symbol: Symbol,
    /// Cycle skipped by the kill switch
    pub halted: bool,
    /// Outcome lines in the order they happened
    pub lines: Vec<String>,
    /// Trades closed this cycle
    pub closed_trades: Vec<ClosedTrade>,
    /// Position status at the end of the cycle
    pub status: PositionStatus,
    /// Entry price of the position held at the end of the cycle
    pub entry_price: Option<Price>,
    /// Unrealized P/L of that position
    pub unrealized_pnl: Decimal,
    /// Latest close
    pub last_price: Option<Decimal>,
    /// Ledger statistics after the cycle
    pub stats: LedgerStats,
    /// Account balance, when the broker answered
    pub balance: Option<Decimal>,
}

impl CycleReport {
    /// Empty report for `state`
    pub fn new(symbol: Symbol, state: &TradingState) -> Self {
        let mut report = Self {
            symbol,
            halted: false,
            lines: Vec::new(),
            closed_trades: Vec::new(),
            status: PositionStatus::None,
            entry_price: None,
            unrealized_pnl: Decimal::ZERO,
            last_price: None,
            stats: state.ledger.stats(),
            balance: None,
        };
        report.snapshot(state);
        report
    }

    /// Report for a cycle skipped by the kill switch
    pub fn halted(symbol: Symbol, state: &TradingState) -> Self {
        let mut report = Self::new(symbol, state);
        report.halted = true;
        report.push("Trading halted by kill switch, no action taken");
        report
    }

    /// Append an outcome line
    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    /// Capture position and ledger figures from `state`
    pub fn snapshot(&mut self, state: &TradingState) {
        self.status = state.position.status;
        self.entry_price = state.position.entry_price;
        self.unrealized_pnl = state.position.unrealized_pnl;
        self.stats = state.ledger.stats();
    }

    /// Record what reconciliation found
    pub fn reconciled(&mut self, event: &ReconcileEvent) {
        let line = match event {
            ReconcileEvent::InSync => return,
            ReconcileEvent::PhantomCleared { entry_order_id } => format!(
                "Desync: entry order {} never filled, position record cleared",
                entry_order_id.as_deref().unwrap_or("-")
            ),
            ReconcileEvent::ClosedExternally(trade) => {
                self.closed_trades.push(trade.clone());
                format!("Desync: {}", describe_trade(trade))
            },
            ReconcileEvent::Adopted { side, entry_price, contracts } => format!(
                "Inconsistent state: broker holds {} {} contracts @ {}, local record overwritten",
                side, contracts, entry_price
            ),
            ReconcileEvent::SizeMismatch { expected, reported } => format!(
                "Inconsistent state: broker reports {} contracts, expected {}",
                reported, expected
            ),
            ReconcileEvent::MissingProtection => "Protective orders missing".to_string(),
        };
        self.push(line);
    }

    /// Record a trade closed because a level was crossed between polls
    pub fn level_crossed(&mut self, trade: &ClosedTrade) {
        self.closed_trades.push(trade.clone());
        self.push(format!("Retroactive {}", describe_trade(trade)));
    }

    /// Record the decision's rejection, if any
    pub fn decided(&mut self, decision: &Decision) {
        if let Some((reason, message)) = &decision.rejection {
            self.push(format!("Signal rejected ({}): {}", reason, message));
        }
    }

    /// Record an executed action
    pub fn executed(&mut self, result: &ActionResult) {
        let line = match result {
            ActionResult::OrdersCancelled { order_ids } if order_ids.is_empty() => return,
            ActionResult::OrdersCancelled { order_ids } => {
                format!("Cancelled orders: {}", order_ids.join(", "))
            },
            ActionResult::PositionOpened { side, order_id, entry_price } => {
                format!("Opened {} @ {} (order {})", side, entry_price, order_id)
            },
            ActionResult::PositionClosed(trade) => {
                self.closed_trades.push(trade.clone());
                describe_trade(trade)
            },
            ActionResult::ProtectionPlaced { stop_order_id, take_profit_order_id } => format!(
                "Protection placed: stop {} target {}",
                stop_order_id.as_deref().unwrap_or("-"),
                take_profit_order_id.as_deref().unwrap_or("-")
            ),
        };
        self.push(line);
    }

    /// Net P/L of trades closed this cycle
    pub fn realized_pnl(&self) -> Decimal {
        self.closed_trades.iter().map(|t| t.profit_loss).sum()
    }
}

fn describe_trade(trade: &ClosedTrade) -> String {
    let mut line = format!(
        "Closed {} {} -> {} ({}), P/L {}",
        trade.side,
        trade.entry_price,
        trade.exit_price,
        trade.reason,
        trade.profit_loss.round_dp(4)
    );
    if let Some(note) = &trade.note {
        line.push_str(&format!(" [{}]", note));
    }
    line
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Vigil cycle: {}", self.symbol)?;
        for line in &self.lines {
            writeln!(f, "- {}", line)?;
        }

        match self.entry_price {
            Some(entry) => writeln!(
                f,
                "Position: {} @ {} (unrealized {})",
                self.status,
                entry,
                self.unrealized_pnl.round_dp(4)
            )?,
            None => writeln!(f, "Position: {}", self.status)?,
        }
        if let Some(price) = self.last_price {
            writeln!(f, "Last price: {}", price)?;
        }

        let stats = &self.stats;
        writeln!(
            f,
            "Trades: {} ({}W/{}L), win rate {}%, avg W/L {}, net P/L {}",
            stats.total_trades,
            stats.winning_trades,
            stats.losing_trades,
            (stats.win_rate * Decimal::ONE_HUNDRED).round_dp(2),
            stats.avg_win_loss_ratio.round_dp(2),
            stats.net_pnl.round_dp(4)
        )?;

        match self.balance {
            Some(balance) => write!(f, "Balance: {}", balance.round_dp(2)),
            None => write!(f, "Balance: unavailable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use vigil_domain::{ExitReason, Side, TradeLedger};

    fn trade() -> ClosedTrade {
        let at = Utc.with_ymd_and_hms(2025, 10, 1, 12, 0, 0).unwrap();
        ClosedTrade::new(
            Side::Long,
            Price::new(dec!(3820)).unwrap(),
            Price::new(dec!(3830)).unwrap(),
            at,
            at,
            dec!(0.1),
            ExitReason::StopHit,
            Some("closed externally".into()),
        )
    }

    fn symbol() -> Symbol {
        Symbol::new("ET-31OCT25-CDE").unwrap()
    }

    #[test]
    fn test_halted_report() {
        let report = CycleReport::halted(symbol(), &TradingState::new());

        assert!(report.halted);
        assert_eq!(report.lines.len(), 1);
        assert!(report.to_string().contains("halted"));
    }

    #[test]
    fn test_in_sync_is_silent() {
        let mut report = CycleReport::new(symbol(), &TradingState::new());
        report.reconciled(&ReconcileEvent::InSync);

        assert!(report.lines.is_empty());
    }

    #[test]
    fn test_external_close_collected() {
        let mut report = CycleReport::new(symbol(), &TradingState::new());
        report.reconciled(&ReconcileEvent::ClosedExternally(trade()));

        assert_eq!(report.closed_trades.len(), 1);
        assert_eq!(report.realized_pnl(), dec!(1.0));
        assert!(report.lines[0].contains("stop hit"));
        assert!(report.lines[0].contains("[closed externally]"));
    }

    #[test]
    fn test_display_includes_stats_and_balance() {
        let state = TradingState {
            ledger: TradeLedger::from_trades(vec![trade()]),
            ..TradingState::new()
        };
        let mut report = CycleReport::new(symbol(), &state);
        report.balance = Some(dec!(10000));

        let text = report.to_string();
        assert!(text.contains("Trades: 1 (1W/0L), win rate 100"));
        assert!(text.contains("Balance: 10000"));
        assert!(text.contains("Position: NONE"));
    }

    #[test]
    fn test_empty_cancel_is_silent() {
        let mut report = CycleReport::new(symbol(), &TradingState::new());
        report.executed(&ActionResult::OrdersCancelled { order_ids: vec![] });

        assert!(report.lines.is_empty());
    }
}
