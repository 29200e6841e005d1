//! E2E tests: full cycles against the stub broker.
//!
//! Each test seeds a persisted state and a broker situation, runs one cycle
//! and checks the persisted outcome, the broker side effects and the report.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tempfile::TempDir;

use vigil_domain::{
    Bar, ExitReason, OrderSide, Position, PositionStatus, Price, PriceSeries, ProposedSignal,
    Side, SignalContext, Symbol, TradingState,
};
use vigil_exec::{
    BrokerPosition, ExecError, OrderKind, OrderSnapshot, OrderStatus, PriceSeriesProvider,
    ProviderError, SignalProvider, StubBroker, StubCall,
};
use vigil_store::{JsonFileStore, MemoryStore, StateStore};
use vigild::{
    AdvisoryTextSignalProvider, Config, DaemonError, JsonBarsProvider, TradingCycle,
};

// =============================================================================
// Fixtures
// =============================================================================

struct FixedBars(PriceSeries);

#[async_trait]
impl PriceSeriesProvider for FixedBars {
    async fn get_bars(
        &self,
        _symbol: &Symbol,
        _since: Option<DateTime<Utc>>,
        _count: usize,
    ) -> Result<PriceSeries, ProviderError> {
        Ok(self.0.clone())
    }
}

struct FixedSignal {
    signal: Option<ProposedSignal>,
    calls: AtomicUsize,
}

impl FixedSignal {
    fn new(signal: ProposedSignal) -> Self {
        Self { signal: Some(signal), calls: AtomicUsize::new(0) }
    }

    fn failing() -> Self {
        Self { signal: None, calls: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl SignalProvider for FixedSignal {
    async fn get_signal(&self, _context: &SignalContext) -> Result<ProposedSignal, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.signal
            .clone()
            .ok_or_else(|| ProviderError::Unavailable("advisor timed out".to_string()))
    }
}

type Cycle = TradingCycle<StubBroker, MemoryStore, FixedBars, FixedSignal>;

struct Harness {
    _dir: TempDir,
    broker: Arc<StubBroker>,
    store: Arc<MemoryStore>,
    signals: Arc<FixedSignal>,
    cycle: Cycle,
}

fn harness(state: TradingState, bars: Vec<Bar>, signal: FixedSignal) -> Harness {
    let dir = TempDir::new().unwrap();
    let config = Config::test(dir.path()).unwrap();
    let broker = Arc::new(StubBroker::new(dec!(4000)));
    let store = Arc::new(MemoryStore::with_state(state));
    let signals = Arc::new(signal);
    let cycle = TradingCycle::new(
        &config,
        broker.clone(),
        store.clone(),
        Arc::new(FixedBars(PriceSeries::new(bars))),
        signals.clone(),
    );
    Harness { _dir: dir, broker, store, signals, cycle }
}

fn p(value: Decimal) -> Price {
    Price::new(value).unwrap()
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 1, 12, 0, 0).unwrap()
}

/// Ten quiet 15m bars around `close`, all after `t0`.
fn quiet_bars(close: Decimal) -> Vec<Bar> {
    (1..=10)
        .map(|i| {
            Bar::new(t0() + Duration::minutes(15 * i), close, close + dec!(2), close - dec!(2), close, dec!(150))
        })
        .collect()
}

fn buy() -> ProposedSignal {
    ProposedSignal::Trade {
        side: Side::Long,
        entry: Some(p(dec!(4000))),
        stop_loss: p(dec!(3988)),
        take_profit: p(dec!(4020)),
        confidence: dec!(0.8),
    }
}

fn hold() -> ProposedSignal {
    ProposedSignal::Hold { confidence: dec!(0.6) }
}

fn open_order(id: &str) -> OrderSnapshot {
    OrderSnapshot {
        order_id: id.to_string(),
        status: OrderStatus::Open,
        filled_price: Decimal::ZERO,
        filled_time: None,
    }
}

/// Protected long at 4000 held both locally and at the broker.
fn protected_long(h: &Harness) {
    h.broker.insert_order(OrderSnapshot {
        order_id: "E-1".into(),
        status: OrderStatus::Filled,
        filled_price: dec!(4000),
        filled_time: Some(t0()),
    });
    h.broker.insert_order(open_order("S-1"));
    h.broker.insert_order(open_order("T-1"));
    h.broker.set_position(BrokerPosition::open(Side::Long, dec!(1), dec!(4000)));
}

fn protected_long_state() -> TradingState {
    let mut position = Position::open(Side::Long, p(dec!(4000)), t0(), Some("E-1".into()));
    position.set_stop(p(dec!(3988)), "S-1".into());
    position.set_take_profit(p(dec!(4020)), "T-1".into());
    TradingState { position, ..TradingState::new() }
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_flat_buy_opens_protected_long() {
    let h = harness(TradingState::new(), quiet_bars(dec!(4000)), FixedSignal::new(buy()));

    let report = h.cycle.run(true).await.unwrap();

    let state = h.store.snapshot().unwrap();
    assert_eq!(state.position.status, PositionStatus::Long);
    assert_eq!(state.position.entry_price, Some(p(dec!(4000))));
    assert_eq!(state.position.entry_order_id.as_deref(), Some("STUB-1"));
    assert_eq!(state.position.stop_order_id.as_deref(), Some("STUB-2"));
    assert_eq!(state.position.take_profit_order_id.as_deref(), Some("STUB-3"));
    assert_eq!(h.store.save_count(), 1);

    let placed = h.broker.placed_orders();
    assert_eq!(placed.len(), 3);
    assert_eq!(placed[0].1.kind, OrderKind::Market);
    assert_eq!(placed[0].1.side, OrderSide::Buy);
    assert_eq!(
        placed[1].1.kind,
        OrderKind::StopLimit { stop_price: p(dec!(3988)), limit_price: p(dec!(3987)) }
    );
    assert_eq!(placed[2].1.kind, OrderKind::Limit { price: p(dec!(4020)) });

    assert_eq!(report.status, PositionStatus::Long);
    assert_eq!(report.balance, Some(dec!(10000)));
    assert!(report.lines.iter().any(|l| l.starts_with("Opened LONG @ 4000")));
}

#[tokio::test]
async fn test_stop_filled_between_polls_closes_externally() {
    let mut state = protected_long_state();
    state.position.entry_price = Some(p(dec!(3825)));
    let h = harness(state, quiet_bars(dec!(3835)), FixedSignal::new(hold()));

    h.broker.insert_order(OrderSnapshot {
        order_id: "E-1".into(),
        status: OrderStatus::Filled,
        filled_price: dec!(3820),
        filled_time: Some(t0()),
    });
    h.broker.insert_order(open_order("S-1"));
    h.broker.insert_order(open_order("T-1"));
    h.broker.fill_order("S-1", dec!(3830));

    let report = h.cycle.run(true).await.unwrap();

    let state = h.store.snapshot().unwrap();
    assert!(state.position.is_flat());
    assert_eq!(state.ledger.total_trades(), 1);

    let trade = state.ledger.last().unwrap();
    assert_eq!(trade.entry_price, p(dec!(3820)));
    assert_eq!(trade.exit_price, p(dec!(3830)));
    assert_eq!(trade.profit_loss, dec!(1.0));
    assert_eq!(trade.reason, ExitReason::StopHit);
    assert_eq!(trade.note.as_deref(), Some("closed externally"));

    // Target was still working and must not outlive the position
    assert_eq!(h.broker.cancelled_orders(), vec!["T-1".to_string()]);
    assert!(h.broker.placed_orders().is_empty());

    assert_eq!(report.closed_trades.len(), 1);
    assert_eq!(report.realized_pnl(), dec!(1.0));
    assert!(report.lines[0].starts_with("Desync"));
}

#[tokio::test]
async fn test_unfilled_entry_clears_without_trade() {
    let mut position = Position::open(Side::Long, p(dec!(4000)), t0(), Some("E-1".into()));
    position.set_stop(p(dec!(3988)), "S-1".into());
    let h = harness(TradingState { position, ..TradingState::new() }, quiet_bars(dec!(4000)), FixedSignal::new(hold()));

    h.broker.insert_order(open_order("E-1"));
    h.broker.insert_order(open_order("S-1"));

    let report = h.cycle.run(true).await.unwrap();

    let state = h.store.snapshot().unwrap();
    assert!(state.position.is_flat());
    assert_eq!(state.ledger.total_trades(), 0);
    assert_eq!(h.broker.cancelled_orders(), vec!["E-1".to_string(), "S-1".to_string()]);
    assert!(report.closed_trades.is_empty());
    assert!(report.lines[0].contains("never filled"));
}

#[tokio::test]
async fn test_target_crossed_between_polls_closes_at_level() {
    let bars = vec![
        Bar::new(t0() + Duration::minutes(15), dec!(4000), dec!(4025), dec!(3995), dec!(4010), dec!(150)),
        Bar::new(t0() + Duration::minutes(30), dec!(4010), dec!(4012), dec!(3980), dec!(3990), dec!(150)),
    ];
    let h = harness(protected_long_state(), bars, FixedSignal::new(hold()));
    protected_long(&h);

    let report = h.cycle.run(true).await.unwrap();

    let state = h.store.snapshot().unwrap();
    assert!(state.position.is_flat());

    let trade = state.ledger.last().unwrap();
    assert_eq!(trade.reason, ExitReason::TargetHit);
    assert_eq!(trade.exit_price, p(dec!(4020)));
    assert_eq!(trade.exit_time, t0() + Duration::minutes(15));
    assert_eq!(trade.profit_loss, dec!(2.0));
    assert_eq!(trade.note, None);

    assert_eq!(h.broker.cancelled_orders(), vec!["S-1".to_string(), "T-1".to_string()]);
    assert!(h.broker.position().is_flat());
    assert!(report.lines.iter().any(|l| l.starts_with("Retroactive")));
}

#[tokio::test]
async fn test_rejected_reversal_exits_and_stays_flat() {
    let h = harness(
        protected_long_state(),
        quiet_bars(dec!(4000)),
        FixedSignal::new(ProposedSignal::Trade {
            side: Side::Short,
            entry: Some(p(dec!(4000))),
            stop_loss: p(dec!(4100)),
            take_profit: p(dec!(3990)),
            confidence: dec!(0.7),
        }),
    );
    protected_long(&h);
    h.broker.set_market_price(dec!(4004));

    let report = h.cycle.run(true).await.unwrap();

    let state = h.store.snapshot().unwrap();
    assert!(state.position.is_flat());

    let trade = state.ledger.last().unwrap();
    assert_eq!(trade.reason, ExitReason::Signal);
    assert_eq!(trade.exit_price, p(dec!(4004)));
    assert_eq!(trade.profit_loss, dec!(0.4));

    assert_eq!(h.broker.cancelled_orders(), vec!["S-1".to_string(), "T-1".to_string()]);
    assert!(h.broker.position().is_flat());
    assert_eq!(h.broker.placed_orders().len(), 1);
    assert!(report.lines.iter().any(|l| l.starts_with("Signal rejected (STOP_DISTANCE)")));
}

#[tokio::test]
async fn test_hold_while_long_closes_position() {
    let h = harness(protected_long_state(), quiet_bars(dec!(4000)), FixedSignal::new(hold()));
    protected_long(&h);

    h.cycle.run(true).await.unwrap();

    let state = h.store.snapshot().unwrap();
    assert!(state.position.is_flat());
    assert_eq!(state.ledger.last().unwrap().reason, ExitReason::Signal);
    assert!(h.broker.position().is_flat());
}

#[tokio::test]
async fn test_unknown_broker_position_adopted_and_protected() {
    let h = harness(TradingState::new(), quiet_bars(dec!(4000)), FixedSignal::new(buy()));
    h.broker.set_position(BrokerPosition::open(Side::Long, dec!(1), dec!(3990)));

    let report = h.cycle.run(true).await.unwrap();

    let state = h.store.snapshot().unwrap();
    assert_eq!(state.position.status, PositionStatus::Long);
    assert_eq!(state.position.entry_price, Some(p(dec!(3990))));
    assert_eq!(state.position.stop_loss, Some(p(dec!(3988))));
    assert_eq!(state.position.take_profit, Some(p(dec!(4020))));
    assert!(!state.position.missing_protection());

    // No new entry, only the two protective orders
    let placed = h.broker.placed_orders();
    assert_eq!(placed.len(), 2);
    assert!(placed.iter().all(|(_, r)| r.side == OrderSide::Sell));
    assert!(report.lines[0].starts_with("Inconsistent state: broker holds LONG"));
}

#[tokio::test]
async fn test_failed_open_is_saved_and_retried_next_cycle() {
    let h = harness(TradingState::new(), quiet_bars(dec!(4000)), FixedSignal::new(buy()));
    h.broker.fail_on(StubCall::PlaceOrder);

    let err = h.cycle.run(true).await.unwrap_err();
    assert!(matches!(
        err,
        DaemonError::Exec(ExecError::Broker { step: "open position", .. })
    ));
    assert_eq!(h.store.save_count(), 1);
    assert!(h.store.snapshot().unwrap().position.is_flat());

    h.cycle.run(true).await.unwrap();
    assert_eq!(h.store.snapshot().unwrap().position.status, PositionStatus::Long);
}

#[tokio::test]
async fn test_broker_down_leaves_record_untouched() {
    let state = protected_long_state();
    let h = harness(state.clone(), quiet_bars(dec!(4000)), FixedSignal::new(hold()));
    h.broker.set_fail_next(true);

    let err = h.cycle.run(true).await.unwrap_err();

    match err {
        DaemonError::Exec(e) => assert!(e.is_transient()),
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(h.store.snapshot().unwrap(), state);
    assert_eq!(h.signals.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_signal_failure_while_flat_is_idle() {
    let h = harness(TradingState::new(), quiet_bars(dec!(4000)), FixedSignal::failing());

    let report = h.cycle.run(true).await.unwrap();

    assert!(h.broker.placed_orders().is_empty());
    assert!(report.lines.is_empty());
    assert_eq!(report.status, PositionStatus::None);
}

#[tokio::test]
async fn test_balance_failure_does_not_abort() {
    let h = harness(TradingState::new(), quiet_bars(dec!(4000)), FixedSignal::new(hold()));
    h.broker.fail_on(StubCall::GetBalance);

    let report = h.cycle.run(true).await.unwrap();

    assert_eq!(report.balance, None);
    assert_eq!(h.store.save_count(), 1);
}

#[tokio::test]
async fn test_kill_switch_makes_no_calls() {
    let state = protected_long_state();
    let h = harness(state.clone(), quiet_bars(dec!(4000)), FixedSignal::new(hold()));
    // Any broker call would fail the cycle
    h.broker.set_fail_next(true);

    let report = h.cycle.run(false).await.unwrap();

    assert!(report.halted);
    assert_eq!(report.status, PositionStatus::Long);
    assert_eq!(h.store.save_count(), 0);
    assert_eq!(h.store.snapshot().unwrap(), state);
    assert_eq!(h.signals.calls.load(Ordering::SeqCst), 0);
    assert!(h.broker.placed_orders().is_empty());
}

#[tokio::test]
async fn test_file_backed_cycle() {
    let dir = TempDir::new().unwrap();
    let config = Config::test(dir.path()).unwrap();

    let bars: Vec<Bar> = quiet_bars(dec!(4000));
    std::fs::write(&config.runtime.bars_file, serde_json::to_string(&bars).unwrap()).unwrap();
    std::fs::write(
        &config.runtime.signal_file,
        "Breakout confirmed on volume.\n\nTRADE_DATA:\n{\"action\": \"buy\", \"entry_price\": 4000.0, \
         \"stop_loss\": 3988, \"take_profit\": 4020, \"confidence\": 80}",
    )
    .unwrap();

    let store = Arc::new(JsonFileStore::new(&config.runtime.state_file));
    let cycle = TradingCycle::new(
        &config,
        Arc::new(StubBroker::new(dec!(4000))),
        store.clone(),
        Arc::new(JsonBarsProvider::new(&config.runtime.bars_file)),
        Arc::new(AdvisoryTextSignalProvider::new(&config.runtime.signal_file)),
    );

    assert!(config.trading_enabled());
    let report = cycle.run(config.trading_enabled()).await.unwrap();
    assert_eq!(report.status, PositionStatus::Long);

    let persisted = store.load().await.unwrap();
    assert_eq!(persisted.position.status, PositionStatus::Long);
    assert_eq!(persisted.position.take_profit, Some(p(dec!(4020))));
    assert!(config.runtime.state_file.exists());
}
