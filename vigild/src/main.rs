//! Vigil Daemon
//!
//! Runs one reconciliation and trading cycle, then exits. Invoke it from a
//! scheduler (cron, systemd timer); runs must not overlap on one state file.
//!
//! # Usage
//!
//! ```bash
//! # Dry run against the in-process stub broker
//! cargo run -p vigild
//!
//! # Halt trading without touching the scheduler
//! touch STOP_TRADING
//! ```
//!
//! # Environment Variables
//!
//! - `VIGIL_ENV`: Environment (test, development, production; production is refused
//!   while only the stub broker is wired)
//! - `VIGIL_PRODUCT_ID`: Instrument (default: ET-31OCT25-CDE)
//! - `VIGIL_CONTRACTS`, `VIGIL_CONTRACT_MULTIPLIER`, `VIGIL_TICK_SIZE`: Contract shape
//! - `VIGIL_MIN_STOP_PCT` .. `VIGIL_MAX_RR`: Validation bounds
//! - `VIGIL_STATE_FILE`: Persisted state (default: trading_state.json)
//! - `VIGIL_BARS_FILE`, `VIGIL_SIGNAL_FILE`: Replay inputs
//! - `VIGIL_KILL_SWITCH_FILE`: Halt flag (default: STOP_TRADING)

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vigil_domain::Symbol;
use vigil_exec::{PriceSeriesProvider, StubBroker};
use vigil_store::JsonFileStore;
use vigild::{AdvisoryTextSignalProvider, Config, JsonBarsProvider, TradingCycle};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("vigild=info".parse()?))
        .init();

    // Load configuration
    let config = Config::from_env()?;
    let trading_enabled = config.trading_enabled();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        symbol = %config.instrument.symbol,
        state_file = %config.runtime.state_file.display(),
        trading_enabled,
        "Vigil Daemon"
    );

    config.ensure_stub_broker_allowed()?;

    let prices = Arc::new(JsonBarsProvider::new(&config.runtime.bars_file));
    let broker = Arc::new(StubBroker::new(
        stub_market_price(&prices, &config.instrument.symbol).await,
    ));
    let store = Arc::new(JsonFileStore::new(&config.runtime.state_file));
    let signals = Arc::new(AdvisoryTextSignalProvider::new(&config.runtime.signal_file));

    let cycle = TradingCycle::new(&config, broker, store, prices, signals);
    let report = cycle.run(trading_enabled).await?;

    println!("{}", report);
    Ok(())
}

/// The stub broker fills market orders at the latest replayed close.
async fn stub_market_price(prices: &JsonBarsProvider, symbol: &Symbol) -> Decimal {
    match prices.get_bars(symbol, None, 1).await {
        Ok(series) => series.last_close().unwrap_or(Decimal::ZERO),
        Err(_) => Decimal::ZERO,
    }
}
