//! One trading cycle.
//!
//! # Flow
//!
//! ```text
//! load state → fetch bars → reconcile with broker → retroactive level check
//!            → advisory signal → validate + decide → execute → save state
//! ```
//!
//! The scheduler invokes one cycle at a time against a given state file.
//! State is saved whenever the broker phase ran, even if it failed partway,
//! so completed steps are never lost.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use vigil_domain::{Price, PriceSeries, ProposedSignal, SignalContext, TradingState};
use vigil_engine::Engine;
use vigil_exec::{BrokerGateway, PositionReconciler, PriceSeriesProvider, SignalProvider};
use vigil_store::StateStore;

use crate::config::Config;
use crate::error::{DaemonError, DaemonResult};
use crate::report::CycleReport;

/// Wires the collaborators for one cycle.
pub struct TradingCycle<B, S, P, G>
where
    B: BrokerGateway,
    S: StateStore,
    P: PriceSeriesProvider,
    G: SignalProvider,
{
    reconciler: PositionReconciler<B>,
    engine: Engine,
    store: Arc<S>,
    prices: Arc<P>,
    signals: Arc<G>,
    bar_count: usize,
}

impl<B, S, P, G> TradingCycle<B, S, P, G>
where
    B: BrokerGateway,
    S: StateStore,
    P: PriceSeriesProvider,
    G: SignalProvider,
{
    /// Create a cycle from configuration and collaborators.
    pub fn new(config: &Config, broker: Arc<B>, store: Arc<S>, prices: Arc<P>, signals: Arc<G>) -> Self {
        Self {
            reconciler: PositionReconciler::new(broker, config.reconciler_config()),
            engine: Engine::new(config.validation),
            store,
            prices,
            signals,
            bar_count: config.runtime.bar_count,
        }
    }

    /// Run one cycle.
    ///
    /// With `trading_enabled` false nothing touches the broker and the state
    /// is left as persisted.
    pub async fn run(&self, trading_enabled: bool) -> DaemonResult<CycleReport> {
        let symbol = self.reconciler.config().symbol.clone();
        let mut state = self.store.load().await?;

        if !trading_enabled {
            warn!(%symbol, "Kill switch active, trading halted");
            return Ok(CycleReport::halted(symbol, &state));
        }

        let series = self
            .prices
            .get_bars(&symbol, None, self.bar_count)
            .await
            .map_err(DaemonError::PriceData)?;
        let last_price = series.last_close().and_then(|c| Price::new(c).ok());
        if last_price.is_none() {
            warn!(%symbol, bars = series.len(), "No usable close in price data");
        }

        let mut report = CycleReport::new(symbol, &state);
        report.last_price = series.last_close();

        let recorded_before = state.ledger.trades().len();
        let outcome = self.trade(&mut state, &series, last_price, &mut report).await;
        let saved = self.store.save(&state).await;

        if let Err(e) = outcome {
            for trade in &state.ledger.trades()[recorded_before..] {
                warn!(
                    side = %trade.side,
                    pnl = %trade.profit_loss,
                    reason = %trade.reason,
                    "Trade recorded before cycle failure"
                );
            }
            if let Err(save_error) = saved {
                error!(error = %save_error, "State not saved after cycle failure");
            }
            error!(error = %e, "Cycle aborted");
            return Err(e);
        }
        saved?;

        report.balance = match self.reconciler.balance().await {
            Ok(balance) => Some(balance),
            Err(e) => {
                warn!(error = %e, "Balance unavailable");
                None
            },
        };
        report.snapshot(&state);

        info!(
            status = %report.status,
            closed = report.closed_trades.len(),
            realized_pnl = %report.realized_pnl(),
            total_trades = report.stats.total_trades,
            "Cycle complete"
        );
        Ok(report)
    }

    /// Broker phase: everything between load and save.
    async fn trade(
        &self,
        state: &mut TradingState,
        series: &PriceSeries,
        last_price: Option<Price>,
        report: &mut CycleReport,
    ) -> DaemonResult<()> {
        let reconciliation = self.reconciler.reconcile(state, last_price).await?;
        for event in &reconciliation.events {
            report.reconciled(event);
        }

        // A desync already rewrote the record from broker truth
        if !reconciliation.desync() {
            if let Some(trade) = self.reconciler.check_levels(state, series).await? {
                report.level_crossed(&trade);
            }
        }

        let signal = self.signal(state, series).await;

        let evaluation = self.engine.evaluate(&state.position, &signal, series);
        report.decided(&evaluation.decision);
        debug!(
            kind = ?evaluation.decision.kind,
            actions = evaluation.decision.actions.len(),
            "Decision"
        );

        if evaluation.decision.is_noop() {
            return Ok(());
        }

        let results = self.reconciler.execute(state, &evaluation.decision.actions, last_price).await?;
        for result in &results {
            report.executed(result);
        }
        Ok(())
    }

    /// Ask the advisor; any failure counts as a malformed signal.
    async fn signal(&self, state: &TradingState, series: &PriceSeries) -> ProposedSignal {
        let context = SignalContext {
            symbol: self.reconciler.config().symbol.clone(),
            status: state.position.status,
            entry_price: state.position.entry_price,
            last_price: series.last_close(),
            as_of: Utc::now(),
        };

        let signal = match self.signals.get_signal(&context).await {
            Ok(signal) => signal,
            Err(e) => ProposedSignal::Malformed { reason: format!("signal provider failed: {}", e) },
        };

        match &signal {
            ProposedSignal::Malformed { reason } => {
                warn!(%reason, "Malformed signal, holding");
            },
            _ => info!(action = %signal.action(), confidence = %signal.confidence(), "Signal"),
        }
        signal
    }
}
