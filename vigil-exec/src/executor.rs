//! Executor: turns engine decisions into broker calls.
//!
//! Actions run in order. The first failure aborts the rest; steps already
//! completed are not rolled back and are reflected in the local record, so
//! the next cycle's reconciliation picks up from there.
//!
//! # Flow
//!
//! ```text
//! Engine Decision → Executor → Broker → local record updated per confirmed step
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use vigil_domain::{ClosedTrade, ExitReason, OrderId, Position, Price, Side, TradingState};
use vigil_engine::EngineAction;

use crate::error::{ExecError, ExecResult};
use crate::ports::{BrokerGateway, OrderKind};
use crate::reconciler::PositionReconciler;

// =============================================================================
// Execution Result
// =============================================================================

/// Result of executing an engine action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ActionResult {
    /// Orders confirmed cancelled
    OrdersCancelled {
        /// Cancelled order IDs
        order_ids: Vec<OrderId>,
    },
    /// Position opened at market
    PositionOpened {
        /// Side opened
        side: Side,
        /// Entry order
        order_id: OrderId,
        /// Fill price recorded as entry
        entry_price: Price,
    },
    /// Position closed and trade recorded
    PositionClosed(ClosedTrade),
    /// Protective orders placed (only the ones that were missing)
    ProtectionPlaced {
        /// New stop-loss order
        stop_order_id: Option<OrderId>,
        /// New take-profit order
        take_profit_order_id: Option<OrderId>,
    },
}

// =============================================================================
// Executor
// =============================================================================

impl<B: BrokerGateway> PositionReconciler<B> {
    /// Execute a list of engine actions against the broker.
    ///
    /// Actions are executed in order. If one fails, subsequent actions
    /// are not executed.
    ///
    /// `last_price` is used as the fill price only when the broker has not
    /// confirmed one.
    pub async fn execute(
        &self,
        state: &mut TradingState,
        actions: &[EngineAction],
        last_price: Option<Price>,
    ) -> ExecResult<Vec<ActionResult>> {
        let mut results = Vec::with_capacity(actions.len());

        for action in actions {
            let result = self.execute_action(state, action, last_price).await?;
            results.push(result);
        }

        Ok(results)
    }

    /// Execute a single engine action.
    async fn execute_action(
        &self,
        state: &mut TradingState,
        action: &EngineAction,
        last_price: Option<Price>,
    ) -> ExecResult<ActionResult> {
        match action {
            EngineAction::CancelStaleOrders => {
                let order_ids = self
                    .call(
                        "list open orders",
                        None,
                        self.broker.list_open_orders(&self.config.symbol),
                    )
                    .await?;
                for order_id in &order_ids {
                    self.cancel_order("cancel stale order", order_id).await?;
                    state.position.forget_order(order_id);
                }
                if !order_ids.is_empty() {
                    info!(count = order_ids.len(), "Stale orders cancelled");
                }
                Ok(ActionResult::OrdersCancelled { order_ids })
            },

            EngineAction::CancelOrders { order_ids } => {
                for order_id in order_ids {
                    self.cancel_order("cancel protective order", order_id).await?;
                    state.position.forget_order(order_id);
                }
                Ok(ActionResult::OrdersCancelled { order_ids: order_ids.clone() })
            },

            EngineAction::ClosePosition { side, reason } => {
                self.execute_close(state, *side, *reason, last_price).await
            },

            EngineAction::OpenPosition { side } => self.execute_open(state, *side, last_price).await,

            EngineAction::PlaceProtectiveOrders { side, stop_loss, take_profit } => {
                self.execute_protection(state, *side, *stop_loss, *take_profit).await
            },
        }
    }

    async fn execute_close(
        &self,
        state: &mut TradingState,
        side: Side,
        reason: ExitReason,
        last_price: Option<Price>,
    ) -> ExecResult<ActionResult> {
        if state.position.side() != Some(side) {
            return Err(ExecError::InconsistentState(format!(
                "asked to close {} but local position is {}",
                side, state.position.status
            )));
        }

        info!(%side, %reason, "Closing position");
        let order_id = self.place("close position", side.exit_action(), OrderKind::Market).await?;

        // The close is confirmed; only the price may still be unknown
        let (fill_price, fill_time) = match self.confirmed_fill(&order_id).await {
            Some(fill) => fill,
            None => {
                let price = last_price.or(state.position.entry_price).ok_or_else(|| {
                    ExecError::InconsistentState("closed position has no entry price".to_string())
                })?;
                warn!(%order_id, %price, "Close fill not confirmed yet, using last known price");
                (price, Utc::now())
            },
        };

        let trade = state.position.close(fill_price, fill_time, self.position_size(), reason, None)?;
        state.ledger.append(trade.clone());

        info!(
            %order_id,
            side = %trade.side,
            entry = %trade.entry_price,
            exit = %trade.exit_price,
            pnl = %trade.profit_loss,
            "Position closed"
        );
        Ok(ActionResult::PositionClosed(trade))
    }

    async fn execute_open(
        &self,
        state: &mut TradingState,
        side: Side,
        last_price: Option<Price>,
    ) -> ExecResult<ActionResult> {
        if !state.position.is_flat() {
            return Err(ExecError::InconsistentState(format!(
                "asked to open {} while {} is open",
                side, state.position.status
            )));
        }

        info!(%side, "Opening position");
        let order_id = self.place("open position", side.entry_action(), OrderKind::Market).await?;

        let (entry_price, entry_time) = match self.confirmed_fill(&order_id).await {
            Some(fill) => fill,
            None => {
                // Reconciliation adopts the broker position next cycle
                let price = last_price.ok_or_else(|| {
                    ExecError::InconsistentState(format!(
                        "entry order {} placed but no fill price is known",
                        order_id
                    ))
                })?;
                warn!(%order_id, %price, "Entry fill not confirmed yet, using last known price");
                (price, Utc::now())
            },
        };

        state.position = Position::open(side, entry_price, entry_time, Some(order_id.clone()));

        info!(%order_id, %side, %entry_price, "Position opened");
        Ok(ActionResult::PositionOpened { side, order_id, entry_price })
    }

    async fn execute_protection(
        &self,
        state: &mut TradingState,
        side: Side,
        stop_loss: Price,
        take_profit: Price,
    ) -> ExecResult<ActionResult> {
        if state.position.side() != Some(side) {
            return Err(ExecError::InconsistentState(format!(
                "asked to protect {} but local position is {}",
                side, state.position.status
            )));
        }

        let tick = self.config.contract.tick_size();
        let exit = side.exit_action();
        let mut placed_stop = None;
        let mut placed_target = None;

        if state.position.stop_order_id.is_none() {
            let stop_price = stop_loss.round_to_tick(tick);
            let limit = match side {
                Side::Long => stop_price.as_decimal() - self.config.stop_limit_offset,
                Side::Short => stop_price.as_decimal() + self.config.stop_limit_offset,
            };
            let limit_price = Price::new(limit)?.round_to_tick(tick);

            let order_id = self
                .place("place stop-loss", exit, OrderKind::StopLimit { stop_price, limit_price })
                .await?;
            state.position.set_stop(stop_price, order_id.clone());
            info!(%order_id, stop = %stop_price, limit = %limit_price, "Stop-loss placed");
            placed_stop = Some(order_id);
        }

        if state.position.take_profit_order_id.is_none() {
            let price = take_profit.round_to_tick(tick);

            let order_id = self.place("place take-profit", exit, OrderKind::Limit { price }).await?;
            state.position.set_take_profit(price, order_id.clone());
            info!(%order_id, target = %price, "Take-profit placed");
            placed_target = Some(order_id);
        }

        Ok(ActionResult::ProtectionPlaced {
            stop_order_id: placed_stop,
            take_profit_order_id: placed_target,
        })
    }

    /// Broker-confirmed fill price and time of an order, if available.
    async fn confirmed_fill(&self, order_id: &str) -> Option<(Price, DateTime<Utc>)> {
        match self.call("get fill", Some(order_id), self.broker.get_order(order_id)).await {
            Ok(snapshot) => {
                let time = snapshot.filled_time.unwrap_or_else(Utc::now);
                snapshot.fill_price().map(|price| (price, time))
            },
            Err(e) => {
                warn!(%order_id, error = %e, "Could not read fill");
                None
            },
        }
    }
}

/// Net realized P/L of the trades in a slice of results.
pub fn realized_pnl(results: &[ActionResult]) -> Decimal {
    results
        .iter()
        .filter_map(|r| match r {
            ActionResult::PositionClosed(trade) => Some(trade.profit_loss),
            _ => None,
        })
        .sum()
}

// =============================================================================
// Tests
// =============================================================================
