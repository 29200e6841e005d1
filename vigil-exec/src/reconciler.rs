//! Position reconciliation against the broker.
//!
//! The broker is authoritative. Each cycle the local record is compared with
//! the broker's position and corrected:
//!
//! ```text
//! local  | broker   | outcome
//! -------+----------+------------------------------------------------
//! none   | none     | in sync
//! side   | same     | in sync (refresh P/L, flag missing protection)
//! side   | none     | closed externally (or phantom if entry never filled)
//! side   | opposite | closed externally, then adopt broker side
//! none   | side     | adopt broker side
//! ```
//!
//! State is only mutated after the broker calls that justify it succeeded.
//! A failed call returns an error and leaves the record for the next cycle.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use vigil_domain::{
    ClosedTrade, ContractSpec, ExitReason, OrderId, OrderSide, Position, Price, PriceSeries, Side,
    Symbol, TradingState,
};
use vigil_engine::{detect_crossing_since, LevelCrossing};

use crate::error::{BrokerError, ExecError, ExecResult};
use crate::ports::{
    BrokerGateway, BrokerPosition, OrderKind, OrderRequest, OrderSnapshot, OrderStatus,
};

/// Note attached to every trade closed outside the loop
pub const CLOSED_EXTERNALLY_NOTE: &str = "closed externally";

// =============================================================================
// Configuration
// =============================================================================

/// Instrument and broker settings for the reconciler.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Instrument traded
    pub symbol: Symbol,
    /// Contracts per order, multiplier and tick
    pub contract: ContractSpec,
    /// Distance between stop trigger and its limit price
    pub stop_limit_offset: Decimal,
    /// Per-call broker timeout
    pub broker_timeout: Duration,
}

// =============================================================================
// Outcome
// =============================================================================

/// Something reconciliation found or did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ReconcileEvent {
    /// Local record matches the broker
    InSync,
    /// Entry never filled; record cleared without a trade
    PhantomCleared {
        /// The unfilled entry order
        entry_order_id: Option<OrderId>,
    },
    /// Broker closed the position outside the loop
    ClosedExternally(ClosedTrade),
    /// Broker position with no local record; local overwritten
    Adopted {
        /// Side held at the broker
        side: Side,
        /// Entry price used for the record
        entry_price: Price,
        /// Contracts held at the broker
        contracts: Decimal,
    },
    /// Same side, unexpected size; local record kept
    SizeMismatch {
        /// Configured contracts
        expected: Decimal,
        /// Contracts the broker reports
        reported: Decimal,
    },
    /// Open without a stop-loss or take-profit order
    MissingProtection,
}

/// Everything reconciliation found this cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    /// Events in the order they happened
    pub events: Vec<ReconcileEvent>,
}

impl Reconciliation {
    /// Local record was corrected to match the broker
    pub fn desync(&self) -> bool {
        self.events.iter().any(|e| {
            matches!(
                e,
                ReconcileEvent::PhantomCleared { .. }
                    | ReconcileEvent::ClosedExternally(_)
                    | ReconcileEvent::Adopted { .. }
            )
        })
    }

    /// Trade recorded by an external closure, if any
    pub fn closed_trade(&self) -> Option<&ClosedTrade> {
        self.events.iter().find_map(|e| match e {
            ReconcileEvent::ClosedExternally(trade) => Some(trade),
            _ => None,
        })
    }
}

// =============================================================================
// Reconciler
// =============================================================================

/// Owns every broker interaction that changes the local position record.
pub struct PositionReconciler<B: BrokerGateway> {
    /// Broker port
    pub(crate) broker: Arc<B>,
    /// Instrument settings
    pub(crate) config: ReconcilerConfig,
}

impl<B: BrokerGateway> PositionReconciler<B> {
    /// Create a new reconciler.
    pub fn new(broker: Arc<B>, config: ReconcilerConfig) -> Self {
        Self { broker, config }
    }

    /// Instrument settings.
    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Position size in base units.
    pub fn position_size(&self) -> Decimal {
        self.config.contract.position_size()
    }

    /// Account balance.
    pub async fn balance(&self) -> ExecResult<Decimal> {
        self.call("get balance", None, self.broker.get_balance()).await
    }

    /// Compare the local record with the broker and correct it.
    ///
    /// `last_price` is the latest known market price, used when the broker
    /// reports no fill or entry price.
    pub async fn reconcile(
        &self,
        state: &mut TradingState,
        last_price: Option<Price>,
    ) -> ExecResult<Reconciliation> {
        let broker = self
            .call("get position", None, self.broker.get_position(&self.config.symbol))
            .await?;
        let broker_side = if broker.is_flat() { None } else { broker.side };

        let mut events = Vec::new();

        match (state.position.side(), broker_side) {
            (None, None) => events.push(ReconcileEvent::InSync),

            (Some(local), Some(remote)) if local == remote => {
                let expected = self.config.contract.contracts().as_decimal();
                if broker.contracts != expected {
                    warn!(
                        side = %local,
                        %expected,
                        reported = %broker.contracts,
                        "Broker size differs from configured size, keeping local record"
                    );
                    events.push(ReconcileEvent::SizeMismatch { expected, reported: broker.contracts });
                }

                self.refresh_unrealized(&mut state.position, &broker, last_price);

                if state.position.missing_protection() {
                    warn!(
                        side = %local,
                        stop_order = ?state.position.stop_order_id,
                        take_profit_order = ?state.position.take_profit_order_id,
                        "Position is missing protective orders"
                    );
                    events.push(ReconcileEvent::MissingProtection);
                } else {
                    events.push(ReconcileEvent::InSync);
                }
            },

            (Some(local), None) => {
                warn!(side = %local, "Desync: broker reports no position");
                events.push(self.close_externally(state, last_price).await?);
            },

            (Some(local), Some(remote)) => {
                warn!(local = %local, broker = %remote, "Desync: broker holds the opposite side");
                events.push(self.close_externally(state, last_price).await?);
                events.push(self.adopt(state, &broker, remote, last_price)?);
                events.push(ReconcileEvent::MissingProtection);
            },

            (None, Some(remote)) => {
                events.push(self.adopt(state, &broker, remote, last_price)?);
                events.push(ReconcileEvent::MissingProtection);
            },
        }

        Ok(Reconciliation { events })
    }

    /// Close the record after the broker closed the position on its own.
    async fn close_externally(
        &self,
        state: &mut TradingState,
        last_price: Option<Price>,
    ) -> ExecResult<ReconcileEvent> {
        let entry_order_id = state.position.entry_order_id.clone();
        let stop_order_id = state.position.stop_order_id.clone();
        let take_profit_order_id = state.position.take_profit_order_id.clone();

        // 1. Did the entry ever fill?
        let mut entry_fill = None;
        if let Some(id) = &entry_order_id {
            match self.find_order("get entry order", id).await? {
                Some(entry) if entry.status != OrderStatus::Filled => {
                    let mut leftovers = Vec::new();
                    if entry.is_open() {
                        leftovers.push(id.clone());
                    }
                    leftovers.extend(state.position.protective_order_ids());
                    for order_id in &leftovers {
                        self.cancel_if_open(order_id).await?;
                    }

                    info!(
                        entry_order = %id,
                        status = ?entry.status,
                        "Entry order never filled, clearing position without a trade"
                    );
                    state.position.discard();
                    return Ok(ReconcileEvent::PhantomCleared { entry_order_id });
                },
                // Zero means the broker omitted it; keep the local entry
                Some(entry) => entry_fill = entry.fill_price(),
                None => warn!(
                    entry_order = %id,
                    "Entry order unknown to broker, keeping the recorded entry price"
                ),
            }
        }

        let entry_price = entry_fill.or(state.position.entry_price).ok_or_else(|| {
            ExecError::InconsistentState("open position has no entry price".to_string())
        })?;

        // 2. Exit price: stop fill, then target fill, then market
        let mut exit: Option<(Price, DateTime<Utc>, ExitReason)> = None;
        let mut lingering = Vec::new();
        let protective = [
            (stop_order_id, ExitReason::StopHit, "get stop order"),
            (take_profit_order_id, ExitReason::TargetHit, "get take-profit order"),
        ];
        for (order_id, reason, step) in protective {
            let Some(order_id) = order_id else { continue };
            let Some(snapshot) = self.find_order(step, &order_id).await? else {
                warn!(%order_id, "Protective order unknown to broker, no fill information");
                continue;
            };
            match snapshot.fill_price() {
                Some(price) if exit.is_none() => {
                    exit = Some((price, snapshot.filled_time.unwrap_or_else(Utc::now), reason));
                },
                _ if snapshot.is_open() => lingering.push(order_id),
                _ => {},
            }
        }

        let (exit_price, exit_time, reason) = match (exit, last_price) {
            (Some(exit), _) => exit,
            (None, Some(price)) => (price, Utc::now(), ExitReason::ClosedExternally),
            (None, None) => {
                warn!(%entry_price, "No fill or market price known, recording exit at entry");
                (entry_price, Utc::now(), ExitReason::ClosedExternally)
            },
        };

        // 3. Nothing may stay working once the record is flat
        for order_id in &lingering {
            self.cancel_order("cancel lingering order", order_id).await?;
        }

        // 4. Record
        state.position.entry_price = Some(entry_price);
        let trade = state.position.close(
            exit_price,
            exit_time,
            self.position_size(),
            reason,
            Some(CLOSED_EXTERNALLY_NOTE.to_string()),
        )?;
        state.ledger.append(trade.clone());

        info!(
            side = %trade.side,
            entry = %trade.entry_price,
            exit = %trade.exit_price,
            pnl = %trade.profit_loss,
            %reason,
            "Position closed externally"
        );

        Ok(ReconcileEvent::ClosedExternally(trade))
    }

    /// Overwrite the local record with a broker position we have no record of.
    fn adopt(
        &self,
        state: &mut TradingState,
        broker: &BrokerPosition,
        side: Side,
        last_price: Option<Price>,
    ) -> ExecResult<ReconcileEvent> {
        let size = self.config.contract.size_of(broker.contracts);

        let entry_price = Price::from_reported(broker.avg_entry_price)
            .or_else(|| back_calculate_entry(side, last_price, broker.unrealized_pnl, size))
            .or(last_price)
            .ok_or_else(|| {
                ExecError::InconsistentState(format!(
                    "broker holds {} {} contracts with no entry price and no market price is known",
                    broker.contracts, side
                ))
            })?;

        error!(
            %side,
            contracts = %broker.contracts,
            %entry_price,
            "Broker holds a position with no local record, adopting broker state"
        );

        let mut position = Position::open(side, entry_price, Utc::now(), None);
        let computed = last_price.map(|p| position.pnl_at(p, size));
        position.unrealized_pnl = broker.unrealized_pnl.or(computed).unwrap_or_default();
        state.position = position;

        Ok(ReconcileEvent::Adopted { side, entry_price, contracts: broker.contracts })
    }

    fn refresh_unrealized(
        &self,
        position: &mut Position,
        broker: &BrokerPosition,
        last_price: Option<Price>,
    ) {
        let computed = last_price.map(|p| position.pnl_at(p, self.position_size()));
        if let Some(pnl) = broker.unrealized_pnl.or(computed) {
            position.unrealized_pnl = pnl;
        }
    }

    /// Close the position if a level was touched between polls.
    ///
    /// Only meaningful while the broker still holds the position: protective
    /// orders are cancelled, the position is closed at market, and the trade
    /// is recorded at the touched level.
    pub async fn check_levels(
        &self,
        state: &mut TradingState,
        series: &PriceSeries,
    ) -> ExecResult<Option<ClosedTrade>> {
        let (side, entry_time) = match (state.position.side(), state.position.entry_time) {
            (Some(side), Some(time)) => (side, time),
            _ => return Ok(None),
        };

        let crossing = detect_crossing_since(
            series,
            entry_time,
            side,
            state.position.stop_loss,
            state.position.take_profit,
        );
        let (level, time, reason) = match crossing {
            LevelCrossing::None => return Ok(None),
            LevelCrossing::StopHit { price, time } => (price, time, ExitReason::StopHit),
            LevelCrossing::TargetHit { price, time } => (price, time, ExitReason::TargetHit),
        };

        warn!(%side, %level, %time, %reason, "Level crossed between polls, closing position");

        for order_id in state.position.protective_order_ids() {
            self.cancel_order("cancel protective order", &order_id).await?;
            state.position.forget_order(&order_id);
        }

        let order_id = self.place("close position", side.exit_action(), OrderKind::Market).await?;

        let trade = state.position.close(level, time, self.position_size(), reason, None)?;
        state.ledger.append(trade.clone());

        info!(%order_id, %side, exit = %level, pnl = %trade.profit_loss, %reason, "Position closed on crossed level");
        Ok(Some(trade))
    }

    // =========================================================================
    // Broker call helpers
    // =========================================================================

    /// Run a broker call under the configured timeout, attaching step context.
    pub(crate) async fn call<T, F>(
        &self,
        step: &'static str,
        order_id: Option<&str>,
        fut: F,
    ) -> ExecResult<T>
    where
        F: Future<Output = Result<T, BrokerError>>,
    {
        match tokio::time::timeout(self.config.broker_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => {
                error!(step, order_id = order_id.unwrap_or("-"), error = %source, "Broker call failed");
                Err(ExecError::Broker { step, order_id: order_id.map(str::to_string), source })
            },
            Err(_) => {
                let secs = self.config.broker_timeout.as_secs();
                error!(step, order_id = order_id.unwrap_or("-"), secs, "Broker call timed out");
                Err(ExecError::Timeout { step, order_id: order_id.map(str::to_string), secs })
            },
        }
    }

    /// Cancel an order; an order the broker no longer knows counts as cancelled.
    pub(crate) async fn cancel_order(&self, step: &'static str, order_id: &str) -> ExecResult<()> {
        match self.call(step, Some(order_id), self.broker.cancel_order(order_id)).await {
            Ok(()) => {
                info!(%order_id, "Order cancelled");
                Ok(())
            },
            Err(ExecError::Broker { source: BrokerError::OrderNotFound(_), .. }) => {
                warn!(%order_id, "Order unknown to broker, treating as cancelled");
                Ok(())
            },
            Err(e) => Err(e),
        }
    }

    /// Look an order up; `None` when the broker no longer knows it.
    async fn find_order(&self, step: &'static str, order_id: &str) -> ExecResult<Option<OrderSnapshot>> {
        match self.call(step, Some(order_id), self.broker.get_order(order_id)).await {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(ExecError::Broker { source: BrokerError::OrderNotFound(_), .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn cancel_if_open(&self, order_id: &str) -> ExecResult<()> {
        match self.find_order("get order", order_id).await? {
            Some(snapshot) if snapshot.is_open() => {
                self.cancel_order("cancel leftover order", order_id).await
            },
            _ => Ok(()),
        }
    }

    /// Submit an order for the configured contract count.
    pub(crate) async fn place(
        &self,
        step: &'static str,
        side: OrderSide,
        kind: OrderKind,
    ) -> ExecResult<OrderId> {
        let request = OrderRequest {
            client_order_id: Uuid::now_v7().to_string(),
            side,
            kind,
            contracts: self.config.contract.contracts(),
        };

        let order_id = self
            .call(step, None, self.broker.place_order(&self.config.symbol, &request))
            .await?;

        info!(
            %order_id,
            client_order_id = %request.client_order_id,
            %side,
            ?kind,
            contracts = %request.contracts,
            "Order placed"
        );
        Ok(order_id)
    }
}

/// Entry implied by a mark price and unrealized P/L.
///
/// Long: `mark - pnl / size`, Short: `mark + pnl / size`
fn back_calculate_entry(
    side: Side,
    mark: Option<Price>,
    unrealized_pnl: Option<Decimal>,
    size: Decimal,
) -> Option<Price> {
    let (mark, pnl) = (mark?, unrealized_pnl?);
    if size.is_zero() {
        return None;
    }
    let per_unit = pnl / size;
    let entry = match side {
        Side::Long => mark.as_decimal() - per_unit,
        Side::Short => mark.as_decimal() + per_unit,
    };
    Price::new(entry).ok()
}

// =============================================================================
// Tests
// =============================================================================
