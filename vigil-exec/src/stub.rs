//! Stub broker for testing.
//!
//! Simulates a single-instrument futures account without making real API
//! calls. Market orders fill immediately at the configured price and net
//! against the position; limit and stop-limit orders rest until a test fills
//! or cancels them.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use vigil_domain::{OrderId, OrderSide, Side, Symbol};

use crate::error::BrokerError;
use crate::ports::{BrokerGateway, BrokerPosition, OrderKind, OrderRequest, OrderSnapshot, OrderStatus};

/// Broker call that can be made to fail once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubCall {
    /// `get_position`
    GetPosition,
    /// `get_order`
    GetOrder,
    /// `place_order`
    PlaceOrder,
    /// `cancel_order`
    CancelOrder,
    /// `list_open_orders`
    ListOpenOrders,
    /// `get_balance`
    GetBalance,
}

#[derive(Debug)]
struct StubState {
    market_price: Decimal,
    balance: Decimal,
    position: BrokerPosition,
    orders: HashMap<OrderId, OrderSnapshot>,
    placed: Vec<(OrderId, OrderRequest)>,
    cancelled: Vec<OrderId>,
    order_counter: u64,
    fail_next: bool,
    fail_on: Option<StubCall>,
    latency: Option<Duration>,
}

/// Stub broker for testing.
pub struct StubBroker {
    state: Mutex<StubState>,
}

impl StubBroker {
    /// Create a flat stub broker quoting `market_price`.
    pub fn new(market_price: Decimal) -> Self {
        Self {
            state: Mutex::new(StubState {
                market_price,
                balance: Decimal::new(10_000, 0),
                position: BrokerPosition::flat(),
                orders: HashMap::new(),
                placed: Vec::new(),
                cancelled: Vec::new(),
                order_counter: 0,
                fail_next: false,
                fail_on: None,
                latency: None,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, StubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the price market orders fill at.
    pub fn set_market_price(&self, price: Decimal) {
        self.state().market_price = price;
    }

    /// Set the account balance.
    pub fn set_balance(&self, balance: Decimal) {
        self.state().balance = balance;
    }

    /// Overwrite the broker-side position.
    pub fn set_position(&self, position: BrokerPosition) {
        self.state().position = position;
    }

    /// Current broker-side position.
    pub fn position(&self) -> BrokerPosition {
        self.state().position.clone()
    }

    /// Register an order the broker knows about.
    pub fn insert_order(&self, snapshot: OrderSnapshot) {
        self.state().orders.insert(snapshot.order_id.clone(), snapshot);
    }

    /// Fill a resting order at `price` and flatten the position, as a
    /// protective order triggering between polls would.
    pub fn fill_order(&self, order_id: &str, price: Decimal) {
        let mut state = self.state();
        if let Some(order) = state.orders.get_mut(order_id) {
            order.status = OrderStatus::Filled;
            order.filled_price = price;
            order.filled_time = Some(Utc::now());
        }
        state.position = BrokerPosition::flat();
    }

    /// Configure the next broker call to fail.
    pub fn set_fail_next(&self, fail: bool) {
        self.state().fail_next = fail;
    }

    /// Configure the next call of one kind to fail.
    pub fn fail_on(&self, call: StubCall) {
        self.state().fail_on = Some(call);
    }

    /// Delay every call, to exercise timeouts.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.state().latency = latency;
    }

    /// Orders placed so far, oldest first.
    pub fn placed_orders(&self) -> Vec<(OrderId, OrderRequest)> {
        self.state().placed.clone()
    }

    /// Orders cancelled so far, oldest first.
    pub fn cancelled_orders(&self) -> Vec<OrderId> {
        self.state().cancelled.clone()
    }

    /// Snapshot of a known order.
    pub fn order(&self, order_id: &str) -> Option<OrderSnapshot> {
        self.state().orders.get(order_id).cloned()
    }

    /// Generate a unique order ID.
    fn next_order_id(state: &mut StubState) -> OrderId {
        state.order_counter += 1;
        format!("STUB-{}", state.order_counter)
    }

    /// Apply latency, then check if we should fail this call.
    async fn enter(&self, call: StubCall) -> Result<(), BrokerError> {
        let latency = self.state().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state();
        let targeted = state.fail_on == Some(call);
        if state.fail_next || targeted {
            state.fail_next = false; // Reset after check
            if targeted {
                state.fail_on = None;
            }
            return Err(BrokerError::Unavailable(format!("Simulated {:?} failure", call)));
        }
        Ok(())
    }

    /// Net a market fill against the position.
    fn apply_fill(state: &mut StubState, side: OrderSide, contracts: Decimal) {
        let signed = |p: &BrokerPosition| match p.side {
            Some(Side::Long) => p.contracts,
            Some(Side::Short) => -p.contracts,
            None => Decimal::ZERO,
        };

        let before = signed(&state.position);
        let delta = match side {
            OrderSide::Buy => contracts,
            OrderSide::Sell => -contracts,
        };
        let after = before + delta;

        state.position = if after.is_zero() {
            BrokerPosition::flat()
        } else {
            let side = if after > Decimal::ZERO { Side::Long } else { Side::Short };
            let reopened = before.is_zero() || before.is_sign_positive() != after.is_sign_positive();
            let avg_entry_price =
                if reopened { state.market_price } else { state.position.avg_entry_price };
            BrokerPosition::open(side, after.abs(), avg_entry_price)
        };
    }
}

#[async_trait]
impl BrokerGateway for StubBroker {
    async fn get_position(&self, _symbol: &Symbol) -> Result<BrokerPosition, BrokerError> {
        self.enter(StubCall::GetPosition).await?;
        Ok(self.state().position.clone())
    }

    async fn get_order(&self, order_id: &str) -> Result<OrderSnapshot, BrokerError> {
        self.enter(StubCall::GetOrder).await?;
        self.state()
            .orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| BrokerError::OrderNotFound(order_id.to_string()))
    }

    async fn place_order(
        &self,
        _symbol: &Symbol,
        request: &OrderRequest,
    ) -> Result<OrderId, BrokerError> {
        self.enter(StubCall::PlaceOrder).await?;

        let mut state = self.state();
        let order_id = Self::next_order_id(&mut state);

        let snapshot = match request.kind {
            OrderKind::Market => {
                let price = state.market_price;
                Self::apply_fill(&mut state, request.side, request.contracts.as_decimal());
                OrderSnapshot {
                    order_id: order_id.clone(),
                    status: OrderStatus::Filled,
                    filled_price: price,
                    filled_time: Some(Utc::now()),
                }
            },
            OrderKind::Limit { .. } | OrderKind::StopLimit { .. } => OrderSnapshot {
                order_id: order_id.clone(),
                status: OrderStatus::Open,
                filled_price: Decimal::ZERO,
                filled_time: None,
            },
        };

        tracing::debug!(%order_id, side = %request.side, kind = ?request.kind, "Stub: order placed");
        state.orders.insert(order_id.clone(), snapshot);
        state.placed.push((order_id.clone(), request.clone()));
        Ok(order_id)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), BrokerError> {
        self.enter(StubCall::CancelOrder).await?;

        let mut state = self.state();
        match state.orders.get_mut(order_id) {
            Some(order) => {
                if order.status == OrderStatus::Open {
                    order.status = OrderStatus::Cancelled;
                }
            },
            None => return Err(BrokerError::OrderNotFound(order_id.to_string())),
        }
        state.cancelled.push(order_id.to_string());

        tracing::debug!(order_id, "Stub: order cancelled");
        Ok(())
    }

    async fn list_open_orders(&self, _symbol: &Symbol) -> Result<Vec<OrderId>, BrokerError> {
        self.enter(StubCall::ListOpenOrders).await?;

        let state = self.state();
        let mut open: Vec<OrderId> =
            state.orders.values().filter(|o| o.is_open()).map(|o| o.order_id.clone()).collect();
        open.sort();
        Ok(open)
    }

    async fn get_balance(&self) -> Result<Decimal, BrokerError> {
        self.enter(StubCall::GetBalance).await?;
        Ok(self.state().balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use vigil_domain::{Price, Quantity};

    fn symbol() -> Symbol {
        Symbol::new("ET-31OCT25-CDE").unwrap()
    }

    fn market(side: OrderSide) -> OrderRequest {
        OrderRequest {
            client_order_id: "c".into(),
            side,
            kind: OrderKind::Market,
            contracts: Quantity::new(dec!(1)).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_market_orders_net_position() {
        let broker = StubBroker::new(dec!(4000));

        let id = broker.place_order(&symbol(), &market(OrderSide::Buy)).await.unwrap();
        assert_eq!(id, "STUB-1");
        assert_eq!(broker.position(), BrokerPosition::open(Side::Long, dec!(1), dec!(4000)));
        assert_eq!(broker.get_order(&id).await.unwrap().fill_price().unwrap().as_decimal(), dec!(4000));

        broker.set_market_price(dec!(4010));
        broker.place_order(&symbol(), &market(OrderSide::Sell)).await.unwrap();
        assert!(broker.position().is_flat());
    }

    #[tokio::test]
    async fn test_resting_orders_listed_and_cancelled() {
        let broker = StubBroker::new(dec!(4000));
        let request = OrderRequest {
            kind: OrderKind::Limit { price: Price::new(dec!(4020)).unwrap() },
            ..market(OrderSide::Sell)
        };

        let id = broker.place_order(&symbol(), &request).await.unwrap();
        assert_eq!(broker.list_open_orders(&symbol()).await.unwrap(), vec![id.clone()]);

        broker.cancel_order(&id).await.unwrap();
        assert!(broker.list_open_orders(&symbol()).await.unwrap().is_empty());
        assert_eq!(broker.order(&id).unwrap().status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_fail_next_resets() {
        let broker = StubBroker::new(dec!(4000));
        broker.set_fail_next(true);

        assert!(broker.get_balance().await.is_err());
        assert_eq!(broker.get_balance().await.unwrap(), dec!(10000));
    }

    #[tokio::test]
    async fn test_fail_on_targets_one_call() {
        let broker = StubBroker::new(dec!(4000));
        broker.fail_on(StubCall::CancelOrder);

        assert!(broker.get_position(&symbol()).await.is_ok());
        assert!(matches!(
            broker.cancel_order("nope").await,
            Err(BrokerError::Unavailable(_))
        ));
        assert!(matches!(
            broker.cancel_order("nope").await,
            Err(BrokerError::OrderNotFound(_))
        ));
    }
}
