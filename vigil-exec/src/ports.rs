//! Execution layer port definitions.
//!
//! Ports define the interfaces for external collaborators (broker, price
//! series, advisory signal). Adapters implement these ports for specific
//! services; `StubBroker` is the in-process one.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use vigil_domain::{
    OrderId, OrderSide, Price, PriceSeries, ProposedSignal, Quantity, Side, SignalContext, Symbol,
};

use crate::error::{BrokerError, ProviderError};

// =============================================================================
// Broker Gateway
// =============================================================================

/// Port for the broker holding the authoritative position.
///
/// Implementations:
/// - `StubBroker` - in-memory broker for tests and dry runs
#[async_trait]
pub trait BrokerGateway: Send + Sync {
    /// Current position on the instrument.
    async fn get_position(&self, symbol: &Symbol) -> Result<BrokerPosition, BrokerError>;

    /// Status of a single order.
    async fn get_order(&self, order_id: &str) -> Result<OrderSnapshot, BrokerError>;

    /// Submit an order.
    ///
    /// # Returns
    ///
    /// Broker-assigned order ID once the broker accepted the order.
    async fn place_order(
        &self,
        symbol: &Symbol,
        request: &OrderRequest,
    ) -> Result<OrderId, BrokerError>;

    /// Cancel an existing order.
    async fn cancel_order(&self, order_id: &str) -> Result<(), BrokerError>;

    /// IDs of every working order on the instrument.
    async fn list_open_orders(&self, symbol: &Symbol) -> Result<Vec<OrderId>, BrokerError>;

    /// Account balance in quote currency.
    async fn get_balance(&self) -> Result<Decimal, BrokerError>;
}

/// Position as the broker reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerPosition {
    /// Open side, `None` when flat
    pub side: Option<Side>,
    /// Number of contracts
    pub contracts: Decimal,
    /// Average entry price; zero when the broker omits it
    pub avg_entry_price: Decimal,
    /// Broker-computed unrealized P/L, if reported
    pub unrealized_pnl: Option<Decimal>,
}

impl BrokerPosition {
    /// A flat position
    pub fn flat() -> Self {
        Self {
            side: None,
            contracts: Decimal::ZERO,
            avg_entry_price: Decimal::ZERO,
            unrealized_pnl: None,
        }
    }

    /// An open position
    pub fn open(side: Side, contracts: Decimal, avg_entry_price: Decimal) -> Self {
        Self { side: Some(side), contracts, avg_entry_price, unrealized_pnl: None }
    }

    /// Check if nothing is open
    pub fn is_flat(&self) -> bool {
        self.side.is_none() || self.contracts.is_zero()
    }
}

/// Order status as the broker reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Working, not (fully) filled
    Open,
    /// Completely filled
    Filled,
    /// Cancelled, expired or rejected
    Cancelled,
}

/// Point-in-time view of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    /// Broker order ID
    pub order_id: OrderId,
    /// Current status
    pub status: OrderStatus,
    /// Average fill price; zero when not filled or not reported
    pub filled_price: Decimal,
    /// When the order filled
    pub filled_time: Option<DateTime<Utc>>,
}

impl OrderSnapshot {
    /// Fill price if the order filled and the broker reported a real price
    pub fn fill_price(&self) -> Option<Price> {
        match self.status {
            OrderStatus::Filled => Price::from_reported(self.filled_price),
            OrderStatus::Open | OrderStatus::Cancelled => None,
        }
    }

    /// Check if the order is still working
    pub fn is_open(&self) -> bool {
        self.status == OrderStatus::Open
    }
}

/// Order type and prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderKind {
    /// Fill immediately at market
    Market,
    /// Good-till-cancelled limit order
    Limit {
        /// Limit price
        price: Price,
    },
    /// Good-till-cancelled stop-limit order
    StopLimit {
        /// Trigger price
        stop_price: Price,
        /// Limit price once triggered
        limit_price: Price,
    },
}

/// Order to submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Client-generated ID (UUID v7)
    pub client_order_id: String,
    /// Buy or sell
    pub side: OrderSide,
    /// Type and prices
    pub kind: OrderKind,
    /// Contracts
    pub contracts: Quantity,
}

// =============================================================================
// Price Series Provider
// =============================================================================

/// Port for OHLCV bars.
#[async_trait]
pub trait PriceSeriesProvider: Send + Sync {
    /// Up to `count` most recent bars, optionally only those after `since`.
    async fn get_bars(
        &self,
        symbol: &Symbol,
        since: Option<DateTime<Utc>>,
        count: usize,
    ) -> Result<PriceSeries, ProviderError>;
}

// =============================================================================
// Signal Provider
// =============================================================================

/// Port for the advisory signal.
///
/// Implementations parse whatever they receive into a [`ProposedSignal`];
/// unusable output is `ProposedSignal::Malformed`, not an error.
#[async_trait]
pub trait SignalProvider: Send + Sync {
    /// Signal for the current situation.
    async fn get_signal(&self, context: &SignalContext) -> Result<ProposedSignal, ProviderError>;
}
