//! Vigil Execution Layer
//!
//! Everything that talks to the broker on behalf of the position record.
//!
//! # Architecture
//!
//! ```text
//! Broker ──► PositionReconciler::reconcile     (desync detection)
//!        ──► PositionReconciler::check_levels  (retroactive stop/target)
//! Engine Decision ──► PositionReconciler::execute ──► Broker
//! ```
//!
//! # Components
//!
//! - **Ports**: Traits for the broker, price series and signal collaborators
//! - **Reconciler**: Syncs the local record with broker truth
//! - **Executor**: Runs engine actions, updating the record per confirmed step
//! - **Stub**: In-memory broker for tests and dry runs
//!
//! # Example
//!
//! ```rust,ignore
//! use vigil_exec::{PositionReconciler, ReconcilerConfig, StubBroker};
//! use std::sync::Arc;
//!
//! let broker = Arc::new(StubBroker::new(dec!(4000)));
//! let reconciler = PositionReconciler::new(broker, config);
//!
//! let reconciliation = reconciler.reconcile(&mut state, last_price).await?;
//! let results = reconciler.execute(&mut state, &decision.actions, last_price).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod executor;
pub mod ports;
pub mod reconciler;
pub mod stub;

// Re-exports for convenience
pub use error::{BrokerError, ExecError, ExecResult, ProviderError};
pub use executor::{realized_pnl, ActionResult};
pub use ports::{
    BrokerGateway, BrokerPosition, OrderKind, OrderRequest, OrderSnapshot, OrderStatus,
    PriceSeriesProvider, SignalProvider,
};
pub use reconciler::{
    PositionReconciler, ReconcileEvent, Reconciliation, ReconcilerConfig, CLOSED_EXTERNALLY_NOTE,
};
pub use stub::{StubBroker, StubCall};
