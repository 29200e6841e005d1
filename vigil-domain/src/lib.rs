//! Vigil Domain Layer
//!
//! Pure domain types with zero I/O dependencies: the position record,
//! closed trades and their ledger, price bars and advisory signals.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Public modules
pub mod entities;
pub mod ledger;
pub mod market_data;
pub mod signal;
pub mod state;
pub mod value_objects;

// Re-export commonly used types
pub use entities::{ClosedTrade, ExitReason, OrderId, Position, PositionStatus};
pub use ledger::{LedgerStats, TradeLedger};
pub use market_data::{Bar, PriceSeries};
pub use signal::{ProposedSignal, RawSignal, SignalAction, SignalContext};
pub use state::TradingState;
pub use value_objects::{ContractSpec, DomainError, OrderSide, Price, Quantity, Side, Symbol};
