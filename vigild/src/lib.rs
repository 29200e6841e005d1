//! Vigil Daemon Library
//!
//! One-shot cycle runner for the position reconciliation engine.
//!
//! # Architecture
//!
//! ```text
//! Scheduler → vigild → TradingCycle → PositionReconciler → Broker
//!                           ↑               ↑
//!                     StateStore      Engine (validate + decide)
//!                           ↑
//!             Price series / advisory signal providers
//! ```
//!
//! # Components
//!
//! - **Cycle**: Load, reconcile, decide, execute, save
//! - **Providers**: File-backed bars and advisory signal
//! - **Report**: Human-readable outcome for notifications
//! - **Config**: Environment-based configuration and kill switch
//!
//! # Example
//!
//! ```rust,ignore
//! use vigild::{Config, TradingCycle};
//!
//! let config = Config::from_env()?;
//! let cycle = TradingCycle::new(&config, broker, store, prices, signals);
//! let report = cycle.run(config.trading_enabled()).await?;
//! println!("{}", report);
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod cycle;
pub mod error;
pub mod providers;
pub mod report;

// Re-exports for convenience
pub use config::{Config, Environment, InstrumentConfig, RuntimeConfig};
pub use cycle::TradingCycle;
pub use error::{DaemonError, DaemonResult};
pub use providers::{AdvisoryTextSignalProvider, JsonBarsProvider};
pub use report::CycleReport;
