//! Repository trait definitions (Ports)
//!
//! The storage interface for the trading state.
//! Implementations can be a JSON file, in-memory, or mock for testing.

use crate::error::StoreError;
use async_trait::async_trait;
use vigil_domain::TradingState;

/// Repository for the persisted position record and trade ledger
///
/// Exclusion between concurrent writers of the same state is the
/// scheduler's job, not the store's.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the state; a store that was never written yields the flat default
    async fn load(&self) -> Result<TradingState, StoreError>;

    /// Replace the persisted state
    async fn save(&self, state: &TradingState) -> Result<(), StoreError>;
}
