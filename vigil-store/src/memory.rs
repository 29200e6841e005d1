//! In-memory store implementation
//!
//! Used for testing and development without a state file.
//! Thread-safe using RwLock for concurrent access.

use crate::error::StoreError;
use crate::repository::StateStore;
use async_trait::async_trait;
use std::sync::{PoisonError, RwLock};
use vigil_domain::TradingState;

/// In-memory store for testing
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<Option<TradingState>>,
    saves: RwLock<u64>,
}

impl MemoryStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-loaded with `state`
    pub fn with_state(state: TradingState) -> Self {
        Self { state: RwLock::new(Some(state)), saves: RwLock::new(0) }
    }

    /// Last saved state, if any
    pub fn snapshot(&self) -> Option<TradingState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of successful saves
    pub fn save_count(&self) -> u64 {
        *self.saves.read().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load(&self) -> Result<TradingState, StoreError> {
        Ok(self.snapshot().unwrap_or_default())
    }

    async fn save(&self, state: &TradingState) -> Result<(), StoreError> {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = Some(state.clone());
        *self.saves.write().unwrap_or_else(PoisonError::into_inner) += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_store_loads_default() {
        let store = MemoryStore::new();
        assert_eq!(store.load().await.unwrap(), TradingState::new());
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let store = MemoryStore::new();
        let mut state = TradingState::new();
        state.position.unrealized_pnl = rust_decimal_macros::dec!(1.5);

        store.save(&state).await.unwrap();
        assert_eq!(store.load().await.unwrap(), state);
        assert_eq!(store.save_count(), 1);
    }
}
