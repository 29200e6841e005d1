//! JSON file store
//!
//! One flat JSON document holding the position record and the trade ledger.
//! Saves go to a sibling temp file that is then renamed over the target, so
//! a crash mid-write leaves the previous state intact.

use crate::error::StoreError;
use crate::repository::StateStore;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use vigil_domain::TradingState;

/// State store backed by a JSON file
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Store at `path`; the file need not exist yet
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the state file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn load(&self) -> Result<TradingState, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No state file, starting flat");
                return Ok(TradingState::default());
            },
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };

        let mut state: TradingState = serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::Deserialization(format!("{}: {}", self.path.display(), e)))?;

        let persisted = (
            state.ledger.total_trades(),
            state.ledger.winning_trades(),
            state.ledger.losing_trades(),
        );
        if state.ledger.rebuild_counters() {
            warn!(
                path = %self.path.display(),
                persisted_total = persisted.0,
                persisted_wins = persisted.1,
                persisted_losses = persisted.2,
                total = state.ledger.total_trades(),
                wins = state.ledger.winning_trades(),
                losses = state.ledger.losing_trades(),
                "Persisted ledger counters disagreed with trade history, rebuilt"
            );
        }

        state.position.validate()?;

        debug!(
            path = %self.path.display(),
            status = %state.position.status,
            trades = state.ledger.total_trades(),
            "State loaded"
        );
        Ok(state)
    }

    async fn save(&self, state: &TradingState) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(state)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| StoreError::io(parent, e))?;
        }

        let temp = self.temp_path();
        let mut file = tokio::fs::File::create(&temp).await.map_err(|e| StoreError::io(&temp, e))?;
        file.write_all(&json).await.map_err(|e| StoreError::io(&temp, e))?;
        file.sync_all().await.map_err(|e| StoreError::io(&temp, e))?;
        drop(file);

        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;

        debug!(path = %self.path.display(), bytes = json.len(), "State saved");
        Ok(())
    }
}
