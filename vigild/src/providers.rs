//! File-backed collaborators.
//!
//! Replay providers for dry runs: bars come from a JSON array on disk and the
//! advisory signal from a text file holding whatever the advisor answered.
//! Both are re-read on every call, so an external process can refresh them
//! between cycles.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tracing::debug;
use vigil_domain::{Bar, PriceSeries, ProposedSignal, SignalContext, Symbol};
use vigil_exec::{PriceSeriesProvider, ProviderError, SignalProvider};

// =============================================================================
// Price series
// =============================================================================

/// Bars read from a JSON array of `{time, open, high, low, close, volume}`.
#[derive(Debug, Clone)]
pub struct JsonBarsProvider {
    path: PathBuf,
}

impl JsonBarsProvider {
    /// Provider reading `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PriceSeriesProvider for JsonBarsProvider {
    async fn get_bars(
        &self,
        symbol: &Symbol,
        since: Option<DateTime<Utc>>,
        count: usize,
    ) -> Result<PriceSeries, ProviderError> {
        let bytes = tokio::fs::read(&self.path).await?;
        let bars: Vec<Bar> = serde_json::from_slice(&bytes)
            .map_err(|e| ProviderError::Invalid(format!("{}: {}", self.path.display(), e)))?;

        let series = PriceSeries::new(bars);
        let window = match since {
            Some(time) => series.after(time),
            None => series.bars(),
        };
        let start = window.len().saturating_sub(count);
        let bars = window[start..].to_vec();

        debug!(%symbol, bars = bars.len(), path = %self.path.display(), "Bars loaded");
        Ok(PriceSeries::new(bars))
    }
}

// =============================================================================
// Signal
// =============================================================================

/// Advisory signal read as free text.
///
/// The first JSON object carrying an `"action"` key is the signal; text
/// without one is a malformed signal, not an error.
#[derive(Debug, Clone)]
pub struct AdvisoryTextSignalProvider {
    path: PathBuf,
}

impl AdvisoryTextSignalProvider {
    /// Provider reading `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SignalProvider for AdvisoryTextSignalProvider {
    async fn get_signal(&self, context: &SignalContext) -> Result<ProposedSignal, ProviderError> {
        let text = tokio::fs::read_to_string(&self.path).await?;
        let signal = ProposedSignal::from_advisory_text(&text);

        debug!(
            symbol = %context.symbol,
            status = %context.status,
            action = %signal.action(),
            malformed = signal.is_malformed(),
            "Advisory signal read"
        );
        Ok(signal)
    }
}
