//! Daemon configuration.
//!
//! Loads configuration from environment variables with sensible defaults.
//! A `.env` file in the working directory is honored.

use crate::error::{DaemonError, DaemonResult};
use rust_decimal::Decimal;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use vigil_domain::{ContractSpec, Symbol};
use vigil_engine::{ValidationConfig, VolumeRule};
use vigil_exec::ReconcilerConfig;

/// Default instrument: nano ETH futures, Oct 2025 expiry
pub const DEFAULT_PRODUCT_ID: &str = "ET-31OCT25-CDE";

// =============================================================================
// Configuration
// =============================================================================

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Instrument and order shape
    pub instrument: InstrumentConfig,

    /// Trade validation thresholds
    pub validation: ValidationConfig,

    /// Files and I/O limits for one cycle
    pub runtime: RuntimeConfig,

    /// Environment (test, development, production)
    pub environment: Environment,
}

/// Instrument configuration.
#[derive(Debug, Clone)]
pub struct InstrumentConfig {
    /// Product traded
    pub symbol: Symbol,
    /// Contracts per order, multiplier and tick
    pub contract: ContractSpec,
    /// Stop-limit orders rest this far beyond their trigger
    pub stop_limit_offset: Decimal,
}

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Bars requested from the price provider
    pub bar_count: usize,
    /// Per-call broker timeout
    pub broker_timeout: Duration,
    /// Persisted position and ledger
    pub state_file: PathBuf,
    /// JSON bars replayed by the file price provider
    pub bars_file: PathBuf,
    /// Advisory text read by the file signal provider
    pub signal_file: PathBuf,
    /// Trading is halted while this file exists
    pub kill_switch_file: PathBuf,
}

/// Environment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Test environment (uses stubs)
    Test,
    /// Development environment
    Development,
    /// Production environment
    Production,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> DaemonResult<Self> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        let environment = Self::load_environment()?;
        let instrument = Self::load_instrument_config()?;
        let validation = Self::load_validation_config()?;
        let runtime = Self::load_runtime_config()?;

        Ok(Self { instrument, validation, runtime, environment })
    }

    /// Create test configuration.
    ///
    /// Files live under `dir`; the kill switch file is not created.
    pub fn test(dir: &Path) -> DaemonResult<Self> {
        Ok(Self {
            instrument: InstrumentConfig::new(Symbol::new(DEFAULT_PRODUCT_ID)?),
            validation: ValidationConfig::default(),
            runtime: RuntimeConfig {
                bar_count: 50,
                broker_timeout: Duration::from_secs(1),
                state_file: dir.join("state.json"),
                bars_file: dir.join("bars.json"),
                signal_file: dir.join("signal.txt"),
                kill_switch_file: dir.join("STOP"),
            },
            environment: Environment::Test,
        })
    }

    /// Whether trading is allowed this run (kill switch file absent).
    pub fn trading_enabled(&self) -> bool {
        !self.runtime.kill_switch_file.exists()
    }

    /// Refuse to run against the in-process stub broker in production.
    pub fn ensure_stub_broker_allowed(&self) -> DaemonResult<()> {
        match self.environment {
            Environment::Production => Err(DaemonError::Config(
                "production requires a live broker; only the stub broker is wired".to_string(),
            )),
            Environment::Test | Environment::Development => Ok(()),
        }
    }

    /// Settings for the position reconciler.
    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            symbol: self.instrument.symbol.clone(),
            contract: self.instrument.contract,
            stop_limit_offset: self.instrument.stop_limit_offset,
            broker_timeout: self.runtime.broker_timeout,
        }
    }

    fn load_environment() -> DaemonResult<Environment> {
        let env_str = env::var("VIGIL_ENV").unwrap_or_else(|_| "development".to_string());

        match env_str.to_lowercase().as_str() {
            "test" => Ok(Environment::Test),
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(DaemonError::Config(format!(
                "Invalid VIGIL_ENV: {}. Expected: test, development, production",
                other
            ))),
        }
    }

    fn load_instrument_config() -> DaemonResult<InstrumentConfig> {
        let product = env::var("VIGIL_PRODUCT_ID").unwrap_or_else(|_| DEFAULT_PRODUCT_ID.to_string());
        let defaults = InstrumentConfig::new(Symbol::new(product)?);

        let contract = ContractSpec::new(
            Self::load_decimal_env("VIGIL_CONTRACTS", defaults.contract.contracts().as_decimal())?,
            Self::load_decimal_env("VIGIL_CONTRACT_MULTIPLIER", defaults.contract.multiplier())?,
            Self::load_decimal_env("VIGIL_TICK_SIZE", defaults.contract.tick_size())?,
        )?;

        let stop_limit_offset =
            Self::load_decimal_env("VIGIL_STOP_LIMIT_OFFSET", defaults.stop_limit_offset)?;
        if stop_limit_offset < Decimal::ZERO {
            return Err(DaemonError::Config(format!(
                "Invalid VIGIL_STOP_LIMIT_OFFSET value: {}",
                stop_limit_offset
            )));
        }

        Ok(InstrumentConfig { contract, stop_limit_offset, ..defaults })
    }

    fn load_validation_config() -> DaemonResult<ValidationConfig> {
        let defaults = ValidationConfig::default();

        let config = ValidationConfig {
            min_stop_pct: Self::load_decimal_env("VIGIL_MIN_STOP_PCT", defaults.min_stop_pct)?,
            max_stop_pct: Self::load_decimal_env("VIGIL_MAX_STOP_PCT", defaults.max_stop_pct)?,
            min_target_pct: Self::load_decimal_env("VIGIL_MIN_TARGET_PCT", defaults.min_target_pct)?,
            max_target_pct: Self::load_decimal_env("VIGIL_MAX_TARGET_PCT", defaults.max_target_pct)?,
            min_rr: Self::load_decimal_env("VIGIL_MIN_RR", defaults.min_rr)?,
            max_rr: Self::load_decimal_env("VIGIL_MAX_RR", defaults.max_rr)?,
            volume: VolumeRule {
                lookback: Self::load_usize_env("VIGIL_VOLUME_LOOKBACK", defaults.volume.lookback)?,
                min_avg_volume: Self::load_decimal_env(
                    "VIGIL_MIN_AVG_VOLUME",
                    defaults.volume.min_avg_volume,
                )?,
                min_bar_volume: Self::load_decimal_env(
                    "VIGIL_MIN_BAR_VOLUME",
                    defaults.volume.min_bar_volume,
                )?,
                min_active_bars: Self::load_usize_env(
                    "VIGIL_MIN_ACTIVE_BARS",
                    defaults.volume.min_active_bars,
                )?,
            },
        };

        Self::check_bounds("stop distance", config.min_stop_pct, config.max_stop_pct)?;
        Self::check_bounds("target distance", config.min_target_pct, config.max_target_pct)?;
        Self::check_bounds("risk/reward", config.min_rr, config.max_rr)?;

        Ok(config)
    }

    fn load_runtime_config() -> DaemonResult<RuntimeConfig> {
        let timeout_secs = Self::load_u64_env("VIGIL_BROKER_TIMEOUT_SECS", 10)?;
        if timeout_secs == 0 {
            return Err(DaemonError::Config("VIGIL_BROKER_TIMEOUT_SECS must be positive".into()));
        }

        Ok(RuntimeConfig {
            bar_count: Self::load_usize_env("VIGIL_BAR_COUNT", 100)?,
            broker_timeout: Duration::from_secs(timeout_secs),
            state_file: Self::load_path_env("VIGIL_STATE_FILE", "trading_state.json"),
            bars_file: Self::load_path_env("VIGIL_BARS_FILE", "bars.json"),
            signal_file: Self::load_path_env("VIGIL_SIGNAL_FILE", "signal.txt"),
            kill_switch_file: Self::load_path_env("VIGIL_KILL_SWITCH_FILE", "STOP_TRADING"),
        })
    }

    fn check_bounds(name: &str, min: Decimal, max: Decimal) -> DaemonResult<()> {
        if min < Decimal::ZERO || min > max {
            return Err(DaemonError::Config(format!(
                "Invalid {} bounds: min {} max {}",
                name, min, max
            )));
        }
        Ok(())
    }

    fn load_decimal_env(key: &str, default: Decimal) -> DaemonResult<Decimal> {
        match env::var(key) {
            Ok(val) => Decimal::from_str(&val)
                .map_err(|_| DaemonError::Config(format!("Invalid {} value: {}", key, val))),
            Err(_) => Ok(default),
        }
    }

    fn load_usize_env(key: &str, default: usize) -> DaemonResult<usize> {
        match env::var(key) {
            Ok(val) => val
                .parse::<usize>()
                .map_err(|_| DaemonError::Config(format!("Invalid {} value: {}", key, val))),
            Err(_) => Ok(default),
        }
    }

    fn load_u64_env(key: &str, default: u64) -> DaemonResult<u64> {
        match env::var(key) {
            Ok(val) => val
                .parse::<u64>()
                .map_err(|_| DaemonError::Config(format!("Invalid {} value: {}", key, val))),
            Err(_) => Ok(default),
        }
    }

    fn load_path_env(key: &str, default: &str) -> PathBuf {
        env::var(key).map(PathBuf::from).unwrap_or_else(|_| PathBuf::from(default))
    }
}

impl InstrumentConfig {
    /// One contract of `symbol` with the default multiplier, tick and offset
    pub fn new(symbol: Symbol) -> Self {
        Self { symbol, contract: ContractSpec::default(), stop_limit_offset: Decimal::ONE }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Test => write!(f, "test"),
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn test_config() -> (TempDir, Config) {
        let dir = TempDir::new().unwrap();
        let config = Config::test(dir.path()).unwrap();
        (dir, config)
    }

    #[test]
    fn test_test_config() {
        let (dir, config) = test_config();

        assert_eq!(config.instrument.symbol.as_str(), DEFAULT_PRODUCT_ID);
        assert_eq!(config.instrument.stop_limit_offset, dec!(1));
        assert_eq!(config.runtime.state_file, dir.path().join("state.json"));
        assert_eq!(config.environment, Environment::Test);
    }

    #[test]
    fn test_contract_defaults() {
        let (_dir, config) = test_config();

        assert_eq!(config.instrument.contract.position_size(), dec!(0.1));
        assert_eq!(config.instrument.contract.tick_size(), dec!(1));
    }

    #[test]
    fn test_validation_defaults() {
        let (_dir, config) = test_config();

        assert_eq!(config.validation.min_stop_pct, dec!(0.10));
        assert_eq!(config.validation.max_target_pct, dec!(0.50));
        assert_eq!(config.validation.min_rr, dec!(0.5));
        assert_eq!(config.validation.max_rr, dec!(3.0));
        assert_eq!(config.validation.volume.lookback, 10);
    }

    #[test]
    fn test_kill_switch() {
        let (_dir, config) = test_config();
        assert!(config.trading_enabled());

        std::fs::write(&config.runtime.kill_switch_file, "").unwrap();
        assert!(!config.trading_enabled());
    }

    #[test]
    fn test_reconciler_config() {
        let (_dir, config) = test_config();
        let reconciler = config.reconciler_config();

        assert_eq!(reconciler.symbol, config.instrument.symbol);
        assert_eq!(reconciler.broker_timeout, Duration::from_secs(1));
        assert_eq!(reconciler.stop_limit_offset, dec!(1));
    }

    #[test]
    fn test_bounds_check() {
        assert!(Config::check_bounds("rr", dec!(0.5), dec!(3)).is_ok());
        assert!(Config::check_bounds("rr", dec!(3), dec!(0.5)).is_err());
        assert!(Config::check_bounds("rr", dec!(-1), dec!(1)).is_err());
    }

    #[test]
    fn test_stub_broker_refused_in_production() {
        let (_dir, mut config) = test_config();
        assert!(config.ensure_stub_broker_allowed().is_ok());

        config.environment = Environment::Development;
        assert!(config.ensure_stub_broker_allowed().is_ok());

        config.environment = Environment::Production;
        assert!(matches!(config.ensure_stub_broker_allowed(), Err(DaemonError::Config(_))));
    }

    #[test]
    fn test_environment_display() {
        assert_eq!(Environment::Test.to_string(), "test");
        assert_eq!(Environment::Development.to_string(), "development");
        assert_eq!(Environment::Production.to_string(), "production");
    }
}
