//! Value Objects for the Vigil domain
//!
//! Immutable, validated domain primitives.
//! All value objects enforce invariants at construction time.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Domain errors for value object validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// Price must be positive
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    /// Quantity must be positive
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    /// Symbol must be a valid instrument identifier
    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    /// Contract specification validation error
    #[error("Invalid contract spec: {0}")]
    InvalidContractSpec(String),

    /// Position record violates its invariants
    #[error("Invalid position: {0}")]
    InvalidPosition(String),

    /// Invalid state transition
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),
}

// =============================================================================
// Price
// =============================================================================

/// Price represents a positive decimal price
///
/// # Invariants
/// - Must be > 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    /// Create a new Price with validation
    ///
    /// # Errors
    /// Returns `DomainError::InvalidPrice` if value <= 0
    pub fn new(value: Decimal) -> Result<Self, DomainError> {
        if value <= Decimal::ZERO {
            return Err(DomainError::InvalidPrice(format!("Price must be positive, got {}", value)));
        }
        Ok(Self(value))
    }

    /// Build a price from a broker-reported value, treating zero/negative as absent.
    ///
    /// Brokers report "no fill price" as `0` in several payloads.
    pub fn from_reported(value: Decimal) -> Option<Self> {
        Self::new(value).ok()
    }

    /// Get the underlying Decimal value
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Round to the nearest multiple of `tick`.
    ///
    /// A non-positive tick, or a rounding result of zero, returns the price unchanged.
    pub fn round_to_tick(&self, tick: Decimal) -> Price {
        if tick <= Decimal::ZERO {
            return *self;
        }
        let rounded = (self.0 / tick).round() * tick;
        if rounded <= Decimal::ZERO {
            *self
        } else {
            Price(rounded.normalize())
        }
    }

    /// Relative distance to `other`, in percent of `self`.
    ///
    /// `|self - other| / self * 100`
    pub fn distance_pct(&self, other: Price) -> Decimal {
        (self.0 - other.0).abs() / self.0 * Decimal::ONE_HUNDRED
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Quantity
// =============================================================================

/// Quantity represents a positive decimal quantity (contracts, base units)
///
/// # Invariants
/// - Must be > 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(Decimal);

impl Quantity {
    /// Create a new Quantity with validation
    ///
    /// # Errors
    /// Returns `DomainError::InvalidQuantity` if value <= 0
    pub fn new(value: Decimal) -> Result<Self, DomainError> {
        if value <= Decimal::ZERO {
            return Err(DomainError::InvalidQuantity("Quantity must be positive".to_string()));
        }
        Ok(Self(value))
    }

    /// Get the underlying Decimal value
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Symbol
// =============================================================================

/// Symbol identifies the single tradable instrument (e.g. a futures product id)
///
/// # Invariants
/// - Non-empty
/// - No whitespace
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Create a Symbol from an instrument identifier
    ///
    /// # Examples
    /// ```
    /// # use vigil_domain::value_objects::Symbol;
    /// let symbol = Symbol::new("ET-31OCT25-CDE").unwrap();
    /// assert_eq!(symbol.as_str(), "ET-31OCT25-CDE");
    /// assert!(Symbol::new("").is_err());
    /// ```
    ///
    /// # Errors
    /// Returns `DomainError::InvalidSymbol` if the identifier is empty or contains whitespace
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if id.is_empty() {
            return Err(DomainError::InvalidSymbol("Symbol must be non-empty".to_string()));
        }
        if id.chars().any(char::is_whitespace) {
            return Err(DomainError::InvalidSymbol(format!("Symbol contains whitespace: {:?}", id)));
        }
        Ok(Self(id))
    }

    /// Get the instrument identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Side
// =============================================================================

/// Side represents the position direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Long position (buy low, sell high)
    Long,
    /// Short position (sell high, buy low)
    Short,
}

impl Side {
    /// Get the entry action for this side
    ///
    /// Long → Buy, Short → Sell
    pub fn entry_action(&self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Buy,
            Side::Short => OrderSide::Sell,
        }
    }

    /// Get the exit action for this side
    ///
    /// Long → Sell, Short → Buy
    pub fn exit_action(&self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Sell,
            Side::Short => OrderSide::Buy,
        }
    }

    /// The other direction
    pub fn opposite(&self) -> Side {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }

    /// Signed P/L of moving from `entry` to `exit` on `size` units
    ///
    /// Long: `(exit - entry) × size`, Short: `(entry - exit) × size`
    pub fn pnl(&self, entry: Decimal, exit: Decimal, size: Decimal) -> Decimal {
        match self {
            Side::Long => (exit - entry) * size,
            Side::Short => (entry - exit) * size,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
        }
    }
}

/// OrderSide represents the order direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    /// Buy order
    Buy,
    /// Sell order
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

// =============================================================================
// ContractSpec
// =============================================================================

/// Per-instrument contract specification
///
/// P/L is computed on `contracts × multiplier` base units:
///
/// ```text
/// Long P/L  = (exit - entry) × contracts × multiplier
/// Short P/L = (entry - exit) × contracts × multiplier
/// ```
///
/// # Example
///
/// ```
/// # use vigil_domain::value_objects::ContractSpec;
/// # use rust_decimal_macros::dec;
/// // One nano ETH contract = 0.1 ETH
/// let spec = ContractSpec::new(dec!(1), dec!(0.1), dec!(1)).unwrap();
/// assert_eq!(spec.position_size(), dec!(0.1));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractSpec {
    /// Contracts traded per position
    contracts: Quantity,
    /// Base units per contract
    multiplier: Decimal,
    /// Minimum price increment for order prices
    tick_size: Decimal,
}

impl ContractSpec {
    /// Create a new ContractSpec with validation
    ///
    /// # Errors
    /// Returns `DomainError::InvalidContractSpec` if:
    /// - contracts <= 0
    /// - multiplier <= 0
    /// - tick size < 0
    pub fn new(contracts: Decimal, multiplier: Decimal, tick_size: Decimal) -> Result<Self, DomainError> {
        let contracts = Quantity::new(contracts)
            .map_err(|_| DomainError::InvalidContractSpec("Contracts must be positive".to_string()))?;

        if multiplier <= Decimal::ZERO {
            return Err(DomainError::InvalidContractSpec(
                "Contract multiplier must be positive".to_string(),
            ));
        }

        if tick_size < Decimal::ZERO {
            return Err(DomainError::InvalidContractSpec(
                "Tick size cannot be negative".to_string(),
            ));
        }

        Ok(Self { contracts, multiplier, tick_size })
    }

    /// Contracts per order
    pub fn contracts(&self) -> Quantity {
        self.contracts
    }

    /// Base units per contract
    pub fn multiplier(&self) -> Decimal {
        self.multiplier
    }

    /// Price increment used to round order prices
    pub fn tick_size(&self) -> Decimal {
        self.tick_size
    }

    /// Position size in base units (contracts × multiplier)
    pub fn position_size(&self) -> Decimal {
        self.contracts.as_decimal() * self.multiplier
    }

    /// Broker-reported contract count converted to base units
    pub fn size_of(&self, contracts: Decimal) -> Decimal {
        contracts * self.multiplier
    }
}

impl Default for ContractSpec {
    fn default() -> Self {
        Self {
            contracts: Quantity(Decimal::ONE),
            multiplier: Decimal::new(1, 1), // 0.1
            tick_size: Decimal::ONE,
        }
    }
}

impl fmt::Display for ContractSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ContractSpec {{ contracts: {}, multiplier: {}, tick: {} }}",
            self.contracts, self.multiplier, self.tick_size
        )
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_price_validation() {
        assert!(Price::new(dec!(100.0)).is_ok());
        assert!(Price::new(dec!(0.01)).is_ok());
        assert!(Price::new(dec!(-1.0)).is_err());
        assert!(Price::new(dec!(0.0)).is_err());
    }

    #[test]
    fn test_price_from_reported_treats_zero_as_missing() {
        assert_eq!(Price::from_reported(dec!(0)), None);
        assert_eq!(Price::from_reported(dec!(3820)).unwrap().as_decimal(), dec!(3820));
    }

    #[test]
    fn test_price_round_to_tick() {
        let price = Price::new(dec!(3987.6)).unwrap();
        assert_eq!(price.round_to_tick(dec!(1)).as_decimal(), dec!(3988));
        assert_eq!(price.round_to_tick(dec!(0.5)).as_decimal(), dec!(3987.5));
        // Zero tick leaves the price alone
        assert_eq!(price.round_to_tick(dec!(0)), price);
    }

    #[test]
    fn test_price_distance_pct() {
        let entry = Price::new(dec!(4000)).unwrap();
        let stop = Price::new(dec!(3988)).unwrap();
        assert_eq!(entry.distance_pct(stop), dec!(0.3));
    }

    #[test]
    fn test_quantity_validation() {
        assert!(Quantity::new(dec!(0.001)).is_ok());
        assert!(Quantity::new(dec!(-0.1)).is_err());
        assert!(Quantity::new(dec!(0.0)).is_err());
    }

    #[test]
    fn test_symbol_validation() {
        assert!(Symbol::new("ET-31OCT25-CDE").is_ok());
        assert!(Symbol::new("BTC-USD").is_ok());
        assert!(Symbol::new("").is_err());
        assert!(Symbol::new("BTC USD").is_err());
    }

    #[test]
    fn test_side_actions() {
        assert_eq!(Side::Long.entry_action(), OrderSide::Buy);
        assert_eq!(Side::Long.exit_action(), OrderSide::Sell);
        assert_eq!(Side::Short.entry_action(), OrderSide::Sell);
        assert_eq!(Side::Short.exit_action(), OrderSide::Buy);
        assert_eq!(Side::Long.opposite(), Side::Short);
    }

    #[test]
    fn test_side_pnl_sign() {
        assert_eq!(Side::Long.pnl(dec!(3820), dec!(3830), dec!(0.1)), dec!(1.0));
        assert_eq!(Side::Short.pnl(dec!(3820), dec!(3830), dec!(0.1)), dec!(-1.0));
        assert_eq!(Side::Short.pnl(dec!(4000), dec!(3980), dec!(1)), dec!(20));
    }

    #[test]
    fn test_contract_spec_validation() {
        assert!(ContractSpec::new(dec!(1), dec!(0.1), dec!(1)).is_ok());
        assert!(ContractSpec::new(dec!(0), dec!(0.1), dec!(1)).is_err());
        assert!(ContractSpec::new(dec!(1), dec!(0), dec!(1)).is_err());
        assert!(ContractSpec::new(dec!(1), dec!(0.1), dec!(-1)).is_err());
    }

    #[test]
    fn test_contract_spec_position_size() {
        let spec = ContractSpec::new(dec!(3), dec!(0.1), dec!(1)).unwrap();
        assert_eq!(spec.position_size(), dec!(0.3));
        assert_eq!(spec.size_of(dec!(2)), dec!(0.2));
        assert_eq!(ContractSpec::default().position_size(), dec!(0.1));
    }
}
