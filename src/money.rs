use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::errors::{ProcessorError, Result};

/// rounding mode applied when scaling amounts to currency precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RoundingMode {
    /// banker's rounding, the default for monetary results
    #[default]
    HalfEven,
    HalfUp,
    HalfDown,
    Up,
    Down,
}

impl RoundingMode {
    pub fn strategy(self) -> RoundingStrategy {
        match self {
            RoundingMode::HalfEven => RoundingStrategy::MidpointNearestEven,
            RoundingMode::HalfUp => RoundingStrategy::MidpointAwayFromZero,
            RoundingMode::HalfDown => RoundingStrategy::MidpointTowardZero,
            RoundingMode::Up => RoundingStrategy::AwayFromZero,
            RoundingMode::Down => RoundingStrategy::ToZero,
        }
    }
}

/// ISO 4217 alphabetic code, stored inline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct CurrencyCode([u8; 3]);

impl CurrencyCode {
    pub fn new(code: &str) -> Result<Self> {
        let bytes = code.as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(|b| b.is_ascii_uppercase()) {
            return Err(ProcessorError::InvalidCurrencyCode {
                code: code.to_string(),
            });
        }
        Ok(CurrencyCode([bytes[0], bytes[1], bytes[2]]))
    }

    pub fn as_str(&self) -> &str {
        // constructor only admits ascii uppercase
        std::str::from_utf8(&self.0).unwrap_or("???")
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CurrencyCode {
    type Err = ProcessorError;

    fn from_str(s: &str) -> Result<Self> {
        CurrencyCode::new(s)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.as_str().to_string()
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = ProcessorError;

    fn try_from(value: String) -> Result<Self> {
        CurrencyCode::new(&value)
    }
}

/// currency configuration: code, minor-unit digits and rounding mode.
/// passed explicitly wherever amounts are scaled, never read from ambient state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currency {
    pub code: CurrencyCode,
    pub digits: u32,
    pub rounding: RoundingMode,
}

impl Currency {
    pub fn new(code: CurrencyCode, digits: u32) -> Self {
        Currency {
            code,
            digits,
            rounding: RoundingMode::HalfEven,
        }
    }

    /// convenience constructor from a string code
    pub fn of(code: &str, digits: u32) -> Result<Self> {
        Ok(Currency::new(CurrencyCode::new(code)?, digits))
    }

    pub fn with_rounding(mut self, rounding: RoundingMode) -> Self {
        self.rounding = rounding;
        self
    }
}

/// monetary amount bound to a currency; every result is scaled to the
/// currency's digits with its rounding mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    amount: Decimal,
    currency: Currency,
}

impl Money {
    /// create from decimal, scaling to currency precision
    pub fn new(amount: Decimal, currency: Currency) -> Self {
        Money {
            amount: amount.round_dp_with_strategy(currency.digits, currency.rounding.strategy()),
            currency,
        }
    }

    pub fn zero(currency: Currency) -> Self {
        Money::new(Decimal::ZERO, currency)
    }

    /// create from integer major units (dollars, euros, etc)
    pub fn from_major(amount: i64, currency: Currency) -> Self {
        Money::new(Decimal::from(amount), currency)
    }

    /// create from integer minor units (cents, etc) at the currency's scale
    pub fn from_minor(amount: i64, currency: Currency) -> Self {
        let d = Decimal::from(amount) / Decimal::from(10_u64.pow(currency.digits));
        Money::new(d, currency)
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn code(&self) -> CurrencyCode {
        self.currency.code
    }

    fn require_same_currency(&self, other: &Money) -> Result<()> {
        if self.currency.code != other.currency.code {
            return Err(ProcessorError::CurrencyMismatch {
                expected: self.currency.code,
                actual: other.currency.code,
            });
        }
        Ok(())
    }

    /// add another amount of the same currency
    pub fn add(&self, other: &Money) -> Result<Money> {
        self.require_same_currency(other)?;
        Ok(Money::new(self.amount + other.amount, self.currency))
    }

    /// subtract another amount of the same currency
    pub fn subtract(&self, other: &Money) -> Result<Money> {
        self.require_same_currency(other)?;
        Ok(Money::new(self.amount - other.amount, self.currency))
    }

    /// multiply by a scalar rate with an explicit rounding mode
    pub fn multiplied_by(&self, rate: Decimal, rounding: RoundingMode) -> Money {
        Money {
            amount: (self.amount * rate)
                .round_dp_with_strategy(self.currency.digits, rounding.strategy()),
            currency: self.currency,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    /// strictly greater than zero
    pub fn is_positive(&self) -> bool {
        self.amount.is_sign_positive() && !self.amount.is_zero()
    }

    /// strictly less than zero
    pub fn is_negative(&self) -> bool {
        self.amount.is_sign_negative() && !self.amount.is_zero()
    }

    pub fn abs(&self) -> Money {
        Money {
            amount: self.amount.abs(),
            currency: self.currency,
        }
    }

    /// clamp negative amounts to zero
    pub fn negative_to_zero(self) -> Money {
        if self.is_negative() {
            Money::zero(self.currency)
        } else {
            self
        }
    }

    pub fn checked_cmp(&self, other: &Money) -> Result<Ordering> {
        self.require_same_currency(other)?;
        Ok(self.amount.cmp(&other.amount))
    }

    pub fn is_greater_than(&self, other: &Money) -> Result<bool> {
        Ok(self.checked_cmp(other)? == Ordering::Greater)
    }

    pub fn is_less_than(&self, other: &Money) -> Result<bool> {
        Ok(self.checked_cmp(other)? == Ordering::Less)
    }

    /// minimum of two amounts of the same currency
    pub fn min(&self, other: &Money) -> Result<Money> {
        self.require_same_currency(other)?;
        Ok(if self.amount <= other.amount {
            *self
        } else {
            *other
        })
    }

    /// maximum of two amounts of the same currency
    pub fn max(&self, other: &Money) -> Result<Money> {
        self.require_same_currency(other)?;
        Ok(if self.amount >= other.amount {
            *self
        } else {
            *other
        })
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.currency.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn usd() -> Currency {
        Currency::of("USD", 2).unwrap()
    }

    fn eur() -> Currency {
        Currency::of("EUR", 2).unwrap()
    }

    #[test]
    fn test_half_even_rounding_on_construction() {
        let m = Money::new(dec!(2.125), usd());
        assert_eq!(m.amount(), dec!(2.12)); // midpoint rounds to even

        let m = Money::new(dec!(2.135), usd());
        assert_eq!(m.amount(), dec!(2.14));

        let m = Money::new(dec!(2.134999), usd());
        assert_eq!(m.amount(), dec!(2.13));
    }

    #[test]
    fn test_zero_digit_currency() {
        let jpy = Currency::of("JPY", 0).unwrap();
        let m = Money::new(dec!(1234.5), jpy);
        assert_eq!(m.amount(), dec!(1234)); // 1234.5 is midpoint, 1234 is even
    }

    #[test]
    fn test_add_and_subtract() {
        let a = Money::new(dec!(100.10), usd());
        let b = Money::new(dec!(0.05), usd());

        assert_eq!(a.add(&b).unwrap().amount(), dec!(100.15));
        assert_eq!(a.subtract(&b).unwrap().amount(), dec!(100.05));
    }

    #[test]
    fn test_currency_mismatch_is_fatal() {
        let a = Money::from_major(10, usd());
        let b = Money::from_major(10, eur());

        assert!(matches!(
            a.add(&b),
            Err(ProcessorError::CurrencyMismatch { .. })
        ));
        assert!(matches!(
            a.subtract(&b),
            Err(ProcessorError::CurrencyMismatch { .. })
        ));
        assert!(a.min(&b).is_err());
        assert!(a.is_greater_than(&b).is_err());
    }

    #[test]
    fn test_multiplied_by_with_explicit_rounding() {
        let m = Money::new(dec!(100.00), usd());

        let half_even = m.multiplied_by(dec!(0.10125), RoundingMode::HalfEven);
        assert_eq!(half_even.amount(), dec!(10.12));

        let half_up = m.multiplied_by(dec!(0.10125), RoundingMode::HalfUp);
        assert_eq!(half_up.amount(), dec!(10.13));

        let down = m.multiplied_by(dec!(0.10129), RoundingMode::Down);
        assert_eq!(down.amount(), dec!(10.12));
    }

    #[test]
    fn test_sign_helpers() {
        let zero = Money::zero(usd());
        assert!(zero.is_zero());
        assert!(!zero.is_positive());
        assert!(!zero.is_negative());

        let credit = Money::new(dec!(-5.00), usd());
        assert!(credit.is_negative());
        assert_eq!(credit.abs().amount(), dec!(5.00));
        assert!(credit.negative_to_zero().is_zero());

        let debit = Money::new(dec!(5.00), usd());
        assert_eq!(debit.negative_to_zero().amount(), dec!(5.00));
    }

    #[test]
    fn test_min_max_and_compare() {
        let a = Money::from_major(10, usd());
        let b = Money::from_major(25, usd());

        assert_eq!(a.min(&b).unwrap(), a);
        assert_eq!(a.max(&b).unwrap(), b);
        assert!(b.is_greater_than(&a).unwrap());
        assert!(a.is_less_than(&b).unwrap());
        assert_eq!(a.checked_cmp(&a).unwrap(), Ordering::Equal);
    }

    #[test]
    fn test_from_minor_scales_to_currency() {
        assert_eq!(Money::from_minor(1250, usd()).amount(), dec!(12.50));

        let jpy = Currency::of("JPY", 0).unwrap();
        assert_eq!(Money::from_minor(1250, jpy).amount(), dec!(1250));
    }

    #[test]
    fn test_currency_code_validation() {
        assert!(CurrencyCode::new("USD").is_ok());
        assert!(CurrencyCode::new("usd").is_err());
        assert!(CurrencyCode::new("US").is_err());
        assert!(CurrencyCode::new("USDT").is_err());
        assert_eq!(CurrencyCode::new("GBP").unwrap().to_string(), "GBP");
    }
}
