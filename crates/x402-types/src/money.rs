//! Human-readable amount parsing for configuration-time prices.
//!
//! Keeps float/locale-formatted amounts (`"$1.50"`, `"10,000"`) out of the
//! verify/settle hot paths: operators write these into route configuration, and this
//! module turns them into an exact decimal before anything is converted to a base-unit
//! integer string.

use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

#[derive(Debug, Clone, PartialEq)]
pub struct MoneyAmount(pub Decimal);

static MIN: LazyLock<Decimal> = LazyLock::new(|| Decimal::from_str("0.000000001").unwrap());
static MAX: LazyLock<Decimal> = LazyLock::new(|| Decimal::from_str("999999999").unwrap());

#[derive(Debug, thiserror::Error)]
pub enum MoneyAmountParseError {
    #[error("invalid number format")]
    InvalidFormat,
    #[error("amount out of range")]
    OutOfRange,
    #[error("negative value is not allowed")]
    Negative,
}

impl MoneyAmount {
    pub fn scale(&self) -> u32 {
        self.0.scale()
    }

    pub fn mantissa(&self) -> u128 {
        self.0.mantissa().unsigned_abs()
    }

    pub fn parse(input: &str) -> Result<Self, MoneyAmountParseError> {
        let cleaned: String = input
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
            .collect();
        let parsed = Decimal::from_str(&cleaned).map_err(|_| MoneyAmountParseError::InvalidFormat)?;
        if parsed.is_sign_negative() {
            return Err(MoneyAmountParseError::Negative);
        }
        if parsed < *MIN || parsed > *MAX {
            return Err(MoneyAmountParseError::OutOfRange);
        }
        Ok(MoneyAmount(parsed))
    }
}

impl TryFrom<f64> for MoneyAmount {
    type Error = MoneyAmountParseError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        let decimal = Decimal::from_f64(value).ok_or(MoneyAmountParseError::OutOfRange)?;
        if decimal.is_sign_negative() {
            return Err(MoneyAmountParseError::Negative);
        }
        Ok(MoneyAmount(decimal))
    }
}

impl FromStr for MoneyAmount {
    type Err = MoneyAmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MoneyAmount::parse(s)
    }
}

impl fmt::Display for MoneyAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_currency_formatted_strings() {
        let amount = MoneyAmount::parse("$10.50").unwrap();
        assert_eq!(amount.scale(), 2);
        assert_eq!(amount.mantissa(), 1050);
    }

    #[test]
    fn rejects_negative_amounts() {
        assert!(matches!(
            MoneyAmount::parse("-5"),
            Err(MoneyAmountParseError::Negative)
        ));
    }
}
