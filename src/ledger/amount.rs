//! Currency codes and exact decimal amounts.
//!
//! Amount values travel as the decimal text the caller supplied. They are
//! converted to the ledger's mantissa/exponent form only when encoding, so no
//! value ever passes through a binary floating-point type.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::ledger::address::Account;
use crate::ledger::types::{LedgerError, LedgerResult};

/// Significant digits an issued-currency value can carry.
pub const MAX_PRECISION: usize = 16;
/// Smallest normalized mantissa (10^15).
pub const MIN_MANTISSA: u64 = 1_000_000_000_000_000;
/// Largest normalized mantissa (10^16 - 1).
pub const MAX_MANTISSA: u64 = 9_999_999_999_999_999;
pub const MIN_EXPONENT: i32 = -96;
pub const MAX_EXPONENT: i32 = 80;

/// Three-character issued currency code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    pub fn parse(text: &str) -> LedgerResult<Self> {
        let text = text.trim();
        if text.len() != 3 || !text.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(LedgerError::parse(
                "currency",
                format!("'{}' is not a three-character code", text),
            ));
        }
        if text.eq_ignore_ascii_case("XRP") {
            return Err(LedgerError::parse("currency", "XRP cannot be issued"));
        }
        Ok(Self(text.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 160-bit wire form: 12 zero bytes, the ASCII code, 5 zero bytes.
    pub fn to_bytes(&self) -> [u8; 20] {
        let mut out = [0u8; 20];
        out[12..15].copy_from_slice(self.0.as_bytes());
        out
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0
    }
}

impl std::str::FromStr for CurrencyCode {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A non-negative decimal value kept exactly as written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub struct DecimalValue {
    text: String,
    mantissa: u64,
    exponent: i32,
}

impl DecimalValue {
    /// Parse plain decimal notation (`"500"`, `"0.25"`, `"1000000000"`).
    pub fn parse(text: &str) -> LedgerResult<Self> {
        let text = text.trim();
        let (whole, fraction) = match text.split_once('.') {
            Some((w, f)) => (w, f),
            None => (text, ""),
        };

        if whole.is_empty() && fraction.is_empty() {
            return Err(LedgerError::parse("amount", "empty value"));
        }
        if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
            return Err(LedgerError::parse(
                "amount",
                format!("'{}' is not a non-negative decimal", text),
            ));
        }

        let digits: String = whole.chars().chain(fraction.chars()).collect();
        let mut exponent = -(fraction.len() as i32);
        let significant = digits.trim_start_matches('0');
        let trimmed = significant.trim_end_matches('0');
        exponent += (significant.len() - trimmed.len()) as i32;

        if trimmed.is_empty() {
            return Ok(Self {
                text: text.to_string(),
                mantissa: 0,
                exponent: 0,
            });
        }
        if trimmed.len() > MAX_PRECISION {
            return Err(LedgerError::parse(
                "amount",
                format!("'{}' has more than {} significant digits", text, MAX_PRECISION),
            ));
        }

        let mut mantissa: u64 = trimmed
            .parse()
            .map_err(|e| LedgerError::parse("amount", format!("'{}': {}", text, e)))?;
        while mantissa < MIN_MANTISSA {
            mantissa *= 10;
            exponent -= 1;
        }

        if !(MIN_EXPONENT..=MAX_EXPONENT).contains(&exponent) {
            return Err(LedgerError::parse(
                "amount",
                format!("'{}' is outside the representable range", text),
            ));
        }

        Ok(Self {
            text: text.to_string(),
            mantissa,
            exponent,
        })
    }

    pub fn is_zero(&self) -> bool {
        self.mantissa == 0
    }

    /// Normalized `(mantissa, exponent)`; zero is `(0, 0)`.
    pub fn mantissa_exponent(&self) -> (u64, i32) {
        (self.mantissa, self.exponent)
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for DecimalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl From<DecimalValue> for String {
    fn from(value: DecimalValue) -> Self {
        value.text
    }
}

impl std::str::FromStr for DecimalValue {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<'de> Deserialize<'de> for DecimalValue {
    /// Accepts a JSON string or integer. Floats are refused because their
    /// text has already been rounded by the time we see it.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Integer(u64),
            Float(f64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(text) => DecimalValue::parse(&text).map_err(serde::de::Error::custom),
            Raw::Integer(n) => DecimalValue::parse(&n.to_string()).map_err(serde::de::Error::custom),
            Raw::Float(_) => Err(serde::de::Error::custom(
                "fractional amounts must be sent as decimal strings",
            )),
        }
    }
}

/// An issued-currency amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyAmount {
    pub currency: CurrencyCode,
    pub value: DecimalValue,
    pub issuer: Account,
}

impl CurrencyAmount {
    pub fn new(currency: CurrencyCode, value: DecimalValue, issuer: Account) -> Self {
        Self {
            currency,
            value,
            issuer,
        }
    }
}

/// Native amount in drops, used for fees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Drops(pub u64);

impl Drops {
    /// Largest native amount the ledger can express.
    pub const MAX: u64 = 100_000_000_000_000_000;
}

impl fmt::Display for Drops {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
