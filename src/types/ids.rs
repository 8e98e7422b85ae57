//! Identifier types for the escrow ledger
//!
//! Users come from the (external) identity layer as opaque strings, currencies
//! are short uppercase codes, and every record the engine creates is keyed by
//! a random UUID wrapped in its own newtype so ids of different entities can't
//! be mixed up.

use super::error::LedgerError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Already-authenticated user identifier
///
/// The engine never validates identity; it only needs a stable key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Currency code such as `BRL`, `USDT` or `BTC`
///
/// Always stored uppercase. Codes are 2 to 10 ASCII alphanumeric characters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    /// Parse and normalize a currency code
    ///
    /// Surrounding whitespace is ignored and the code is uppercased.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidCurrency` if the code is empty, too long,
    /// or contains anything other than ASCII letters and digits.
    pub fn parse(code: &str) -> Result<Self, LedgerError> {
        let code = code.trim();
        let valid = (2..=10).contains(&code.len())
            && code.chars().all(|c| c.is_ascii_alphanumeric());
        if !valid {
            return Err(LedgerError::invalid_currency(code));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Currency {
    type Error = LedgerError;

    fn try_from(code: String) -> Result<Self, Self::Error> {
        Self::parse(&code)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a fresh random id
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

uuid_id!(
    /// Journal entry identifier
    TransactionId
);
uuid_id!(
    /// Single-party exchange order identifier
    OrderId
);
uuid_id!(
    /// P2P offer identifier
    OfferId
);
uuid_id!(
    /// P2P trade (escrow unit) identifier
    TradeId
);
uuid_id!(
    /// Pending withdrawal ticket identifier
    WithdrawalId
);
