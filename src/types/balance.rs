//! Balance value type for the escrow ledger
//!
//! A `Balance` is the state of one `(user, currency)` row: the total `amount`
//! held and the `locked` portion reserved by open trades or pending
//! withdrawals. The fields are private and every constructor or mutator
//! re-establishes `0 <= locked <= amount`, so a balance violating that
//! invariant cannot be built.

use super::ids::{Currency, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a balance row
///
/// Ordering is by user, then currency. Units of work acquire rows in this
/// order so two flows touching the same pair of rows can never deadlock.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BalanceKey {
    pub user: UserId,
    pub currency: Currency,
}

impl BalanceKey {
    pub fn new(user: UserId, currency: Currency) -> Self {
        Self { user, currency }
    }
}

impl fmt::Display for BalanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user, self.currency)
    }
}

/// Why a balance mutation was refused
///
/// Carries no row identity; the ledger session maps it onto a
/// `LedgerError` with the user and currency attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceRejection {
    /// Amount was zero or negative
    NonPositive,
    /// Not enough unlocked funds
    Insufficient { available: Decimal },
    /// Unlock larger than what is currently locked
    ExceedsLocked { locked: Decimal },
    /// Decimal arithmetic overflowed
    Overflow,
}

/// Funds of one user in one currency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawBalance")]
pub struct Balance {
    amount: Decimal,
    locked: Decimal,
}

#[derive(Deserialize)]
struct RawBalance {
    amount: Decimal,
    locked: Decimal,
}

impl TryFrom<RawBalance> for Balance {
    type Error = String;

    fn try_from(raw: RawBalance) -> Result<Self, Self::Error> {
        Balance::new(raw.amount, raw.locked).ok_or_else(|| {
            format!(
                "balance violates 0 <= locked <= amount (amount {}, locked {})",
                raw.amount, raw.locked
            )
        })
    }
}

impl Balance {
    pub const ZERO: Balance = Balance {
        amount: Decimal::ZERO,
        locked: Decimal::ZERO,
    };

    /// Build a balance, returning `None` unless `0 <= locked <= amount`
    pub fn new(amount: Decimal, locked: Decimal) -> Option<Self> {
        if locked < Decimal::ZERO || locked > amount {
            return None;
        }
        Some(Self { amount, locked })
    }

    /// Total funds, locked or not
    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn locked(&self) -> Decimal {
        self.locked
    }

    /// `amount - locked`: the only part spendable by new operations
    pub fn available(&self) -> Decimal {
        self.amount - self.locked
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero() && self.locked.is_zero()
    }

    /// Increase `amount`
    pub fn credit(&self, value: Decimal) -> Result<Balance, BalanceRejection> {
        ensure_positive(value)?;
        let amount = self
            .amount
            .checked_add(value)
            .ok_or(BalanceRejection::Overflow)?;
        Ok(Balance { amount, ..*self })
    }

    /// Decrease `amount`, never reaching into locked funds
    pub fn debit(&self, value: Decimal) -> Result<Balance, BalanceRejection> {
        ensure_positive(value)?;
        self.ensure_available(value)?;
        Ok(Balance {
            amount: self.amount - value,
            ..*self
        })
    }

    /// Reserve part of the available funds
    pub fn lock(&self, value: Decimal) -> Result<Balance, BalanceRejection> {
        ensure_positive(value)?;
        self.ensure_available(value)?;
        Ok(Balance {
            locked: self.locked + value,
            ..*self
        })
    }

    /// Return previously locked funds to available
    pub fn unlock(&self, value: Decimal) -> Result<Balance, BalanceRejection> {
        ensure_positive(value)?;
        if value > self.locked {
            return Err(BalanceRejection::ExceedsLocked {
                locked: self.locked,
            });
        }
        Ok(Balance {
            locked: self.locked - value,
            ..*self
        })
    }

    fn ensure_available(&self, value: Decimal) -> Result<(), BalanceRejection> {
        let available = self.available();
        if available < value {
            return Err(BalanceRejection::Insufficient { available });
        }
        Ok(())
    }
}

impl Default for Balance {
    fn default() -> Self {
        Self::ZERO
    }
}

fn ensure_positive(value: Decimal) -> Result<(), BalanceRejection> {
    if value <= Decimal::ZERO {
        return Err(BalanceRejection::NonPositive);
    }
    Ok(())
}
