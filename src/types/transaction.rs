//! Journal types for the escrow ledger
//!
//! Every balance mutation appends one immutable `Transaction`. Together the
//! entries form the causal history of each balance: replaying a user's
//! entries for a currency in order reproduces the current balance.

use super::balance::Balance;
use super::ids::{Currency, TransactionId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Business reason for a balance mutation
///
/// Supplied by the caller; the ledger itself does not interpret it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    /// Funds arriving from the payment rail
    Deposit,

    /// Funds leaving through the payment rail (lock on request, subtract on payout)
    Withdrawal,

    /// Single-party exchange buy
    BuyCrypto,

    /// Single-party exchange sell
    SellCrypto,

    /// Escrow lock, release or settlement of a P2P trade
    P2pTrade,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionType::Deposit => "DEPOSIT",
            TransactionType::Withdrawal => "WITHDRAWAL",
            TransactionType::BuyCrypto => "BUY_CRYPTO",
            TransactionType::SellCrypto => "SELL_CRYPTO",
            TransactionType::P2pTrade => "P2P_TRADE",
        };
        f.write_str(s)
    }
}

/// The ledger primitive that produced an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerOp {
    Add,
    Subtract,
    Lock,
    Unlock,
}

impl LedgerOp {
    /// Signed effect of the operation on available funds
    pub fn signed(&self, amount: Decimal) -> Decimal {
        match self {
            LedgerOp::Add | LedgerOp::Unlock => amount,
            LedgerOp::Subtract | LedgerOp::Lock => -amount,
        }
    }
}

impl fmt::Display for LedgerOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LedgerOp::Add => "ADD",
            LedgerOp::Subtract => "SUBTRACT",
            LedgerOp::Lock => "LOCK",
            LedgerOp::Unlock => "UNLOCK",
        };
        f.write_str(s)
    }
}

/// Caller-supplied context for a ledger entry
///
/// # Examples
///
/// ```
/// use rust_escrow_ledger::types::{Memo, TransactionType};
///
/// let memo = Memo::new(TransactionType::Deposit, "PIX deposit")
///     .with("external_ref", "e2e-7781");
/// assert_eq!(memo.metadata["external_ref"], "e2e-7781");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memo {
    pub kind: TransactionType,
    pub description: String,
    pub metadata: BTreeMap<String, String>,
}

impl Memo {
    pub fn new(kind: TransactionType, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Attach a metadata entry such as a linked trade or order id
    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}

/// Immutable journal entry
///
/// `amount` is the signed change to *available* funds: positive for add and
/// unlock, negative for subtract and lock. `op` says which of `amount`/`locked`
/// moved. `balance_after` is the row snapshot right after the mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub user: UserId,
    pub kind: TransactionType,
    pub op: LedgerOp,
    pub currency: Currency,
    pub amount: Decimal,
    pub balance_after: Balance,
    pub description: String,
    pub metadata: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

/// Query for a user's transaction history
///
/// `page` is zero-based; `page_size` falls back to the engine default and is
/// capped by the configured maximum.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionFilter {
    pub currency: Option<Currency>,
    pub kind: Option<TransactionType>,
    pub page: usize,
    pub page_size: Option<usize>,
}

impl TransactionFilter {
    pub fn matches(&self, tx: &Transaction) -> bool {
        self.currency.as_ref().is_none_or(|c| *c == tx.currency)
            && self.kind.is_none_or(|k| k == tx.kind)
    }
}

/// One page of query results
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub page_size: usize,
    /// Number of matching items across all pages
    pub total: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn entry(currency: &str, kind: TransactionType) -> Transaction {
        Transaction {
            id: TransactionId::new(),
            user: "alice".into(),
            kind,
            op: LedgerOp::Add,
            currency: Currency::parse(currency).unwrap(),
            amount: dec!(1),
            balance_after: Balance::ZERO,
            description: String::new(),
            metadata: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_signed_amount_tracks_available() {
        assert_eq!(LedgerOp::Add.signed(dec!(5)), dec!(5));
        assert_eq!(LedgerOp::Subtract.signed(dec!(5)), dec!(-5));
        assert_eq!(LedgerOp::Lock.signed(dec!(5)), dec!(-5));
        assert_eq!(LedgerOp::Unlock.signed(dec!(5)), dec!(5));
    }

    #[test]
    fn test_filter_by_currency_and_kind() {
        let filter = TransactionFilter {
            currency: Some(Currency::parse("BRL").unwrap()),
            kind: Some(TransactionType::Deposit),
            ..Default::default()
        };
        assert!(filter.matches(&entry("BRL", TransactionType::Deposit)));
        assert!(!filter.matches(&entry("BTC", TransactionType::Deposit)));
        assert!(!filter.matches(&entry("BRL", TransactionType::P2pTrade)));
        assert!(TransactionFilter::default().matches(&entry("BTC", TransactionType::BuyCrypto)));
    }

    #[test]
    fn test_type_display_matches_wire_names() {
        assert_eq!(TransactionType::P2pTrade.to_string(), "P2P_TRADE");
        assert_eq!(TransactionType::BuyCrypto.to_string(), "BUY_CRYPTO");
    }
}
