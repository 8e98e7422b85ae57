//! Core traits for the balance store and the engine's external collaborators
//!
//! `LedgerStore` and `UnitOfWork` are the seam between the ledger service and
//! whatever keeps balances durable. `PriceFeed`, `ExchangeGateway` and `Clock`
//! are the outside world as the engines see it.

use crate::types::{
    Balance, BalanceKey, Currency, LedgerError, Order, Page, Transaction, TransactionFilter, UserId,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Exclusive, all-or-nothing access to a fixed set of balance rows
///
/// Reads see the unit's own staged writes. Nothing becomes visible to other
/// readers until [`UnitOfWork::commit`]; dropping the unit without committing
/// discards every staged write and journal entry.
pub trait UnitOfWork {
    /// Current value of a row held by this unit
    ///
    /// # Errors
    ///
    /// `InvariantViolation` if the row was not acquired in `begin`.
    fn balance(&self, key: &BalanceKey) -> Result<Balance, LedgerError>;

    /// Stage a new value for a held row
    ///
    /// # Errors
    ///
    /// `InvariantViolation` if the row was not acquired in `begin`.
    fn put(&mut self, key: &BalanceKey, balance: Balance) -> Result<(), LedgerError>;

    /// Stage a journal entry
    fn append(&mut self, entry: Transaction);

    /// Publish staged rows and entries, then release the rows
    fn commit(self) -> Result<(), LedgerError>;
}

/// Durable home of balance rows and the transaction journal
///
/// Implementations must serialize units of work touching a common row and
/// must acquire rows in `BalanceKey` order so that two units locking the same
/// rows in a different request order cannot deadlock.
pub trait LedgerStore: Send + Sync {
    type Work<'a>: UnitOfWork
    where
        Self: 'a;

    /// Acquire every row in `keys` (duplicates allowed) and start a unit of work
    fn begin(&self, keys: &[BalanceKey]) -> Self::Work<'_>;

    /// Committed value of a row; zero if the row was never created
    fn balance(&self, key: &BalanceKey) -> Balance;

    /// A user's journal entries matching `filter`, newest first
    fn history(
        &self,
        user: &UserId,
        filter: &TransactionFilter,
        page_size: usize,
    ) -> Page<Transaction>;

    /// Snapshot of every existing row
    fn balances(&self) -> Vec<(BalanceKey, Balance)>;
}

/// Spot prices from the exchange integration
pub trait PriceFeed: Send + Sync {
    /// Price of one unit of `base` in `quote`
    ///
    /// # Errors
    ///
    /// `PriceUnavailable` if the pair is not quoted.
    fn price(&self, base: &Currency, quote: &Currency) -> Result<Decimal, LedgerError>;
}

/// Fill confirmation returned by the exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReport {
    pub external_ref: String,
}

/// The external exchange that actually fills single-party orders
pub trait ExchangeGateway: Send + Sync {
    /// Execute the order; `Err` carries the exchange's failure reason
    fn execute(&self, order: &Order) -> Result<ExecutionReport, String>;
}

/// Source of "now" for expiry decisions
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
