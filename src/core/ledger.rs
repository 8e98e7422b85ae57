//! Ledger service: the only writer of balances and the transaction log
//!
//! Every balance change goes through a [`Session`] opened by
//! [`Ledger::transact`]. A session owns a unit of work over a fixed set of
//! rows; each primitive it performs updates one row and appends exactly one
//! journal entry. If the closure returns `Ok` everything commits together, if
//! it returns `Err` nothing does.
//!
//! The single-operation helpers (`add`, `subtract`, `lock`, `unlock`) are
//! thin wrappers opening a one-row session.

use super::config::EngineConfig;
use super::traits::{Clock, LedgerStore, UnitOfWork};
use crate::types::{
    Balance, BalanceKey, BalanceRejection, Currency, LedgerError, LedgerOp, Memo, Page,
    Transaction, TransactionFilter, TransactionId, UserId,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Handle to the ledger; cheap to clone and share between engines
pub struct Ledger<S: LedgerStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl<S: LedgerStore> Clone for Ledger<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            config: self.config,
        }
    }
}

impl<S: LedgerStore> Ledger<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, config: EngineConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Run `f` atomically over the rows in `keys`
    ///
    /// Rows are acquired before `f` runs and held until it returns. Every
    /// row the closure touches must appear in `keys`.
    ///
    /// # Errors
    ///
    /// Whatever `f` returns; in that case no balance or journal change made
    /// inside the session is visible afterwards.
    pub fn transact<'s, T, F>(&'s self, keys: &[BalanceKey], f: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&mut Session<S::Work<'s>>) -> Result<T, LedgerError>,
    {
        let mut session = Session {
            work: self.store.begin(keys),
            now: self.clock.now(),
        };

        match f(&mut session) {
            Ok(value) => {
                session.work.commit()?;
                Ok(value)
            }
            Err(err) => {
                if err.is_fatal() {
                    tracing::error!(alert = true, error = %err, "ledger unit of work rolled back");
                } else {
                    tracing::debug!(error = %err, "ledger unit of work rolled back");
                }
                Err(err)
            }
        }
    }

    /// Increase a user's amount
    pub fn add(
        &self,
        user: &UserId,
        currency: &Currency,
        amount: Decimal,
        memo: &Memo,
    ) -> Result<Transaction, LedgerError> {
        let key = BalanceKey::new(user.clone(), currency.clone());
        self.transact(std::slice::from_ref(&key), |s| s.add(&key, amount, memo))
    }

    /// Decrease a user's amount; only available funds may be subtracted
    pub fn subtract(
        &self,
        user: &UserId,
        currency: &Currency,
        amount: Decimal,
        memo: &Memo,
    ) -> Result<Transaction, LedgerError> {
        let key = BalanceKey::new(user.clone(), currency.clone());
        self.transact(std::slice::from_ref(&key), |s| s.subtract(&key, amount, memo))
    }

    /// Reserve available funds
    pub fn lock(
        &self,
        user: &UserId,
        currency: &Currency,
        amount: Decimal,
        memo: &Memo,
    ) -> Result<Transaction, LedgerError> {
        let key = BalanceKey::new(user.clone(), currency.clone());
        self.transact(std::slice::from_ref(&key), |s| s.lock(&key, amount, memo))
    }

    /// Release reserved funds
    pub fn unlock(
        &self,
        user: &UserId,
        currency: &Currency,
        amount: Decimal,
        memo: &Memo,
    ) -> Result<Transaction, LedgerError> {
        let key = BalanceKey::new(user.clone(), currency.clone());
        self.transact(std::slice::from_ref(&key), |s| s.unlock(&key, amount, memo))
    }

    /// Committed balance; zero for a row that was never written
    pub fn get_balance(&self, user: &UserId, currency: &Currency) -> Balance {
        self.store
            .balance(&BalanceKey::new(user.clone(), currency.clone()))
    }

    /// A user's journal, newest first, one page at a time
    pub fn get_transaction_history(
        &self,
        user: &UserId,
        filter: &TransactionFilter,
    ) -> Page<Transaction> {
        let page_size = self.config.page_size(filter.page_size);
        self.store.history(user, filter, page_size)
    }

    /// Every existing row, ordered by user then currency
    pub fn balances(&self) -> Vec<(BalanceKey, Balance)> {
        self.store.balances()
    }

    /// Sum of `(amount, locked)` over all users for one currency
    pub fn currency_totals(&self, currency: &Currency) -> (Decimal, Decimal) {
        self.store
            .balances()
            .into_iter()
            .filter(|(key, _)| key.currency == *currency)
            .fold((Decimal::ZERO, Decimal::ZERO), |(amount, locked), (_, b)| {
                (amount + b.amount(), locked + b.locked())
            })
    }
}

/// Primitive balance operations inside one unit of work
pub struct Session<W: UnitOfWork> {
    work: W,
    now: DateTime<Utc>,
}

impl<W: UnitOfWork> Session<W> {
    pub fn add(
        &mut self,
        key: &BalanceKey,
        amount: Decimal,
        memo: &Memo,
    ) -> Result<Transaction, LedgerError> {
        self.apply(key, LedgerOp::Add, amount, memo)
    }

    pub fn subtract(
        &mut self,
        key: &BalanceKey,
        amount: Decimal,
        memo: &Memo,
    ) -> Result<Transaction, LedgerError> {
        self.apply(key, LedgerOp::Subtract, amount, memo)
    }

    pub fn lock(
        &mut self,
        key: &BalanceKey,
        amount: Decimal,
        memo: &Memo,
    ) -> Result<Transaction, LedgerError> {
        self.apply(key, LedgerOp::Lock, amount, memo)
    }

    pub fn unlock(
        &mut self,
        key: &BalanceKey,
        amount: Decimal,
        memo: &Memo,
    ) -> Result<Transaction, LedgerError> {
        self.apply(key, LedgerOp::Unlock, amount, memo)
    }

    /// Balance of a held row including this session's own changes
    pub fn balance(&self, key: &BalanceKey) -> Result<Balance, LedgerError> {
        self.work.balance(key)
    }

    fn apply(
        &mut self,
        key: &BalanceKey,
        op: LedgerOp,
        amount: Decimal,
        memo: &Memo,
    ) -> Result<Transaction, LedgerError> {
        let current = self.work.balance(key)?;
        let next = match op {
            LedgerOp::Add => current.credit(amount),
            LedgerOp::Subtract => current.debit(amount),
            LedgerOp::Lock => current.lock(amount),
            LedgerOp::Unlock => current.unlock(amount),
        }
        .map_err(|rejection| rejected(key, op, amount, rejection))?;

        self.work.put(key, next)?;

        let entry = Transaction {
            id: TransactionId::new(),
            user: key.user.clone(),
            kind: memo.kind,
            op,
            currency: key.currency.clone(),
            amount: op.signed(amount),
            balance_after: next,
            description: memo.description.clone(),
            metadata: memo.metadata.clone(),
            created_at: self.now,
        };
        self.work.append(entry.clone());

        tracing::trace!(%key, %op, %amount, "staged");
        Ok(entry)
    }
}

fn rejected(
    key: &BalanceKey,
    op: LedgerOp,
    amount: Decimal,
    rejection: BalanceRejection,
) -> LedgerError {
    match rejection {
        BalanceRejection::NonPositive => LedgerError::invalid_amount(amount, "must be positive"),
        BalanceRejection::Insufficient { available } => {
            LedgerError::insufficient_funds(&key.user, &key.currency, available, amount)
        }
        BalanceRejection::ExceedsLocked { locked } => LedgerError::invariant_violation(
            &key.user,
            &key.currency,
            format!("{} of {} exceeds locked {}", op, amount, locked),
        ),
        BalanceRejection::Overflow => {
            LedgerError::arithmetic_overflow(&op.to_string(), &key.user, &key.currency)
        }
    }
}
