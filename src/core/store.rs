//! In-memory balance store with row-level locking
//!
//! This module provides `InMemoryStore`, the `LedgerStore` used by the engines
//! and the replay tool.
//!
//! # Design
//!
//! Balance rows live in a `DashMap`, but a `DashMap` guard is never held across
//! a unit of work: two keys sharing a shard would deadlock against each other.
//! Instead every row is an `Arc<Mutex<Option<Balance>>>` and a unit of work
//! holds owned `ArcMutexGuard`s, taken in `BalanceKey` order. `None` marks a
//! row that has been reserved in the map but never committed, so rows are
//! created lazily by the first unit of work that commits to them.
//!
//! The journal is a second `DashMap` keyed by user. Entries are appended while
//! the unit still holds its rows, so each user's journal order matches the
//! order in which their balances changed.

use super::traits::{LedgerStore, UnitOfWork};
use crate::types::{Balance, BalanceKey, LedgerError, Page, Transaction, TransactionFilter, UserId};
use dashmap::DashMap;
use parking_lot::{ArcMutexGuard, Mutex, RawMutex};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

type Row = Arc<Mutex<Option<Balance>>>;

/// Thread-safe balance rows plus the per-user transaction journal
#[derive(Debug, Default)]
pub struct InMemoryStore {
    rows: DashMap<BalanceKey, Row>,
    journal: DashMap<UserId, Vec<Transaction>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to a row, reserving it if absent
    ///
    /// The map guard is dropped before returning, so callers may block on the
    /// row's mutex without holding a shard lock.
    fn row(&self, key: &BalanceKey) -> Row {
        self.rows
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    /// Number of journal entries across all users
    pub fn journal_len(&self) -> usize {
        self.journal.iter().map(|entries| entries.len()).sum()
    }
}

/// A unit of work over an `InMemoryStore`
///
/// Holds every acquired row until it is committed or dropped.
pub struct MemoryWork<'a> {
    store: &'a InMemoryStore,
    held: BTreeMap<BalanceKey, ArcMutexGuard<RawMutex, Option<Balance>>>,
    staged: BTreeMap<BalanceKey, Balance>,
    entries: Vec<Transaction>,
}

impl MemoryWork<'_> {
    fn not_held(key: &BalanceKey) -> LedgerError {
        LedgerError::invariant_violation(
            &key.user,
            &key.currency,
            "row was not acquired by this unit of work",
        )
    }
}

impl UnitOfWork for MemoryWork<'_> {
    fn balance(&self, key: &BalanceKey) -> Result<Balance, LedgerError> {
        if let Some(staged) = self.staged.get(key) {
            return Ok(*staged);
        }
        let guard = self.held.get(key).ok_or_else(|| Self::not_held(key))?;
        Ok(guard.unwrap_or(Balance::ZERO))
    }

    fn put(&mut self, key: &BalanceKey, balance: Balance) -> Result<(), LedgerError> {
        if !self.held.contains_key(key) {
            return Err(Self::not_held(key));
        }
        self.staged.insert(key.clone(), balance);
        Ok(())
    }

    fn append(&mut self, entry: Transaction) {
        self.entries.push(entry);
    }

    fn commit(mut self) -> Result<(), LedgerError> {
        for (key, balance) in std::mem::take(&mut self.staged) {
            let guard = self.held.get_mut(&key).ok_or_else(|| Self::not_held(&key))?;
            **guard = Some(balance);
        }

        let committed = self.entries.len();
        for entry in self.entries.drain(..) {
            self.store
                .journal
                .entry(entry.user.clone())
                .or_default()
                .push(entry);
        }

        tracing::trace!(rows = self.held.len(), entries = committed, "unit of work committed");
        // Rows are released when `self.held` drops here
        Ok(())
    }
}

impl LedgerStore for InMemoryStore {
    type Work<'a> = MemoryWork<'a>;

    fn begin(&self, keys: &[BalanceKey]) -> MemoryWork<'_> {
        let ordered: BTreeSet<&BalanceKey> = keys.iter().collect();
        let mut held = BTreeMap::new();
        for key in ordered {
            let guard = self.row(key).lock_arc();
            held.insert(key.clone(), guard);
        }

        MemoryWork {
            store: self,
            held,
            staged: BTreeMap::new(),
            entries: Vec::new(),
        }
    }

    fn balance(&self, key: &BalanceKey) -> Balance {
        let row = match self.rows.get(key) {
            Some(row) => row.clone(),
            None => return Balance::ZERO,
        };
        let value = *row.lock();
        value.unwrap_or(Balance::ZERO)
    }

    fn history(
        &self,
        user: &UserId,
        filter: &TransactionFilter,
        page_size: usize,
    ) -> Page<Transaction> {
        let Some(entries) = self.journal.get(user) else {
            return Page {
                items: Vec::new(),
                page: filter.page,
                page_size,
                total: 0,
            };
        };

        let matching: Vec<&Transaction> =
            entries.iter().rev().filter(|tx| filter.matches(tx)).collect();
        let total = matching.len();
        let items = matching
            .into_iter()
            .skip(filter.page.saturating_mul(page_size))
            .take(page_size)
            .cloned()
            .collect();

        Page {
            items,
            page: filter.page,
            page_size,
            total,
        }
    }

    fn balances(&self) -> Vec<(BalanceKey, Balance)> {
        let rows: Vec<(BalanceKey, Row)> = self
            .rows
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let mut snapshot: Vec<(BalanceKey, Balance)> = rows
            .into_iter()
            .filter_map(|(key, row)| {
                let value = *row.lock();
                value.map(|balance| (key, balance))
            })
            .collect();
        snapshot.sort_by(|a, b| a.0.cmp(&b.0));
        snapshot
    }
}
