//! Deposits and withdrawals through the payment rail
//!
//! Deposits are credited immediately and are idempotent per external
//! reference. Withdrawals are two-phase: the requested amount is locked,
//! then either subtracted when the rail confirms or unlocked when it refuses.

use super::ledger::Ledger;
use super::traits::{Clock, LedgerStore};
use crate::types::{
    BalanceKey, Currency, LedgerError, Memo, Transaction, TransactionType, UserId, WithdrawalId,
    WithdrawalStatus, WithdrawalTicket,
};
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::Arc;

pub struct FundingDesk<S: LedgerStore> {
    ledger: Ledger<S>,
    clock: Arc<dyn Clock>,
    /// External references of deposits already credited
    references: DashSet<String>,
    withdrawals: DashMap<WithdrawalId, Arc<Mutex<WithdrawalTicket>>>,
}

impl<S: LedgerStore> FundingDesk<S> {
    pub fn new(ledger: Ledger<S>, clock: Arc<dyn Clock>) -> Self {
        Self {
            ledger,
            clock,
            references: DashSet::new(),
            withdrawals: DashMap::new(),
        }
    }

    /// Credit funds received on the rail
    ///
    /// # Errors
    ///
    /// `DuplicateReference` if `external_ref` was already credited, plus any
    /// ledger error from the credit itself (the reference is then released).
    pub fn deposit(
        &self,
        user: &UserId,
        currency: &Currency,
        amount: Decimal,
        external_ref: &str,
    ) -> Result<Transaction, LedgerError> {
        if !self.references.insert(external_ref.to_string()) {
            return Err(LedgerError::DuplicateReference {
                reference: external_ref.to_string(),
            });
        }

        let memo = Memo::new(TransactionType::Deposit, format!("deposit {}", external_ref))
            .with("external_ref", external_ref);
        let result = self.ledger.add(user, currency, amount, &memo);
        match &result {
            Ok(_) => tracing::info!(%user, %currency, %amount, external_ref, "deposit credited"),
            Err(_) => {
                self.references.remove(external_ref);
            }
        }
        result
    }

    /// Lock funds for a payout
    pub fn request_withdrawal(
        &self,
        user: &UserId,
        currency: &Currency,
        amount: Decimal,
        external_ref: Option<String>,
    ) -> Result<WithdrawalTicket, LedgerError> {
        let id = WithdrawalId::new();
        let memo =
            Memo::new(TransactionType::Withdrawal, "withdrawal hold").with("withdrawal_id", id);
        self.ledger.lock(user, currency, amount, &memo)?;

        let now = self.clock.now();
        let ticket = WithdrawalTicket {
            id,
            user: user.clone(),
            currency: currency.clone(),
            amount,
            status: WithdrawalStatus::Pending,
            external_ref,
            created_at: now,
            updated_at: now,
        };
        self.withdrawals
            .insert(id, Arc::new(Mutex::new(ticket.clone())));
        tracing::info!(withdrawal = %id, %user, %currency, %amount, "withdrawal requested");
        Ok(ticket)
    }

    /// The rail paid out; the locked funds leave the ledger
    pub fn complete_withdrawal(&self, id: WithdrawalId) -> Result<WithdrawalTicket, LedgerError> {
        self.finish(id, WithdrawalStatus::Completed)
    }

    /// The rail refused; the locked funds become available again
    pub fn reject_withdrawal(&self, id: WithdrawalId) -> Result<WithdrawalTicket, LedgerError> {
        self.finish(id, WithdrawalStatus::Rejected)
    }

    pub fn get_withdrawal(&self, id: WithdrawalId) -> Result<WithdrawalTicket, LedgerError> {
        Ok(self.ticket(id)?.lock().clone())
    }

    fn finish(
        &self,
        id: WithdrawalId,
        outcome: WithdrawalStatus,
    ) -> Result<WithdrawalTicket, LedgerError> {
        let shared = self.ticket(id)?;
        let mut ticket = shared.lock();
        if ticket.status != WithdrawalStatus::Pending {
            let action = match outcome {
                WithdrawalStatus::Rejected => "reject",
                _ => "complete",
            };
            return Err(LedgerError::invalid_transition("withdrawal", id, ticket.status, action));
        }

        let key = BalanceKey::new(ticket.user.clone(), ticket.currency.clone());
        let amount = ticket.amount;
        let memo = Memo::new(TransactionType::Withdrawal, format!("withdrawal {}", outcome))
            .with("withdrawal_id", id);
        self.ledger.transact(std::slice::from_ref(&key), |s| {
            s.unlock(&key, amount, &memo)?;
            if outcome == WithdrawalStatus::Completed {
                s.subtract(&key, amount, &memo)?;
            }
            Ok(())
        })?;

        ticket.status = outcome;
        ticket.updated_at = self.clock.now();
        tracing::info!(withdrawal = %id, status = %outcome, "withdrawal finished");
        Ok(ticket.clone())
    }

    fn ticket(&self, id: WithdrawalId) -> Result<Arc<Mutex<WithdrawalTicket>>, LedgerError> {
        self.withdrawals
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| LedgerError::WithdrawalNotFound {
                withdrawal: id.to_string(),
            })
    }
}
