//! Peer-to-peer escrow engine
//!
//! Offers are standing advertisements; trades are the escrow unit. While a
//! trade is open the buyer's fiat and the seller's crypto are locked in the
//! ledger, and every way a trade can end moves both locks in one unit of
//! work:
//!
//! - **release**: both sides unlocked, subtracted and credited to the other
//! - **cancel / expire**: both sides unlocked
//!
//! # Locking
//!
//! Offers and trades each sit behind their own `Arc<Mutex<_>>`. Lock order is
//! trade, then offer, then balance rows. `create_trade` holds an offer
//! while it creates the new trade, which is unreachable to anyone else until
//! it is inserted, so the order cannot invert.
//!
//! # Expiry
//!
//! A trade past its deadline is expired the moment anything touches it
//! (`confirm_payment`, `release_crypto`, `cancel_trade`, `get_trade`), so the
//! caller then sees `InvalidStateTransition` from `EXPIRED`. The expiry is
//! committed even though the call itself fails. `expire_due_trades` sweeps
//! the rest.

use super::config::EngineConfig;
use super::ledger::Ledger;
use super::traits::{Clock, LedgerStore};
use crate::types::{
    BalanceKey, CancelBy, LedgerError, Memo, NewOffer, OfferId, OfferSide, OfferStatus, P2POffer,
    P2PTrade, TradeEvent, TradeId, TradeStatus, TransactionType, UserId,
};
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::Arc;

type Shared<T> = Arc<Mutex<T>>;

pub struct P2PEngine<S: LedgerStore> {
    ledger: Ledger<S>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    offers: DashMap<OfferId, Shared<P2POffer>>,
    trades: DashMap<TradeId, Shared<P2PTrade>>,
}

impl<S: LedgerStore> P2PEngine<S> {
    pub fn new(ledger: Ledger<S>, clock: Arc<dyn Clock>, config: EngineConfig) -> Self {
        Self {
            ledger,
            clock,
            config,
            offers: DashMap::new(),
            trades: DashMap::new(),
        }
    }

    // Offers

    /// Publish an offer
    ///
    /// A SELL offer requires the owner to hold the advertised crypto right
    /// now, but nothing is locked until a trade is opened against it.
    ///
    /// # Errors
    ///
    /// - `InvalidAmount` for non-positive amounts or limits
    /// - `InvalidOffer` for inconsistent limits, identical currencies or an
    ///   expiry in the past
    /// - `InsufficientFunds` when a SELL owner lacks the crypto
    pub fn create_offer(&self, request: NewOffer) -> Result<P2POffer, LedgerError> {
        for amount in [
            request.crypto_amount,
            request.fiat_amount,
            request.min_trade,
            request.max_trade,
        ] {
            if amount <= Decimal::ZERO {
                return Err(LedgerError::invalid_amount(amount, "must be positive"));
            }
        }
        if request.crypto_currency == request.fiat_currency {
            return Err(LedgerError::invalid_offer("crypto and fiat currencies must differ"));
        }
        if request.min_trade > request.max_trade {
            return Err(LedgerError::invalid_offer("minimum trade exceeds maximum trade"));
        }
        if request.max_trade > request.fiat_amount {
            return Err(LedgerError::invalid_offer("maximum trade exceeds offer size"));
        }

        let now = self.clock.now();
        let expires_at = request.expires_at.unwrap_or(now + self.config.offer_ttl);
        if expires_at <= now {
            return Err(LedgerError::invalid_offer("expiry is in the past"));
        }

        if request.side == OfferSide::Sell {
            let available = self
                .ledger
                .get_balance(&request.owner, &request.crypto_currency)
                .available();
            if available < request.crypto_amount {
                return Err(LedgerError::insufficient_funds(
                    &request.owner,
                    &request.crypto_currency,
                    available,
                    request.crypto_amount,
                ));
            }
        }

        let offer = P2POffer {
            id: OfferId::new(),
            owner: request.owner,
            side: request.side,
            crypto_currency: request.crypto_currency,
            fiat_currency: request.fiat_currency,
            crypto_amount: request.crypto_amount,
            fiat_amount: request.fiat_amount,
            filled_crypto: Decimal::ZERO,
            reserved_crypto: Decimal::ZERO,
            min_trade: request.min_trade,
            max_trade: request.max_trade,
            payment_methods: request.payment_methods,
            status: OfferStatus::Active,
            created_at: now,
            expires_at,
        };

        self.offers
            .insert(offer.id, Arc::new(Mutex::new(offer.clone())));
        tracing::info!(
            offer = %offer.id,
            owner = %offer.owner,
            side = %offer.side,
            crypto = %offer.crypto_amount,
            fiat = %offer.fiat_amount,
            "offer created"
        );
        Ok(offer)
    }

    /// Withdraw an offer; open trades against it carry on
    pub fn cancel_offer(&self, id: OfferId, user: &UserId) -> Result<P2POffer, LedgerError> {
        let shared = self.offer_handle(id)?;
        let mut offer = shared.lock();
        self.refresh_offer(&mut offer);

        if offer.owner != *user {
            return Err(LedgerError::NotOfferOwner {
                user: user.to_string(),
                offer: id.to_string(),
            });
        }
        if offer.status != OfferStatus::Active {
            return Err(LedgerError::invalid_transition("offer", id, offer.status, "cancel"));
        }

        offer.status = OfferStatus::Cancelled;
        tracing::info!(offer = %id, "offer cancelled");
        Ok(offer.clone())
    }

    pub fn get_offer(&self, id: OfferId) -> Result<P2POffer, LedgerError> {
        let shared = self.offer_handle(id)?;
        let mut offer = shared.lock();
        self.refresh_offer(&mut offer);
        Ok(offer.clone())
    }

    /// Offers currently open to new trades, oldest first
    pub fn active_offers(&self) -> Vec<P2POffer> {
        let mut active: Vec<P2POffer> = self
            .offer_handles()
            .into_iter()
            .filter_map(|shared| {
                let mut offer = shared.lock();
                self.refresh_offer(&mut offer);
                (offer.status == OfferStatus::Active).then(|| offer.clone())
            })
            .collect();
        active.sort_by_key(|offer| offer.created_at);
        active
    }

    /// Mark every active offer past its expiry as `EXPIRED`
    pub fn expire_offers(&self) -> Vec<OfferId> {
        let expired: Vec<OfferId> = self
            .offer_handles()
            .into_iter()
            .filter_map(|shared| {
                let mut offer = shared.lock();
                self.refresh_offer(&mut offer)
                    .then_some(offer.id)
            })
            .collect();
        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "offers expired");
        }
        expired
    }

    // Trades

    /// Open a trade against an offer, locking both sides
    ///
    /// The offer owner is the seller and the caller is the buyer. The crypto
    /// amount is derived from the offer's own ratio, rounded toward zero.
    ///
    /// # Errors
    ///
    /// - `OfferNotFound` / `OfferUnavailable` for unknown, inactive,
    ///   expired or exhausted offers
    /// - `SelfTradeForbidden` when the buyer owns the offer
    /// - `TradeSizeOutOfRange` for a fiat amount outside the offer limits
    /// - `InsufficientFunds` when either side cannot cover its lock
    pub fn create_trade(
        &self,
        offer_id: OfferId,
        buyer: &UserId,
        fiat_amount: Decimal,
    ) -> Result<P2PTrade, LedgerError> {
        if fiat_amount <= Decimal::ZERO {
            return Err(LedgerError::invalid_amount(fiat_amount, "must be positive"));
        }

        let shared = self.offer_handle(offer_id)?;
        let mut offer = shared.lock();
        if self.refresh_offer(&mut offer) {
            return Err(LedgerError::offer_unavailable(offer_id, "offer has expired"));
        }
        if offer.status != OfferStatus::Active {
            return Err(LedgerError::offer_unavailable(
                offer_id,
                &format!("offer is {}", offer.status),
            ));
        }
        if offer.owner == *buyer {
            return Err(LedgerError::SelfTradeForbidden {
                user: buyer.to_string(),
                offer: offer_id.to_string(),
            });
        }
        if fiat_amount < offer.min_trade || fiat_amount > offer.max_trade {
            return Err(LedgerError::TradeSizeOutOfRange {
                requested: fiat_amount,
                min: offer.min_trade,
                max: offer.max_trade,
            });
        }

        let crypto_amount = offer
            .crypto_for(fiat_amount, self.config.crypto_scale)
            .ok_or_else(|| {
                LedgerError::arithmetic_overflow(
                    "trade crypto amount",
                    buyer,
                    &offer.crypto_currency,
                )
            })?;
        if crypto_amount <= Decimal::ZERO {
            return Err(LedgerError::invalid_amount(
                fiat_amount,
                "buys less than the smallest crypto unit",
            ));
        }
        if crypto_amount > offer.remaining_crypto() {
            return Err(LedgerError::offer_unavailable(
                offer_id,
                &format!("only {} {} remaining", offer.remaining_crypto(), offer.crypto_currency),
            ));
        }

        let now = self.clock.now();
        let trade = P2PTrade {
            id: TradeId::new(),
            offer_id,
            buyer: buyer.clone(),
            seller: offer.owner.clone(),
            crypto_currency: offer.crypto_currency.clone(),
            fiat_currency: offer.fiat_currency.clone(),
            crypto_amount,
            fiat_amount,
            status: TradeStatus::Pending,
            payment_proof: None,
            created_at: now,
            updated_at: now,
            expires_at: now + self.config.trade_window,
        };

        let (buyer_fiat, seller_crypto) = escrow_keys(&trade);
        let memo = trade_memo(&trade, "escrow lock");
        self.ledger
            .transact(&[buyer_fiat.clone(), seller_crypto.clone()], |s| {
                s.lock(&buyer_fiat, trade.fiat_amount, &memo)?;
                s.lock(&seller_crypto, trade.crypto_amount, &memo)?;
                Ok(())
            })?;

        offer.reserved_crypto += crypto_amount;
        self.trades
            .insert(trade.id, Arc::new(Mutex::new(trade.clone())));

        tracing::info!(
            trade = %trade.id,
            offer = %offer_id,
            buyer = %trade.buyer,
            seller = %trade.seller,
            fiat = %trade.fiat_amount,
            crypto = %trade.crypto_amount,
            "trade opened"
        );
        Ok(trade)
    }

    /// Buyer reports having sent the fiat payment
    pub fn confirm_payment(
        &self,
        id: TradeId,
        user: &UserId,
        proof: Option<String>,
    ) -> Result<P2PTrade, LedgerError> {
        let shared = self.trade_handle(id)?;
        let mut trade = shared.lock();
        self.expire_if_due(&mut trade)?;

        let event = TradeEvent::ConfirmPayment;
        if trade.buyer != *user {
            return Err(LedgerError::not_participant(user, id, event.action()));
        }
        let next = trade.status.transition(id, event)?;

        trade.status = next;
        trade.payment_proof = proof;
        trade.updated_at = self.clock.now();
        tracing::info!(trade = %id, "payment confirmed");
        Ok(trade.clone())
    }

    /// Seller acknowledges receipt of fiat and settles the trade
    ///
    /// Six journal entries in one unit of work: buyer fiat unlocked and
    /// subtracted, seller fiat credited, seller crypto unlocked and
    /// subtracted, buyer crypto credited.
    pub fn release_crypto(&self, id: TradeId, user: &UserId) -> Result<P2PTrade, LedgerError> {
        let shared = self.trade_handle(id)?;
        let mut trade = shared.lock();
        self.expire_if_due(&mut trade)?;

        let event = TradeEvent::ReleaseCrypto;
        if trade.seller != *user {
            return Err(LedgerError::not_participant(user, id, event.action()));
        }
        let next = trade.status.transition(id, event)?;

        let (buyer_fiat, seller_crypto) = escrow_keys(&trade);
        let seller_fiat = BalanceKey::new(trade.seller.clone(), trade.fiat_currency.clone());
        let buyer_crypto = BalanceKey::new(trade.buyer.clone(), trade.crypto_currency.clone());
        let memo = trade_memo(&trade, "escrow release");
        let (fiat, crypto) = (trade.fiat_amount, trade.crypto_amount);

        self.ledger.transact(
            &[
                buyer_fiat.clone(),
                seller_fiat.clone(),
                seller_crypto.clone(),
                buyer_crypto.clone(),
            ],
            |s| {
                s.unlock(&buyer_fiat, fiat, &memo)?;
                s.subtract(&buyer_fiat, fiat, &memo)?;
                s.add(&seller_fiat, fiat, &memo)?;
                s.unlock(&seller_crypto, crypto, &memo)?;
                s.subtract(&seller_crypto, crypto, &memo)?;
                s.add(&buyer_crypto, crypto, &memo)?;
                Ok(())
            },
        )?;

        trade.status = next;
        trade.updated_at = self.clock.now();
        self.with_offer(trade.offer_id, |offer| offer.settle(crypto));

        tracing::info!(trade = %id, fiat = %fiat, crypto = %crypto, "trade completed");
        Ok(trade.clone())
    }

    /// Cancel an open trade, returning both sides' funds
    ///
    /// The buyer may cancel until crypto is released, the seller only while
    /// the trade is still `PENDING`, an admin at any open state.
    pub fn cancel_trade(&self, id: TradeId, by: CancelBy) -> Result<P2PTrade, LedgerError> {
        let shared = self.trade_handle(id)?;
        let mut trade = shared.lock();
        self.expire_if_due(&mut trade)?;

        let event = TradeEvent::Cancel;
        if let CancelBy::Participant(user) = &by {
            if !trade.is_participant(user) {
                return Err(LedgerError::not_participant(user, id, event.action()));
            }
        }
        let next = trade.status.transition(id, event)?;
        if !trade.may_cancel(&by) {
            return Err(LedgerError::invalid_transition(
                "trade",
                id,
                trade.status,
                event.action(),
            ));
        }

        self.unwind(&mut trade, next, "escrow cancel")?;
        tracing::info!(trade = %id, by = ?by, "trade cancelled");
        Ok(trade.clone())
    }

    /// Expire a trade whose deadline has passed
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition` if the trade is already terminal,
    /// `TradeNotExpired` if its deadline has not passed yet.
    pub fn expire_trade(&self, id: TradeId) -> Result<P2PTrade, LedgerError> {
        let shared = self.trade_handle(id)?;
        let mut trade = shared.lock();

        let next = trade.status.transition(id, TradeEvent::Expire)?;
        if !trade.is_due(self.clock.now()) {
            return Err(LedgerError::TradeNotExpired {
                trade: id.to_string(),
                expires_at: trade.expires_at.to_rfc3339(),
            });
        }

        self.unwind(&mut trade, next, "escrow expiry")?;
        tracing::info!(trade = %id, "trade expired");
        Ok(trade.clone())
    }

    /// Expire every open trade past its deadline
    pub fn expire_due_trades(&self) -> Vec<TradeId> {
        let handles: Vec<Shared<P2PTrade>> =
            self.trades.iter().map(|entry| Arc::clone(entry.value())).collect();
        let mut expired = Vec::new();
        for shared in handles {
            let mut trade = shared.lock();
            match self.expire_if_due(&mut trade) {
                Ok(true) => expired.push(trade.id),
                Ok(false) => {}
                Err(err) => {
                    tracing::error!(trade = %trade.id, error = %err, "failed to expire trade");
                }
            }
        }
        expired
    }

    pub fn get_trade(&self, id: TradeId) -> Result<P2PTrade, LedgerError> {
        let shared = self.trade_handle(id)?;
        let mut trade = shared.lock();
        self.expire_if_due(&mut trade)?;
        Ok(trade.clone())
    }

    /// Trades where `user` is buyer or seller, oldest first
    pub fn trades_for(&self, user: &UserId) -> Vec<P2PTrade> {
        // Never wait on a trade while holding a map shard
        let handles: Vec<Shared<P2PTrade>> =
            self.trades.iter().map(|entry| Arc::clone(entry.value())).collect();
        let mut trades: Vec<P2PTrade> = handles
            .iter()
            .map(|shared| shared.lock().clone())
            .filter(|trade| trade.buyer == *user || trade.seller == *user)
            .collect();
        trades.sort_by_key(|trade| trade.created_at);
        trades
    }

    // Internals

    /// Unlock both sides and move the trade to a terminal status
    fn unwind(
        &self,
        trade: &mut P2PTrade,
        next: TradeStatus,
        description: &str,
    ) -> Result<(), LedgerError> {
        let (buyer_fiat, seller_crypto) = escrow_keys(trade);
        let memo = trade_memo(trade, description);
        let (fiat, crypto) = (trade.fiat_amount, trade.crypto_amount);

        self.ledger
            .transact(&[buyer_fiat.clone(), seller_crypto.clone()], |s| {
                s.unlock(&buyer_fiat, fiat, &memo)?;
                s.unlock(&seller_crypto, crypto, &memo)?;
                Ok(())
            })?;

        trade.status = next;
        trade.updated_at = self.clock.now();
        self.with_offer(trade.offer_id, |offer| offer.release_reservation(crypto));
        Ok(())
    }

    /// Expire `trade` if it is open and past its deadline
    fn expire_if_due(&self, trade: &mut P2PTrade) -> Result<bool, LedgerError> {
        if !trade.is_due(self.clock.now()) {
            return Ok(false);
        }
        let next = trade.status.transition(trade.id, TradeEvent::Expire)?;
        self.unwind(trade, next, "escrow expiry")?;
        tracing::info!(trade = %trade.id, "trade expired on access");
        Ok(true)
    }

    /// Expire an active offer past its deadline; true if it just expired
    fn refresh_offer(&self, offer: &mut P2POffer) -> bool {
        if offer.status == OfferStatus::Active && offer.is_expired(self.clock.now()) {
            offer.status = OfferStatus::Expired;
            tracing::debug!(offer = %offer.id, "offer expired");
            return true;
        }
        false
    }

    fn with_offer(&self, id: OfferId, f: impl FnOnce(&mut P2POffer)) {
        match self.offers.get(&id).map(|entry| Arc::clone(entry.value())) {
            Some(shared) => f(&mut shared.lock()),
            None => tracing::warn!(offer = %id, "trade refers to unknown offer"),
        }
    }

    fn offer_handle(&self, id: OfferId) -> Result<Shared<P2POffer>, LedgerError> {
        self.offers
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| LedgerError::OfferNotFound {
                offer: id.to_string(),
            })
    }

    fn offer_handles(&self) -> Vec<Shared<P2POffer>> {
        self.offers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    fn trade_handle(&self, id: TradeId) -> Result<Shared<P2PTrade>, LedgerError> {
        self.trades
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| LedgerError::TradeNotFound {
                trade: id.to_string(),
            })
    }
}

/// Rows locked while a trade is open: buyer's fiat, seller's crypto
fn escrow_keys(trade: &P2PTrade) -> (BalanceKey, BalanceKey) {
    (
        BalanceKey::new(trade.buyer.clone(), trade.fiat_currency.clone()),
        BalanceKey::new(trade.seller.clone(), trade.crypto_currency.clone()),
    )
}

fn trade_memo(trade: &P2PTrade, description: &str) -> Memo {
    Memo::new(TransactionType::P2pTrade, description)
        .with("trade_id", trade.id)
        .with("offer_id", trade.offer_id)
}
