//! Escrow engine facade
//!
//! `EscrowEngine` wires the ledger, funding desk, order engine and P2P engine
//! to one shared balance store and routes replay [`Command`]s to them.
//!
//! Replay files name offers and trades by their own references. The engine
//! keeps the mapping from reference to id, and remembers which users each
//! reference involves so the batch processor can keep conflicting commands
//! in order.

use super::config::EngineConfig;
use super::external::{PaperExchange, SystemClock};
use super::funding::FundingDesk;
use super::ledger::Ledger;
use super::order::OrderEngine;
use super::p2p::P2PEngine;
use super::store::InMemoryStore;
use super::traits::{Clock, ExchangeGateway, LedgerStore, PriceFeed};
use crate::types::{
    Balance, BalanceKey, CancelBy, Command, LedgerError, OfferId, TradeId, UserId,
};
use dashmap::DashMap;
use std::sync::Arc;

pub struct EscrowEngine<S: LedgerStore = InMemoryStore> {
    ledger: Ledger<S>,
    funding: FundingDesk<S>,
    orders: OrderEngine<S>,
    p2p: P2PEngine<S>,
    offer_refs: DashMap<String, OfferId>,
    trade_refs: DashMap<String, TradeId>,
    /// Users involved in each offer/trade reference, keyed like `Command::keys`
    parties: DashMap<String, Vec<UserId>>,
}

impl EscrowEngine<InMemoryStore> {
    /// Engine over a fresh in-memory store, wall clock and paper exchange
    pub fn in_memory(config: EngineConfig, prices: Arc<dyn PriceFeed>) -> Self {
        Self::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(SystemClock),
            prices,
            Arc::new(PaperExchange::new()),
            config,
        )
    }
}

impl<S: LedgerStore> EscrowEngine<S> {
    pub fn new(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        prices: Arc<dyn PriceFeed>,
        exchange: Arc<dyn ExchangeGateway>,
        config: EngineConfig,
    ) -> Self {
        let ledger = Ledger::new(store, Arc::clone(&clock), config);
        Self {
            funding: FundingDesk::new(ledger.clone(), Arc::clone(&clock)),
            orders: OrderEngine::new(ledger.clone(), prices, exchange, Arc::clone(&clock)),
            p2p: P2PEngine::new(ledger.clone(), clock, config),
            ledger,
            offer_refs: DashMap::new(),
            trade_refs: DashMap::new(),
            parties: DashMap::new(),
        }
    }

    pub fn ledger(&self) -> &Ledger<S> {
        &self.ledger
    }

    pub fn funding(&self) -> &FundingDesk<S> {
        &self.funding
    }

    pub fn orders(&self) -> &OrderEngine<S> {
        &self.orders
    }

    pub fn p2p(&self) -> &P2PEngine<S> {
        &self.p2p
    }

    /// Every balance row, ordered by user then currency
    pub fn balances(&self) -> Vec<(BalanceKey, Balance)> {
        self.ledger.balances()
    }

    /// Apply one replay command
    ///
    /// # Errors
    ///
    /// The underlying engine's error, or `DuplicateReference`,
    /// `OfferNotFound` / `TradeNotFound` for bad references.
    pub fn process(&self, command: Command) -> Result<(), LedgerError> {
        match command {
            Command::Deposit {
                user,
                currency,
                amount,
                reference,
            } => {
                self.funding.deposit(&user, &currency, amount, &reference)?;
            }
            Command::Withdraw {
                user,
                currency,
                amount,
                reference,
            } => {
                let ticket = self
                    .funding
                    .request_withdrawal(&user, &currency, amount, reference)?;
                self.funding.complete_withdrawal(ticket.id)?;
            }
            Command::Offer { reference, offer } => {
                if self.offer_refs.contains_key(&reference) {
                    return Err(LedgerError::DuplicateReference { reference });
                }
                let owner = offer.owner.clone();
                let created = self.p2p.create_offer(offer)?;
                self.offer_refs.insert(reference.clone(), created.id);
                self.parties.insert(format!("offer:{}", reference), vec![owner]);
            }
            Command::Trade {
                reference,
                offer,
                buyer,
                fiat_amount,
            } => {
                if self.trade_refs.contains_key(&reference) {
                    return Err(LedgerError::DuplicateReference { reference });
                }
                let offer_id = self.offer_id(&offer)?;
                let trade = self.p2p.create_trade(offer_id, &buyer, fiat_amount)?;
                self.trade_refs.insert(reference.clone(), trade.id);
                self.parties
                    .insert(format!("trade:{}", reference), vec![trade.buyer, trade.seller]);
            }
            Command::Confirm { trade, user, proof } => {
                self.p2p.confirm_payment(self.trade_id(&trade)?, &user, proof)?;
            }
            Command::Release { trade, user } => {
                self.p2p.release_crypto(self.trade_id(&trade)?, &user)?;
            }
            Command::Cancel { trade, user, admin } => {
                let by = if admin {
                    CancelBy::Admin
                } else {
                    CancelBy::Participant(user)
                };
                self.p2p.cancel_trade(self.trade_id(&trade)?, by)?;
            }
            Command::Expire { trade } => {
                self.p2p.expire_trade(self.trade_id(&trade)?)?;
            }
            Command::Order(order) => {
                self.orders.create_order(order)?;
            }
        }
        Ok(())
    }

    /// Keys a command conflicts on, including users behind its references
    ///
    /// A confirm for a trade opened in an earlier batch names only the buyer,
    /// but settling or unwinding that trade touches the seller's rows too.
    pub fn conflict_keys(&self, command: &Command) -> Vec<String> {
        let mut keys = command.keys();
        let linked: Vec<String> = keys
            .iter()
            .filter_map(|key| self.parties.get(key))
            .flat_map(|users| {
                users
                    .iter()
                    .map(|user| format!("user:{}", user))
                    .collect::<Vec<_>>()
            })
            .collect();
        keys.extend(linked);
        keys
    }

    fn offer_id(&self, reference: &str) -> Result<OfferId, LedgerError> {
        self.offer_refs
            .get(reference)
            .map(|id| *id)
            .ok_or_else(|| LedgerError::OfferNotFound {
                offer: reference.to_string(),
            })
    }

    fn trade_id(&self, reference: &str) -> Result<TradeId, LedgerError> {
        self.trade_refs
            .get(reference)
            .map(|id| *id)
            .ok_or_else(|| LedgerError::TradeNotFound {
                trade: reference.to_string(),
            })
    }
}
