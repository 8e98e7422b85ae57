//! Lifecycle scenarios driven through the public engine API with a manual
//! clock and a controllable exchange.

use chrono::Duration;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use rust_escrow_ledger::core::{
    EngineConfig, EscrowEngine, InMemoryStore, ManualClock, PaperExchange, StaticPriceFeed,
};
use rust_escrow_ledger::types::{
    Balance, CancelBy, Currency, LedgerError, NewOffer, NewOrder, OfferSide, OfferStatus,
    OrderSide, OrderStatus, P2PTrade, TradeStatus, TransactionFilter, TransactionType, UserId,
};
use std::sync::Arc;

struct Harness {
    engine: EscrowEngine,
    clock: Arc<ManualClock>,
    exchange: Arc<PaperExchange>,
    brl: Currency,
    btc: Currency,
    buyer: UserId,
    seller: UserId,
}

impl Harness {
    fn new() -> Self {
        let clock = Arc::new(ManualClock::default());
        let exchange = Arc::new(PaperExchange::new());
        let prices = StaticPriceFeed::new();
        let (brl, btc) = (Currency::parse("BRL").unwrap(), Currency::parse("BTC").unwrap());
        prices.set(btc.clone(), brl.clone(), dec!(200000));

        let engine = EscrowEngine::new(
            Arc::new(InMemoryStore::new()),
            clock.clone(),
            Arc::new(prices),
            exchange.clone(),
            EngineConfig::default(),
        );
        let h = Self {
            engine,
            clock,
            exchange,
            brl,
            btc,
            buyer: "user-a".into(),
            seller: "user-b".into(),
        };
        h.engine
            .funding()
            .deposit(&h.buyer, &h.brl, dec!(1000), "pix-a")
            .unwrap();
        h.engine
            .funding()
            .deposit(&h.seller, &h.btc, dec!(0.1), "chain-b")
            .unwrap();
        h
    }

    fn balance(&self, user: &UserId, currency: &Currency) -> Balance {
        self.engine.ledger().get_balance(user, currency)
    }

    fn open_trade(&self, fiat: Decimal) -> P2PTrade {
        let offer = self
            .engine
            .p2p()
            .create_offer(NewOffer {
                owner: self.seller.clone(),
                side: OfferSide::Sell,
                crypto_currency: self.btc.clone(),
                fiat_currency: self.brl.clone(),
                crypto_amount: dec!(0.1),
                fiat_amount: dec!(1000),
                min_trade: dec!(100),
                max_trade: dec!(1000),
                payment_methods: vec!["PIX".to_string()],
                expires_at: None,
            })
            .unwrap();
        self.engine
            .p2p()
            .create_trade(offer.id, &self.buyer, fiat)
            .unwrap()
    }

    fn assert_conserved(&self) {
        assert_eq!(self.engine.ledger().currency_totals(&self.brl).0, dec!(1000));
        assert_eq!(self.engine.ledger().currency_totals(&self.btc).0, dec!(0.1));
    }
}

fn balance(amount: Decimal, locked: Decimal) -> Balance {
    Balance::new(amount, locked).unwrap()
}

#[test]
fn test_trade_settles_both_sides() {
    let h = Harness::new();
    let p2p = h.engine.p2p();

    let trade = h.open_trade(dec!(500));
    assert_eq!(trade.crypto_amount, dec!(0.05));
    assert_eq!(h.balance(&h.buyer, &h.brl), balance(dec!(1000), dec!(500)));
    assert_eq!(h.balance(&h.seller, &h.btc), balance(dec!(0.1), dec!(0.05)));
    h.assert_conserved();

    let confirmed = p2p
        .confirm_payment(trade.id, &h.buyer, Some("receipt".to_string()))
        .unwrap();
    assert_eq!(confirmed.status, TradeStatus::PaymentSent);
    assert_eq!(h.balance(&h.buyer, &h.brl), balance(dec!(1000), dec!(500)));
    assert_eq!(h.balance(&h.seller, &h.btc), balance(dec!(0.1), dec!(0.05)));

    let released = p2p.release_crypto(trade.id, &h.seller).unwrap();
    assert_eq!(released.status, TradeStatus::Completed);
    assert_eq!(h.balance(&h.buyer, &h.brl), balance(dec!(500), dec!(0)));
    assert_eq!(h.balance(&h.buyer, &h.btc), balance(dec!(0.05), dec!(0)));
    assert_eq!(h.balance(&h.seller, &h.btc), balance(dec!(0.05), dec!(0)));
    assert_eq!(h.balance(&h.seller, &h.brl), balance(dec!(500), dec!(0)));
    h.assert_conserved();
}

#[test]
fn test_completed_trade_is_final() {
    let h = Harness::new();
    let p2p = h.engine.p2p();
    let trade = h.open_trade(dec!(500));
    p2p.confirm_payment(trade.id, &h.buyer, None).unwrap();
    p2p.release_crypto(trade.id, &h.seller).unwrap();

    assert!(matches!(
        p2p.confirm_payment(trade.id, &h.buyer, None),
        Err(LedgerError::InvalidStateTransition { .. })
    ));
    assert!(matches!(
        p2p.release_crypto(trade.id, &h.seller),
        Err(LedgerError::InvalidStateTransition { .. })
    ));
    assert!(matches!(
        p2p.cancel_trade(trade.id, CancelBy::Admin),
        Err(LedgerError::InvalidStateTransition { .. })
    ));
    assert_eq!(h.balance(&h.buyer, &h.btc), balance(dec!(0.05), dec!(0)));
}

#[test]
fn test_unconfirmed_trade_expires_back_to_start() {
    let h = Harness::new();
    let p2p = h.engine.p2p();
    let trade = h.open_trade(dec!(500));

    assert!(matches!(
        p2p.expire_trade(trade.id),
        Err(LedgerError::TradeNotExpired { .. })
    ));

    h.clock.advance(Duration::hours(2) + Duration::seconds(1));
    let expired = p2p.expire_trade(trade.id).unwrap();
    assert_eq!(expired.status, TradeStatus::Expired);
    assert_eq!(h.balance(&h.buyer, &h.brl), balance(dec!(1000), dec!(0)));
    assert_eq!(h.balance(&h.seller, &h.btc), balance(dec!(0.1), dec!(0)));
    h.assert_conserved();

    // The reservation is returned to the offer
    let offer = p2p.get_offer(trade.offer_id).unwrap();
    assert_eq!(offer.status, OfferStatus::Active);
    assert_eq!(offer.remaining_crypto(), dec!(0.1));
}

#[test]
fn test_late_confirmation_expires_first() {
    let h = Harness::new();
    let p2p = h.engine.p2p();
    let trade = h.open_trade(dec!(200));

    h.clock.advance(Duration::hours(3));
    assert!(matches!(
        p2p.confirm_payment(trade.id, &h.buyer, None),
        Err(LedgerError::InvalidStateTransition { .. })
    ));
    assert_eq!(p2p.get_trade(trade.id).unwrap().status, TradeStatus::Expired);
    assert_eq!(h.balance(&h.buyer, &h.brl), balance(dec!(1000), dec!(0)));
}

#[test]
fn test_sweep_expires_only_due_trades() {
    let h = Harness::new();
    let p2p = h.engine.p2p();
    let early = h.open_trade(dec!(100));
    h.clock.advance(Duration::hours(1));
    let late = p2p.create_trade(early.offer_id, &h.buyer, dec!(100)).unwrap();

    h.clock.advance(Duration::minutes(61));
    assert_eq!(p2p.expire_due_trades(), vec![early.id]);
    assert_eq!(p2p.get_trade(late.id).unwrap().status, TradeStatus::Pending);
    assert_eq!(h.balance(&h.buyer, &h.brl), balance(dec!(1000), dec!(100)));
}

#[test]
fn test_failed_execution_leaves_no_trace() {
    let h = Harness::new();
    let before = h.engine.ledger().store().journal_len();
    h.exchange.set_offline(true);

    let err = h
        .engine
        .orders()
        .create_order(NewOrder {
            user: h.buyer.clone(),
            side: OrderSide::Buy,
            base: h.btc.clone(),
            quote: h.brl.clone(),
            amount: dec!(0.001),
        })
        .unwrap_err();
    assert!(matches!(err, LedgerError::ExternalExecutionFailed { .. }));

    let orders = h.engine.orders().orders_for(&h.buyer);
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].status, OrderStatus::Failed);
    assert_eq!(h.balance(&h.buyer, &h.brl), balance(dec!(1000), dec!(0)));
    assert_eq!(h.balance(&h.buyer, &h.btc), Balance::default());
    assert_eq!(h.engine.ledger().store().journal_len(), before);
}

#[test]
fn test_history_records_every_primitive() {
    let h = Harness::new();
    let trade = h.open_trade(dec!(500));
    h.engine.p2p().confirm_payment(trade.id, &h.buyer, None).unwrap();
    h.engine.p2p().release_crypto(trade.id, &h.seller).unwrap();

    let page = h
        .engine
        .ledger()
        .get_transaction_history(&h.buyer, &TransactionFilter::default());
    // deposit, lock, unlock, subtract, add
    assert_eq!(page.total, 5);
    assert_eq!(page.items[0].currency, h.btc);
    assert_eq!(page.items[0].amount, dec!(0.05));
    assert_eq!(page.items[0].metadata["trade_id"], trade.id.to_string());

    let escrow_only = h.engine.ledger().get_transaction_history(
        &h.buyer,
        &TransactionFilter {
            kind: Some(TransactionType::P2pTrade),
            ..Default::default()
        },
    );
    assert_eq!(escrow_only.total, 4);
    assert!(escrow_only.items.iter().all(|tx| tx.kind == TransactionType::P2pTrade));
}
