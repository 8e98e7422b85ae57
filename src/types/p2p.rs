//! Peer-to-peer offer and trade types
//!
//! A `P2POffer` is a standing advertisement. A `P2PTrade` is the escrow unit:
//! while it is open, the buyer's fiat and the seller's crypto are locked in
//! the ledger.
//!
//! # Trade state machine
//!
//! ```text
//! PENDING --confirm payment--> PAYMENT_SENT --release crypto--> COMPLETED
//!    |                              |
//!    +--cancel / expire--+----------+--cancel / expire--> CANCELLED | EXPIRED
//! ```
//!
//! `COMPLETED`, `CANCELLED` and `EXPIRED` are terminal. All transitions go
//! through [`TradeStatus::transition`].

use super::error::LedgerError;
use super::ids::{Currency, OfferId, TradeId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OfferSide {
    Buy,
    Sell,
}

impl fmt::Display for OfferSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OfferSide::Buy => "BUY",
            OfferSide::Sell => "SELL",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OfferStatus {
    Active,
    Completed,
    Expired,
    Cancelled,
}

impl fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OfferStatus::Active => "ACTIVE",
            OfferStatus::Completed => "COMPLETED",
            OfferStatus::Expired => "EXPIRED",
            OfferStatus::Cancelled => "CANCELLED",
        })
    }
}

/// Offer request as received from a caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOffer {
    pub owner: UserId,
    pub side: OfferSide,
    pub crypto_currency: Currency,
    pub fiat_currency: Currency,
    pub crypto_amount: Decimal,
    pub fiat_amount: Decimal,
    /// Smallest fiat amount a single trade may take
    pub min_trade: Decimal,
    /// Largest fiat amount a single trade may take
    pub max_trade: Decimal,
    pub payment_methods: Vec<String>,
    /// Defaults to now + configured offer TTL
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct P2POffer {
    pub id: OfferId,
    pub owner: UserId,
    pub side: OfferSide,
    pub crypto_currency: Currency,
    pub fiat_currency: Currency,
    pub crypto_amount: Decimal,
    pub fiat_amount: Decimal,
    /// Crypto already settled through completed trades
    pub filled_crypto: Decimal,
    /// Crypto held by trades that are still open
    pub reserved_crypto: Decimal,
    pub min_trade: Decimal,
    pub max_trade: Decimal,
    pub payment_methods: Vec<String>,
    pub status: OfferStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl P2POffer {
    /// Fiat per unit of crypto, `None` on overflow
    pub fn price(&self) -> Option<Decimal> {
        self.fiat_amount.checked_div(self.crypto_amount)
    }

    /// Crypto still available to new trades
    pub fn remaining_crypto(&self) -> Decimal {
        self.crypto_amount - self.filled_crypto - self.reserved_crypto
    }

    /// An open trade for `crypto` ended without settling
    pub fn release_reservation(&mut self, crypto: Decimal) {
        self.reserved_crypto = (self.reserved_crypto - crypto).max(Decimal::ZERO);
    }

    /// An open trade for `crypto` settled; completes the offer once filled
    pub fn settle(&mut self, crypto: Decimal) {
        self.release_reservation(crypto);
        self.filled_crypto += crypto;
        if self.status == OfferStatus::Active && self.filled_crypto >= self.crypto_amount {
            self.status = OfferStatus::Completed;
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Crypto side of a trade taking `fiat_amount` from this offer
    ///
    /// Computed from the offer's own amounts rather than the rounded price so
    /// that taking the whole offer yields exactly `crypto_amount`. Rounded
    /// toward zero to `scale` decimal places. `None` if the product overflows.
    pub fn crypto_for(&self, fiat_amount: Decimal, scale: u32) -> Option<Decimal> {
        fiat_amount
            .checked_mul(self.crypto_amount)?
            .checked_div(self.fiat_amount)
            .map(|crypto| {
                crypto.round_dp_with_strategy(scale, rust_decimal::RoundingStrategy::ToZero)
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeStatus {
    Pending,
    PaymentSent,
    Completed,
    Cancelled,
    Expired,
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TradeStatus::Pending => "PENDING",
            TradeStatus::PaymentSent => "PAYMENT_SENT",
            TradeStatus::Completed => "COMPLETED",
            TradeStatus::Cancelled => "CANCELLED",
            TradeStatus::Expired => "EXPIRED",
        })
    }
}

/// Something that happens to a trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TradeEvent {
    ConfirmPayment,
    ReleaseCrypto,
    Cancel,
    Expire,
}

impl TradeEvent {
    /// Verb used in transition errors
    pub fn action(&self) -> &'static str {
        match self {
            TradeEvent::ConfirmPayment => "confirm payment for",
            TradeEvent::ReleaseCrypto => "release crypto for",
            TradeEvent::Cancel => "cancel",
            TradeEvent::Expire => "expire",
        }
    }
}

impl TradeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TradeStatus::Completed | TradeStatus::Cancelled | TradeStatus::Expired
        )
    }

    /// The trade state machine
    ///
    /// Returns the next status, or `InvalidStateTransition` carrying the
    /// current status. Terminal statuses accept nothing.
    pub fn transition(self, trade: TradeId, event: TradeEvent) -> Result<TradeStatus, LedgerError> {
        use TradeEvent::*;
        use TradeStatus::*;

        let next = match (self, event) {
            (Pending, ConfirmPayment) => PaymentSent,
            (PaymentSent, ReleaseCrypto) => Completed,
            (Pending | PaymentSent, Cancel) => Cancelled,
            (Pending | PaymentSent, Expire) => Expired,
            _ => {
                return Err(LedgerError::invalid_transition(
                    "trade",
                    trade,
                    self,
                    event.action(),
                ))
            }
        };
        Ok(next)
    }
}

/// Who is asking for a trade to be cancelled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelBy {
    /// A user; must be the trade's buyer or seller
    Participant(UserId),
    /// Administrative cancellation, allowed from any open state
    Admin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct P2PTrade {
    pub id: TradeId,
    pub offer_id: OfferId,
    /// Counterparty; pays fiat, receives crypto
    pub buyer: UserId,
    /// Offer owner; pays crypto, receives fiat
    pub seller: UserId,
    pub crypto_currency: Currency,
    pub fiat_currency: Currency,
    pub crypto_amount: Decimal,
    pub fiat_amount: Decimal,
    pub status: TradeStatus,
    pub payment_proof: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl P2PTrade {
    /// Open and past its deadline
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_terminal() && now > self.expires_at
    }

    pub fn is_participant(&self, user: &UserId) -> bool {
        *user == self.buyer || *user == self.seller
    }

    /// Whether `by` may cancel the trade in its current status
    ///
    /// The buyer may back out until crypto is released, the seller only before
    /// the buyer reports payment.
    pub fn may_cancel(&self, by: &CancelBy) -> bool {
        match by {
            CancelBy::Admin => true,
            CancelBy::Participant(user) if *user == self.buyer => true,
            CancelBy::Participant(user) if *user == self.seller => {
                self.status == TradeStatus::Pending
            }
            CancelBy::Participant(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[rstest]
    #[case(TradeStatus::Pending, TradeEvent::ConfirmPayment, TradeStatus::PaymentSent)]
    #[case(TradeStatus::PaymentSent, TradeEvent::ReleaseCrypto, TradeStatus::Completed)]
    #[case(TradeStatus::Pending, TradeEvent::Cancel, TradeStatus::Cancelled)]
    #[case(TradeStatus::PaymentSent, TradeEvent::Cancel, TradeStatus::Cancelled)]
    #[case(TradeStatus::Pending, TradeEvent::Expire, TradeStatus::Expired)]
    #[case(TradeStatus::PaymentSent, TradeEvent::Expire, TradeStatus::Expired)]
    fn test_allowed_transitions(
        #[case] from: TradeStatus,
        #[case] event: TradeEvent,
        #[case] to: TradeStatus,
    ) {
        assert_eq!(from.transition(TradeId::new(), event).unwrap(), to);
    }

    #[rstest]
    #[case(TradeStatus::Pending, TradeEvent::ReleaseCrypto)]
    #[case(TradeStatus::PaymentSent, TradeEvent::ConfirmPayment)]
    fn test_out_of_order_transitions_rejected(
        #[case] from: TradeStatus,
        #[case] event: TradeEvent,
    ) {
        let err = from.transition(TradeId::new(), event).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidStateTransition { .. }));
    }

    #[rstest]
    fn test_terminal_states_accept_nothing(
        #[values(TradeStatus::Completed, TradeStatus::Cancelled, TradeStatus::Expired)]
        from: TradeStatus,
        #[values(
            TradeEvent::ConfirmPayment,
            TradeEvent::ReleaseCrypto,
            TradeEvent::Cancel,
            TradeEvent::Expire
        )]
        event: TradeEvent,
    ) {
        assert!(from.is_terminal());
        match from.transition(TradeId::new(), event) {
            Err(LedgerError::InvalidStateTransition { from: status, .. }) => {
                assert_eq!(status, from.to_string())
            }
            other => panic!("expected InvalidStateTransition, got {:?}", other),
        }
    }

    fn offer(crypto: Decimal, fiat: Decimal) -> P2POffer {
        let now = Utc::now();
        P2POffer {
            id: OfferId::new(),
            owner: "seller".into(),
            side: OfferSide::Sell,
            crypto_currency: Currency::parse("BTC").unwrap(),
            fiat_currency: Currency::parse("BRL").unwrap(),
            crypto_amount: crypto,
            fiat_amount: fiat,
            filled_crypto: Decimal::ZERO,
            reserved_crypto: Decimal::ZERO,
            min_trade: dec!(1),
            max_trade: fiat,
            payment_methods: vec!["PIX".to_string()],
            status: OfferStatus::Active,
            created_at: now,
            expires_at: now,
        }
    }

    #[test]
    fn test_offer_price_and_crypto_for() {
        let o = offer(dec!(0.1), dec!(1000));
        assert_eq!(o.price(), Some(dec!(10000)));
        assert_eq!(o.crypto_for(dec!(500), 8), Some(dec!(0.05)));
        assert_eq!(o.crypto_for(dec!(1000), 8), Some(dec!(0.1)));
    }

    #[test]
    fn test_crypto_for_rounds_toward_zero() {
        let o = offer(dec!(1), dec!(3));
        assert_eq!(o.crypto_for(dec!(1), 8), Some(dec!(0.33333333)));
        assert_eq!(o.crypto_for(dec!(2), 8), Some(dec!(0.66666666)));
    }

    #[test]
    fn test_settling_the_last_crypto_completes_the_offer() {
        let mut o = offer(dec!(0.1), dec!(1000));
        o.reserved_crypto = dec!(0.1);
        assert_eq!(o.remaining_crypto(), Decimal::ZERO);

        o.settle(dec!(0.04));
        assert_eq!(o.status, OfferStatus::Active);
        o.release_reservation(dec!(0.01));
        assert_eq!(o.remaining_crypto(), dec!(0.01));

        o.reserved_crypto += dec!(0.01);
        o.settle(dec!(0.06));
        assert_eq!(o.filled_crypto, dec!(0.1));
        o.settle(Decimal::ZERO);
        assert_eq!(o.status, OfferStatus::Completed);
    }

    fn trade(status: TradeStatus) -> P2PTrade {
        let now = Utc::now();
        P2PTrade {
            id: TradeId::new(),
            offer_id: OfferId::new(),
            buyer: "buyer".into(),
            seller: "seller".into(),
            crypto_currency: Currency::parse("BTC").unwrap(),
            fiat_currency: Currency::parse("BRL").unwrap(),
            crypto_amount: dec!(0.05),
            fiat_amount: dec!(500),
            status,
            payment_proof: None,
            created_at: now,
            updated_at: now,
            expires_at: now,
        }
    }

    #[rstest]
    #[case::buyer_pending(TradeStatus::Pending, CancelBy::Participant("buyer".into()), true)]
    #[case::buyer_paid(TradeStatus::PaymentSent, CancelBy::Participant("buyer".into()), true)]
    #[case::seller_pending(TradeStatus::Pending, CancelBy::Participant("seller".into()), true)]
    #[case::seller_paid(TradeStatus::PaymentSent, CancelBy::Participant("seller".into()), false)]
    #[case::stranger(TradeStatus::Pending, CancelBy::Participant("mallory".into()), false)]
    #[case::admin(TradeStatus::PaymentSent, CancelBy::Admin, true)]
    fn test_cancel_permissions(
        #[case] status: TradeStatus,
        #[case] by: CancelBy,
        #[case] allowed: bool,
    ) {
        assert_eq!(trade(status).may_cancel(&by), allowed);
    }
}
