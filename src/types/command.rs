//! Replay commands
//!
//! A `Command` is one row of a replay file after validation. Offers and
//! trades are named by caller-chosen references (`ref` / `target` columns)
//! because their real ids are only known once they are created.

use super::ids::{Currency, UserId};
use super::order::NewOrder;
use super::p2p::NewOffer;
use rust_decimal::Decimal;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Credit funds from the payment rail; `reference` must be unique
    Deposit {
        user: UserId,
        currency: Currency,
        amount: Decimal,
        reference: String,
    },
    /// Withdraw to the payment rail (locked, then paid out)
    Withdraw {
        user: UserId,
        currency: Currency,
        amount: Decimal,
        reference: Option<String>,
    },
    /// Publish an offer under `reference`
    Offer { reference: String, offer: NewOffer },
    /// Open trade `reference` against offer `offer`
    Trade {
        reference: String,
        offer: String,
        buyer: UserId,
        fiat_amount: Decimal,
    },
    Confirm {
        trade: String,
        user: UserId,
        proof: Option<String>,
    },
    Release { trade: String, user: UserId },
    /// Cancel as `user`, or administratively when `admin` is set
    Cancel {
        trade: String,
        user: UserId,
        admin: bool,
    },
    Expire { trade: String },
    Order(NewOrder),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Deposit { .. } => "deposit",
            Command::Withdraw { .. } => "withdraw",
            Command::Offer { .. } => "offer",
            Command::Trade { .. } => "trade",
            Command::Confirm { .. } => "confirm",
            Command::Release { .. } => "release",
            Command::Cancel { .. } => "cancel",
            Command::Expire { .. } => "expire",
            Command::Order(_) => "order",
        }
    }

    /// Users and references this command names directly
    ///
    /// Two commands sharing a key must run in file order.
    pub fn keys(&self) -> Vec<String> {
        let user = |u: &UserId| format!("user:{}", u);
        let offer = |r: &str| format!("offer:{}", r);
        let trade = |r: &str| format!("trade:{}", r);

        match self {
            Command::Deposit {
                user: u, reference, ..
            } => vec![user(u), format!("deposit:{}", reference)],
            Command::Withdraw { user: u, .. } => vec![user(u)],
            Command::Offer { reference, offer: o } => vec![user(&o.owner), offer(reference)],
            Command::Trade {
                reference,
                offer: o,
                buyer,
                ..
            } => vec![user(buyer), offer(o), trade(reference)],
            Command::Confirm { trade: t, user: u, .. }
            | Command::Release { trade: t, user: u }
            | Command::Cancel { trade: t, user: u, .. } => vec![user(u), trade(t)],
            Command::Expire { trade: t } => vec![trade(t)],
            Command::Order(order) => vec![user(&order.user)],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OrderSide;
    use rust_decimal_macros::dec;

    #[test]
    fn test_trade_keys_link_buyer_offer_and_trade() {
        let cmd = Command::Trade {
            reference: "t1".to_string(),
            offer: "o1".to_string(),
            buyer: "bob".into(),
            fiat_amount: dec!(100),
        };
        assert_eq!(cmd.keys(), vec!["user:bob", "offer:o1", "trade:t1"]);
        assert_eq!(cmd.name(), "trade");
    }

    #[test]
    fn test_order_keys_are_user_only() {
        let cmd = Command::Order(NewOrder {
            user: "alice".into(),
            side: OrderSide::Buy,
            base: Currency::parse("BTC").unwrap(),
            quote: Currency::parse("BRL").unwrap(),
            amount: dec!(1),
        });
        assert_eq!(cmd.keys(), vec!["user:alice"]);
    }
}
