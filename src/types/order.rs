//! Single-party exchange order types

use super::error::LedgerError;
use super::ids::{Currency, OrderId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    /// Spend quote currency, receive base currency
    Buy,
    /// Spend base currency, receive quote currency
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        })
    }
}

/// Order lifecycle: `PENDING -> COMPLETED | FAILED`, both terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Completed,
    Failed,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Failed => "FAILED",
        })
    }
}

/// Order request as received from a caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub user: UserId,
    pub side: OrderSide,
    pub base: Currency,
    pub quote: Currency,
    /// Quantity of base currency
    pub amount: Decimal,
}

/// One attempt to trade against the external exchange
///
/// The record itself is the audit trail of the attempt: a `FAILED` order has
/// no journal entries, a `COMPLETED` one has exactly two.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user: UserId,
    pub side: OrderSide,
    pub base: Currency,
    pub quote: Currency,
    pub amount: Decimal,
    pub price: Decimal,
    /// `amount * price`, in quote currency
    pub total: Decimal,
    pub status: OrderStatus,
    pub external_ref: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Currency and amount leaving the user's balance
    pub fn paid_leg(&self) -> (&Currency, Decimal) {
        match self.side {
            OrderSide::Buy => (&self.quote, self.total),
            OrderSide::Sell => (&self.base, self.amount),
        }
    }

    /// Currency and amount arriving in the user's balance
    pub fn received_leg(&self) -> (&Currency, Decimal) {
        match self.side {
            OrderSide::Buy => (&self.base, self.amount),
            OrderSide::Sell => (&self.quote, self.total),
        }
    }

    pub fn complete(
        &mut self,
        external_ref: String,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        self.ensure_pending("complete")?;
        self.status = OrderStatus::Completed;
        self.external_ref = Some(external_ref);
        self.updated_at = now;
        Ok(())
    }

    pub fn fail(&mut self, reason: String, now: DateTime<Utc>) -> Result<(), LedgerError> {
        self.ensure_pending("fail")?;
        self.status = OrderStatus::Failed;
        self.failure_reason = Some(reason);
        self.updated_at = now;
        Ok(())
    }

    fn ensure_pending(&self, action: &'static str) -> Result<(), LedgerError> {
        if self.status != OrderStatus::Pending {
            return Err(LedgerError::invalid_transition(
                "order", self.id, self.status, action,
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn order(side: OrderSide) -> Order {
        let now = Utc::now();
        Order {
            id: OrderId::new(),
            user: "alice".into(),
            side,
            base: Currency::parse("BTC").unwrap(),
            quote: Currency::parse("BRL").unwrap(),
            amount: dec!(0.01),
            price: dec!(350000),
            total: dec!(3500),
            status: OrderStatus::Pending,
            external_ref: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_buy_pays_quote_and_receives_base() {
        let o = order(OrderSide::Buy);
        assert_eq!(o.paid_leg(), (&o.quote, dec!(3500)));
        assert_eq!(o.received_leg(), (&o.base, dec!(0.01)));
    }

    #[test]
    fn test_sell_pays_base_and_receives_quote() {
        let o = order(OrderSide::Sell);
        assert_eq!(o.paid_leg(), (&o.base, dec!(0.01)));
        assert_eq!(o.received_leg(), (&o.quote, dec!(3500)));
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut o = order(OrderSide::Buy);
        o.fail("exchange down".to_string(), Utc::now()).unwrap();
        assert!(matches!(
            o.complete("x-1".to_string(), Utc::now()),
            Err(LedgerError::InvalidStateTransition { .. })
        ));
        assert_eq!(o.status, OrderStatus::Failed);
        assert!(o.external_ref.is_none());
    }
}
