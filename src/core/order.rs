//! Single-party buy/sell orders against the external exchange
//!
//! # Flow
//!
//! 1. Validate the request and quote it from the `PriceFeed`
//! 2. Check the paid leg against the user's available balance
//! 3. Record a `PENDING` order
//! 4. Call the `ExchangeGateway`
//! 5. On a fill, settle both legs in one ledger unit of work and mark the
//!    order `COMPLETED`; on any failure mark it `FAILED` and leave balances
//!    untouched
//!
//! Nothing is reserved between steps 2 and 5. A concurrent debit can still
//! make settlement fail, in which case the order fails with the ledger's error.

use super::ledger::Ledger;
use super::traits::{Clock, ExchangeGateway, LedgerStore, PriceFeed};
use crate::types::{
    BalanceKey, LedgerError, Memo, NewOrder, Order, OrderId, OrderSide, OrderStatus,
    TransactionType, UserId,
};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;

pub struct OrderEngine<S: LedgerStore> {
    ledger: Ledger<S>,
    prices: Arc<dyn PriceFeed>,
    exchange: Arc<dyn ExchangeGateway>,
    clock: Arc<dyn Clock>,
    orders: DashMap<OrderId, Order>,
}

impl<S: LedgerStore> OrderEngine<S> {
    pub fn new(
        ledger: Ledger<S>,
        prices: Arc<dyn PriceFeed>,
        exchange: Arc<dyn ExchangeGateway>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ledger,
            prices,
            exchange,
            clock,
            orders: DashMap::new(),
        }
    }

    /// Place and settle an order
    ///
    /// # Returns
    ///
    /// The `COMPLETED` order.
    ///
    /// # Errors
    ///
    /// - `InvalidAmount`, `PriceUnavailable`, `InsufficientFunds` before any
    ///   order is recorded
    /// - `ExternalExecutionFailed` if the exchange refuses; the order is kept
    ///   as `FAILED`
    /// - any ledger error raised while settling; the order is kept as `FAILED`
    pub fn create_order(&self, request: NewOrder) -> Result<Order, LedgerError> {
        if request.amount <= Decimal::ZERO {
            return Err(LedgerError::invalid_amount(request.amount, "must be positive"));
        }

        let price = self.prices.price(&request.base, &request.quote)?;
        let total = request
            .amount
            .checked_mul(price)
            .ok_or_else(|| {
                LedgerError::arithmetic_overflow("order total", &request.user, &request.quote)
            })?;

        let now = self.clock.now();
        let mut order = Order {
            id: OrderId::new(),
            user: request.user,
            side: request.side,
            base: request.base,
            quote: request.quote,
            amount: request.amount,
            price,
            total,
            status: OrderStatus::Pending,
            external_ref: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        };

        let (paid_currency, paid) = order.paid_leg();
        let available = self.ledger.get_balance(&order.user, paid_currency).available();
        if available < paid {
            return Err(LedgerError::insufficient_funds(
                &order.user,
                paid_currency,
                available,
                paid,
            ));
        }

        self.orders.insert(order.id, order.clone());
        tracing::info!(
            order = %order.id,
            user = %order.user,
            side = %order.side,
            %price,
            "order pending"
        );

        let report = match self.exchange.execute(&order) {
            Ok(report) => report,
            Err(reason) => {
                self.fail(&mut order, reason.clone());
                return Err(LedgerError::ExternalExecutionFailed {
                    order: order.id.to_string(),
                    reason,
                });
            }
        };

        if let Err(err) = self.settle(&order, &report.external_ref) {
            self.fail(&mut order, err.to_string());
            return Err(err);
        }

        order.complete(report.external_ref, self.clock.now())?;
        self.orders.insert(order.id, order.clone());
        tracing::info!(order = %order.id, total = %order.total, "order completed");
        Ok(order)
    }

    fn settle(&self, order: &Order, external_ref: &str) -> Result<(), LedgerError> {
        let (paid_currency, paid) = order.paid_leg();
        let (received_currency, received) = order.received_leg();
        let paid_key = BalanceKey::new(order.user.clone(), paid_currency.clone());
        let received_key = BalanceKey::new(order.user.clone(), received_currency.clone());

        let kind = match order.side {
            OrderSide::Buy => TransactionType::BuyCrypto,
            OrderSide::Sell => TransactionType::SellCrypto,
        };
        let memo = Memo::new(
            kind,
            format!("{} {} {} @ {}", order.side, order.amount, order.base, order.price),
        )
        .with("order_id", order.id)
        .with("external_ref", external_ref);

        self.ledger
            .transact(&[paid_key.clone(), received_key.clone()], |s| {
                s.subtract(&paid_key, paid, &memo)?;
                s.add(&received_key, received, &memo)?;
                Ok(())
            })
    }

    fn fail(&self, order: &mut Order, reason: String) {
        tracing::warn!(order = %order.id, %reason, "order failed");
        // A freshly built order is always pending
        if order.fail(reason, self.clock.now()).is_ok() {
            self.orders.insert(order.id, order.clone());
        }
    }

    pub fn get_order(&self, id: OrderId) -> Result<Order, LedgerError> {
        self.orders
            .get(&id)
            .map(|order| order.clone())
            .ok_or_else(|| LedgerError::OrderNotFound {
                order: id.to_string(),
            })
    }

    /// A user's orders, oldest first
    pub fn orders_for(&self, user: &UserId) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| entry.user == *user)
            .map(|entry| entry.value().clone())
            .collect();
        orders.sort_by_key(|order| order.created_at);
        orders
    }
}
