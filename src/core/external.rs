//! Stand-ins for the engine's external collaborators
//!
//! - `SystemClock` / `ManualClock` - wall-clock and test-controlled time
//! - `StaticPriceFeed` - a fixed quote table, loaded from CLI flags in replay
//! - `PaperExchange` - fills every order locally, or refuses all of them

use super::traits::{Clock, ExchangeGateway, ExecutionReport, PriceFeed};
use crate::types::{Currency, LedgerError, Order};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// The real clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Fixed price table keyed by `(base, quote)`
#[derive(Debug, Default)]
pub struct StaticPriceFeed {
    prices: DashMap<(Currency, Currency), Decimal>,
}

impl StaticPriceFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, base: Currency, quote: Currency, price: Decimal) {
        self.prices.insert((base, quote), price);
    }

    /// Parse a `BASE/QUOTE=PRICE` quote, e.g. `BTC/BRL=350000`
    ///
    /// # Errors
    ///
    /// `InvalidCurrency` for a bad code, `InvalidAmount` for a missing or
    /// non-positive price, `ParseError` for anything else malformed.
    pub fn parse_quote(spec: &str) -> Result<(Currency, Currency, Decimal), LedgerError> {
        let malformed = || LedgerError::ParseError {
            line: None,
            message: format!("expected BASE/QUOTE=PRICE, got '{}'", spec),
        };

        let (pair, price) = spec.split_once('=').ok_or_else(malformed)?;
        let (base, quote) = pair.split_once('/').ok_or_else(malformed)?;
        let price = Decimal::from_str(price.trim())
            .map_err(|_| LedgerError::invalid_amount(price.trim(), "price is not a decimal"))?;
        if price <= Decimal::ZERO {
            return Err(LedgerError::invalid_amount(price, "price must be positive"));
        }

        Ok((Currency::parse(base)?, Currency::parse(quote)?, price))
    }
}

impl PriceFeed for StaticPriceFeed {
    fn price(&self, base: &Currency, quote: &Currency) -> Result<Decimal, LedgerError> {
        self.prices
            .get(&(base.clone(), quote.clone()))
            .map(|price| *price)
            .ok_or_else(|| LedgerError::PriceUnavailable {
                pair: format!("{}/{}", base, quote),
            })
    }
}

/// Exchange that fills locally with sequential references
#[derive(Debug, Default)]
pub struct PaperExchange {
    next_fill: AtomicU64,
    offline: AtomicBool,
}

impl PaperExchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent execution fail (or succeed again)
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

impl ExchangeGateway for PaperExchange {
    fn execute(&self, order: &Order) -> Result<ExecutionReport, String> {
        if self.offline.load(Ordering::SeqCst) {
            return Err("exchange unavailable".to_string());
        }

        let fill = self.next_fill.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(order = %order.id, fill, "paper fill");
        Ok(ExecutionReport {
            external_ref: format!("paper-{}", fill),
        })
    }
}
