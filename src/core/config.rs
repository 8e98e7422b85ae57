//! Engine configuration

use chrono::Duration;

/// Tunables shared by the ledger, order and P2P engines
///
/// # Example
///
/// ```
/// use rust_escrow_ledger::core::EngineConfig;
///
/// let config = EngineConfig::default().with_trade_window_mins(30);
/// assert_eq!(config.trade_window.num_minutes(), 30);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// How long a trade stays open before it may be expired
    pub trade_window: Duration,
    /// Default offer lifetime when the caller gives no expiry
    pub offer_ttl: Duration,
    /// Decimal places kept when deriving a trade's crypto amount
    pub crypto_scale: u32,
    /// History page size when the caller gives none
    pub history_page_size: usize,
    /// Upper bound on a requested history page size
    pub max_history_page_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            trade_window: Duration::hours(2),
            offer_ttl: Duration::hours(24),
            crypto_scale: 8,
            history_page_size: 50,
            max_history_page_size: 500,
        }
    }
}

impl EngineConfig {
    pub fn with_trade_window_mins(mut self, minutes: i64) -> Self {
        self.trade_window = Duration::minutes(minutes);
        self
    }

    pub fn with_offer_ttl_mins(mut self, minutes: i64) -> Self {
        self.offer_ttl = Duration::minutes(minutes);
        self
    }

    /// Effective page size for a history request
    ///
    /// `None` and zero fall back to the default; anything above the maximum
    /// is capped.
    pub fn page_size(&self, requested: Option<usize>) -> usize {
        match requested {
            Some(0) | None => self.history_page_size,
            Some(size) => size.min(self.max_history_page_size),
        }
    }
}
