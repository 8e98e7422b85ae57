//! Error types for the escrow ledger
//!
//! Every failure the engine can report is a variant of `LedgerError`.
//!
//! # Error Categories
//!
//! - **Caller errors**: malformed amounts or currencies, trade sizes outside an
//!   offer's range, acting on somebody else's trade
//! - **Business outcomes**: insufficient funds, unavailable offers, illegal
//!   state transitions. Expected and reported precisely to the user.
//! - **Defects**: `InvariantViolation`. Never a normal outcome; logged and
//!   alerted separately (see [`LedgerError::is_fatal`]).
//! - **I/O and parsing**: only produced by the CSV replay front end

use rust_decimal::Decimal;
use thiserror::Error;

/// Main error type for the escrow ledger
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    /// Non-positive or malformed amount
    #[error("Invalid amount '{amount}': {reason}")]
    InvalidAmount {
        /// The offending amount as given
        amount: String,
        /// What is wrong with it
        reason: String,
    },

    /// Currency code that is not a short alphanumeric code
    #[error("Invalid currency code '{code}'")]
    InvalidCurrency { code: String },

    /// Not enough unlocked funds for a subtract or lock
    ///
    /// Locked funds never count: a user with amount 10 and locked 8 has only
    /// 2 available.
    #[error("Insufficient funds for user {user} in {currency}: available {available}, requested {requested}")]
    InsufficientFunds {
        user: String,
        currency: String,
        available: Decimal,
        requested: Decimal,
    },

    /// Ledger invariant broken, which indicates a caller bug
    ///
    /// Raised for an unlock exceeding the locked amount, or for a unit of
    /// work touching a row it never acquired.
    #[error("Invariant violation on {user}/{currency}: {detail}")]
    InvariantViolation {
        user: String,
        currency: String,
        detail: String,
    },

    /// Decimal arithmetic would overflow
    #[error("Arithmetic overflow in {operation} for {user}/{currency}")]
    ArithmeticOverflow {
        operation: String,
        user: String,
        currency: String,
    },

    /// Action not allowed from the entity's current status
    ///
    /// Also returned for any action on a trade that is already terminal.
    #[error("Cannot {action} {entity} {id}: it is {from}")]
    InvalidStateTransition {
        /// "trade", "order", "offer" or "withdrawal"
        entity: &'static str,
        id: String,
        /// Current status
        from: String,
        /// Attempted action
        action: &'static str,
    },

    /// A user tried to trade against their own offer
    #[error("User {user} cannot trade against their own offer {offer}")]
    SelfTradeForbidden { user: String, offer: String },

    /// Offer is inactive, expired, exhausted or unknown
    #[error("Offer {offer} is unavailable: {reason}")]
    OfferUnavailable { offer: String, reason: String },

    /// Offer parameters rejected at creation
    #[error("Invalid offer: {reason}")]
    InvalidOffer { reason: String },

    /// Requested fiat amount outside the offer's trade limits
    #[error("Trade size {requested} outside offer limits [{min}, {max}]")]
    TradeSizeOutOfRange {
        requested: Decimal,
        min: Decimal,
        max: Decimal,
    },

    /// Only the offer's owner may manage it
    #[error("User {user} does not own offer {offer}")]
    NotOfferOwner { user: String, offer: String },

    /// Only the buyer/seller (depending on the action) may act
    #[error("User {user} may not {action} trade {trade}")]
    NotTradeParticipant {
        user: String,
        trade: String,
        action: &'static str,
    },

    /// Expiry requested before the trade's deadline
    #[error("Trade {trade} does not expire until {expires_at}")]
    TradeNotExpired { trade: String, expires_at: String },

    #[error("Trade {trade} not found")]
    TradeNotFound { trade: String },

    #[error("Offer {offer} not found")]
    OfferNotFound { offer: String },

    #[error("Order {order} not found")]
    OrderNotFound { order: String },

    #[error("Withdrawal {withdrawal} not found")]
    WithdrawalNotFound { withdrawal: String },

    /// External reference already applied (deposit replay)
    #[error("Reference '{reference}' was already processed")]
    DuplicateReference { reference: String },

    /// Pricing feed has no quote for the pair
    #[error("No price available for {pair}")]
    PriceUnavailable { pair: String },

    /// Exchange call failed; the order is FAILED and balances are untouched
    #[error("External execution failed for order {order}: {reason}")]
    ExternalExecutionFailed { order: String, reason: String },

    /// CSV parsing error (replay front end)
    #[error("CSV parse error{}: {message}", line.map(|l| format!(" at line {}", l)).unwrap_or_default())]
    ParseError { line: Option<u64>, message: String },

    /// I/O error (replay front end)
    #[error("I/O error: {message}")]
    IoError { message: String },
}

impl From<std::io::Error> for LedgerError {
    fn from(error: std::io::Error) -> Self {
        LedgerError::IoError {
            message: error.to_string(),
        }
    }
}

impl From<csv::Error> for LedgerError {
    fn from(error: csv::Error) -> Self {
        let line = error.position().map(|pos| pos.line());

        LedgerError::ParseError {
            line,
            message: error.to_string(),
        }
    }
}

// Helper functions for creating common errors

impl LedgerError {
    /// True for errors that indicate a defect rather than a business outcome
    ///
    /// These must be logged distinctly and never shown to a user as an
    /// ordinary rejection.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LedgerError::InvariantViolation { .. })
    }

    pub fn invalid_amount(amount: impl ToString, reason: &str) -> Self {
        LedgerError::InvalidAmount {
            amount: amount.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_currency(code: &str) -> Self {
        LedgerError::InvalidCurrency {
            code: code.to_string(),
        }
    }

    pub fn insufficient_funds(
        user: impl ToString,
        currency: impl ToString,
        available: Decimal,
        requested: Decimal,
    ) -> Self {
        LedgerError::InsufficientFunds {
            user: user.to_string(),
            currency: currency.to_string(),
            available,
            requested,
        }
    }

    pub fn invariant_violation(
        user: impl ToString,
        currency: impl ToString,
        detail: impl Into<String>,
    ) -> Self {
        LedgerError::InvariantViolation {
            user: user.to_string(),
            currency: currency.to_string(),
            detail: detail.into(),
        }
    }

    pub fn arithmetic_overflow(
        operation: &str,
        user: impl ToString,
        currency: impl ToString,
    ) -> Self {
        LedgerError::ArithmeticOverflow {
            operation: operation.to_string(),
            user: user.to_string(),
            currency: currency.to_string(),
        }
    }

    pub fn invalid_transition(
        entity: &'static str,
        id: impl ToString,
        from: impl ToString,
        action: &'static str,
    ) -> Self {
        LedgerError::InvalidStateTransition {
            entity,
            id: id.to_string(),
            from: from.to_string(),
            action,
        }
    }

    pub fn offer_unavailable(offer: impl ToString, reason: &str) -> Self {
        LedgerError::OfferUnavailable {
            offer: offer.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_offer(reason: &str) -> Self {
        LedgerError::InvalidOffer {
            reason: reason.to_string(),
        }
    }

    pub fn not_participant(
        user: impl ToString,
        trade: impl ToString,
        action: &'static str,
    ) -> Self {
        LedgerError::NotTradeParticipant {
            user: user.to_string(),
            trade: trade.to_string(),
            action,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_only_invariant_violations_are_fatal() {
        assert!(LedgerError::invariant_violation("u1", "BTC", "unlock exceeds locked").is_fatal());
        assert!(!LedgerError::insufficient_funds("u1", "BTC", dec!(1), dec!(2)).is_fatal());
        assert!(!LedgerError::invalid_transition("trade", "t1", "COMPLETED", "release").is_fatal());
    }

    #[test]
    fn test_insufficient_funds_message_names_the_side() {
        let err = LedgerError::insufficient_funds("alice", "BRL", dec!(100), dec!(500));
        assert_eq!(
            err.to_string(),
            "Insufficient funds for user alice in BRL: available 100, requested 500"
        );
    }

    #[test]
    fn test_transition_message_reports_actual_state() {
        let err = LedgerError::invalid_transition("trade", "t-9", "EXPIRED", "confirm payment for");
        assert_eq!(err.to_string(), "Cannot confirm payment for trade t-9: it is EXPIRED");
    }

    #[test]
    fn test_parse_error_without_line() {
        let err = LedgerError::ParseError {
            line: None,
            message: "bad row".to_string(),
        };
        assert_eq!(err.to_string(), "CSV parse error: bad row");
    }
}
