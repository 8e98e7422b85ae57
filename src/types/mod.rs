//! Types module
//!
//! Contains core data structures used throughout the engine.
//! This module organizes types into logical submodules:
//! - `ids`: user, currency and record identifiers
//! - `balance`: the invariant-carrying `Balance` value and its row key
//! - `transaction`: journal entries and history queries
//! - `order`: single-party exchange orders
//! - `p2p`: offers, trades and the trade state machine
//! - `funding`: withdrawal tickets for the payment rail
//! - `command`: validated replay rows
//! - `error`: the `LedgerError` taxonomy

pub mod balance;
pub mod command;
pub mod error;
pub mod funding;
pub mod ids;
pub mod order;
pub mod p2p;
pub mod transaction;

pub use balance::{Balance, BalanceKey, BalanceRejection};
pub use command::Command;
pub use error::LedgerError;
pub use funding::{WithdrawalStatus, WithdrawalTicket};
pub use ids::{Currency, OfferId, OrderId, TradeId, TransactionId, UserId, WithdrawalId};
pub use order::{NewOrder, Order, OrderSide, OrderStatus};
pub use p2p::{
    CancelBy, NewOffer, OfferSide, OfferStatus, P2POffer, P2PTrade, TradeEvent, TradeStatus,
};
pub use transaction::{LedgerOp, Memo, Page, Transaction, TransactionFilter, TransactionType};
