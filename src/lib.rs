//! Ledger & escrow trade engine
//!
//! # Overview
//!
//! A balance ledger where every balance change is one of the four
//! primitives (add, subtract, lock, unlock), each recorded in an
//! append-only transaction log. On top of the ledger sit a single-party
//! order engine and a peer-to-peer escrow engine. A CSV replay front end
//! drives the engine with either a sync or an async strategy.
//!
//! # Architecture
//!
//! - [`types`] - value types (`Balance`, `Transaction`, `P2PTrade`, ...) and `LedgerError`
//! - [`core`] - business logic:
//!   - [`core::store`] - row-locked balance store with unit-of-work commits
//!   - [`core::ledger`] - the ledger service, only writer of balances
//!   - [`core::order`] - buy/sell orders against a quoted price
//!   - [`core::p2p`] - offers, escrowed trades and their expiry
//!   - [`core::funding`] - deposits and withdrawals
//!   - [`core::engine`] - replay command routing
//! - [`io`] - CSV command readers and balance writer
//! - [`strategy`] - sync and async replay pipelines
//! - [`cli`] - command-line arguments
//!
//! # Balance invariant
//!
//! For every `(user, currency)` row, `0 <= locked <= amount` holds after
//! every committed operation. Available funds are `amount - locked`.
//!
//! # Trade lifecycle
//!
//! ```text
//! PENDING --confirm--> PAYMENT_SENT --release--> COMPLETED
//!    |                      |
//!    +--cancel/expire-------+--> CANCELLED / EXPIRED
//! ```

pub mod cli;
pub mod core;
pub mod io;
pub mod strategy;
pub mod types;

pub use core::{EngineConfig, EscrowEngine, Ledger, OrderEngine, P2PEngine};
pub use io::write_balances_csv;
pub use types::{Balance, BalanceKey, Command, Currency, LedgerError, Transaction, UserId};
