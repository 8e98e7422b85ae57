//! Core business logic module
//!
//! - `traits` - store, unit-of-work and external collaborator abstractions
//! - `store` - in-memory row-locked balance store and journal
//! - `ledger` - the ledger service, sole mutator of balances
//! - `order` - single-party exchange orders
//! - `p2p` - P2P offers and escrowed trades
//! - `funding` - deposits and withdrawals
//! - `engine` - facade routing replay commands
//! - `batch_processor` - concurrent replay of independent command groups

pub mod batch_processor;
pub mod config;
pub mod engine;
pub mod external;
pub mod funding;
pub mod ledger;
pub mod order;
pub mod p2p;
pub mod store;
pub mod traits;

pub use batch_processor::{BatchProcessor, ProcessingResult};
pub use config::EngineConfig;
pub use engine::EscrowEngine;
pub use external::{ManualClock, PaperExchange, StaticPriceFeed, SystemClock};
pub use funding::FundingDesk;
pub use ledger::{Ledger, Session};
pub use order::OrderEngine;
pub use p2p::P2PEngine;
pub use store::InMemoryStore;
pub use traits::{Clock, ExchangeGateway, ExecutionReport, LedgerStore, PriceFeed, UnitOfWork};
