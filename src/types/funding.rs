//! Payment rail types (withdrawal tickets)

use super::ids::{Currency, UserId, WithdrawalId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WithdrawalStatus {
    /// Funds locked, payout not yet confirmed by the rail
    Pending,
    /// Payout confirmed, funds subtracted
    Completed,
    /// Payout refused, funds unlocked
    Rejected,
}

impl fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WithdrawalStatus::Pending => "PENDING",
            WithdrawalStatus::Completed => "COMPLETED",
            WithdrawalStatus::Rejected => "REJECTED",
        })
    }
}

/// A withdrawal waiting for the payment rail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalTicket {
    pub id: WithdrawalId,
    pub user: UserId,
    pub currency: Currency,
    pub amount: Decimal,
    pub status: WithdrawalStatus,
    /// Rail reference, if the caller supplied one
    pub external_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
