use epg_common::Money;
use serde::{Deserialize, Serialize};

use crate::db_types::{DepositStatus, DepositTransaction};

/// Fired after a settlement event credited a wallet. The transaction inside is the confirmed row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentConfirmedEvent {
    pub transaction: DepositTransaction,
    pub new_balance: Money,
}

impl PaymentConfirmedEvent {
    pub fn new(transaction: DepositTransaction, new_balance: Money) -> Self {
        Self { transaction, new_balance }
    }
}

/// Fired when a pending deposit is closed without being credited, either by the expiry sweeper or
/// by the mismatch strike limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositClosedEvent {
    pub transaction: DepositTransaction,
    pub status: DepositStatus,
}

impl DepositClosedEvent {
    pub fn new(transaction: DepositTransaction) -> Self {
        let status = transaction.status;
        Self { transaction, status }
    }
}
