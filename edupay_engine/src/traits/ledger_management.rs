use thiserror::Error;

use crate::{
    db_types::{DepositTransaction, LedgerEntry, SettlementCode, UserId, WalletBalance},
    epe_api::wallet_objects::Pagination,
};

#[derive(Debug, Clone, Error)]
pub enum LedgerApiError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Deposit {0} has already been credited to the ledger")]
    AlreadyCredited(i64),
}

impl From<sqlx::Error> for LedgerApiError {
    fn from(e: sqlx::Error) -> Self {
        Self::DatabaseError(e.to_string())
    }
}

/// Read access to wallet state. Users with no activity have a zero balance rather than an error.
#[allow(async_fn_in_trait)]
pub trait LedgerManagement {
    async fn fetch_wallet_balance(&self, user_id: UserId) -> Result<WalletBalance, LedgerApiError>;

    /// The user's ledger entries, newest first.
    async fn fetch_ledger_entries(&self, user_id: UserId, pagination: &Pagination)
        -> Result<Vec<LedgerEntry>, LedgerApiError>;

    async fn fetch_deposit(&self, id: i64) -> Result<Option<DepositTransaction>, LedgerApiError>;

    async fn fetch_deposit_by_code(&self, code: &SettlementCode)
        -> Result<Option<DepositTransaction>, LedgerApiError>;
}
