use crate::{
    db_types::{DepositTransaction, LedgerEntry, SettlementCode, UserId, WalletBalance},
    epe_api::wallet_objects::{LedgerHistory, Pagination},
    traits::{LedgerApiError, LedgerManagement},
};

/// Read-only access to wallet state: balances, ledger history and deposit lookups.
#[derive(Debug, Clone)]
pub struct LedgerApi<B> {
    db: B,
}

impl<B> LedgerApi<B>
where B: LedgerManagement
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    pub async fn balance(&self, user_id: UserId) -> Result<WalletBalance, LedgerApiError> {
        self.db.fetch_wallet_balance(user_id).await
    }

    pub async fn entries(&self, user_id: UserId, pagination: &Pagination) -> Result<Vec<LedgerEntry>, LedgerApiError> {
        self.db.fetch_ledger_entries(user_id, pagination).await
    }

    /// One page of history together with the current balance.
    pub async fn history(&self, user_id: UserId, pagination: &Pagination) -> Result<LedgerHistory, LedgerApiError> {
        let balance = self.db.fetch_wallet_balance(user_id).await?;
        let entries = self.db.fetch_ledger_entries(user_id, pagination).await?;
        Ok(LedgerHistory { user_id, balance: balance.balance, entries })
    }

    pub async fn deposit(&self, id: i64) -> Result<Option<DepositTransaction>, LedgerApiError> {
        self.db.fetch_deposit(id).await
    }

    pub async fn deposit_by_code(&self, code: &SettlementCode) -> Result<Option<DepositTransaction>, LedgerApiError> {
        self.db.fetch_deposit_by_code(code).await
    }
}
