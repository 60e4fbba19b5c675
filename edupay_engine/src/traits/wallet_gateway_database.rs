use chrono::Duration;
use epg_common::Money;
use thiserror::Error;

use super::{CouponError, LedgerApiError, LedgerManagement, PurchaseReceipt, SettlementOutcome};
use crate::db_types::{CoursePurchase, DepositTransaction, NewDeposit, SettlementCode, SettlementEvent, UserId};

#[derive(Debug, Clone, Error)]
pub enum WalletGatewayError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Deposit amounts must be positive. Got {0}.")]
    InvalidAmount(Money),
    #[error("Settlement code {0} is already claimed by another deposit")]
    SettlementCodeTaken(SettlementCode),
    #[error("Could not find an unused settlement code after {0} attempts")]
    SettlementCodeExhausted(u32),
    #[error("Deposit {0} does not exist")]
    DepositNotFound(i64),
    #[error("Insufficient balance. The wallet holds {available} but the purchase needs {required}.")]
    InsufficientBalance { available: Money, required: Money },
    #[error("Coupon problem: {0}")]
    CouponError(#[from] CouponError),
    #[error("Ledger problem: {0}")]
    LedgerError(#[from] LedgerApiError),
}

impl From<sqlx::Error> for WalletGatewayError {
    fn from(e: sqlx::Error) -> Self {
        Self::DatabaseError(e.to_string())
    }
}

/// The primary write contract for the wallet gateway.
///
/// Implementations must make [`settle_deposit`] and [`purchase_with_wallet`] atomic: either every
/// row touched by the operation lands, or none do. The settlement path must additionally tolerate
/// redelivery of the same event without double-crediting.
///
/// [`settle_deposit`]: WalletGatewayDatabase::settle_deposit
/// [`purchase_with_wallet`]: WalletGatewayDatabase::purchase_with_wallet
#[allow(async_fn_in_trait)]
pub trait WalletGatewayDatabase: Clone + LedgerManagement {
    /// The database URL for the instance.
    fn url(&self) -> &str;

    /// Opens a new pending deposit with a freshly generated settlement code.
    async fn create_deposit(&self, deposit: NewDeposit) -> Result<DepositTransaction, WalletGatewayError>;

    /// Runs one inbound transfer report through the matching contract.
    ///
    /// A report credits the wallet only if it names a pending deposit's code **and** quotes its
    /// exact amount. Everything else is accounted for without moving money, see
    /// [`SettlementOutcome`]. `mismatch_threshold` is the strike count at which a repeatedly
    /// mismatched deposit is closed as failed.
    async fn settle_deposit(
        &self,
        event: &SettlementEvent,
        mismatch_threshold: u32,
    ) -> Result<SettlementOutcome, WalletGatewayError>;

    /// Pays for course access out of the wallet, applying an optional coupon.
    ///
    /// The coupon check, its usage-count bump and the balance debit all commit together. A failed
    /// purchase therefore never consumes a coupon use.
    async fn purchase_with_wallet(
        &self,
        user_id: UserId,
        purchase: &CoursePurchase,
    ) -> Result<PurchaseReceipt, WalletGatewayError>;

    /// Closes every pending deposit older than `claim_window` and returns the closed rows.
    async fn expire_stale_deposits(
        &self,
        claim_window: Duration,
    ) -> Result<Vec<DepositTransaction>, WalletGatewayError>;

    /// Releases the underlying connections.
    async fn close(&mut self) -> Result<(), WalletGatewayError>;
}
