//! `SqliteDatabase` is the concrete SQLite backend for the wallet gateway.
//!
//! It implements all the traits in the [`crate::traits`] module. The interesting invariants live
//! in the two transactional flows: [`settle_deposit`](WalletGatewayDatabase::settle_deposit) and
//! [`purchase_with_wallet`](WalletGatewayDatabase::purchase_with_wallet).
use std::fmt::Debug;

use chrono::{Duration, Utc};
use epg_common::Money;
use log::*;
use sqlx::SqlitePool;

use super::db::{coupons, db_url, deposits, ledger, new_pool};
use crate::{
    db_types::{
        Coupon,
        CoursePurchase,
        DepositStatus,
        DepositTransaction,
        LedgerEntry,
        NewCoupon,
        NewDeposit,
        SettlementCode,
        SettlementEvent,
        UserId,
        WalletBalance,
    },
    epe_api::wallet_objects::Pagination,
    helpers::new_settlement_code,
    traits::{
        CouponError,
        CouponManagement,
        DiscardReason,
        LedgerApiError,
        LedgerManagement,
        PurchaseReceipt,
        SettlementOutcome,
        WalletGatewayDatabase,
        WalletGatewayError,
    },
};

/// Number of times a colliding settlement code is re-rolled before giving up.
const MAX_CODE_ATTEMPTS: u32 = 5;

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Connects against `EPG_DATABASE_URL`, or the baked-in default when that is not set.
    pub async fn new(max_connections: u32) -> Result<Self, WalletGatewayError> {
        let url = db_url();
        Self::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, WalletGatewayError> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    /// Applies any pending schema migrations.
    pub async fn run_migrations(&self) -> Result<(), WalletGatewayError> {
        sqlx::migrate!("./src/sqlite/migrations")
            .run(&self.pool)
            .await
            .map_err(|e| WalletGatewayError::DatabaseError(e.to_string()))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl WalletGatewayDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn create_deposit(&self, deposit: NewDeposit) -> Result<DepositTransaction, WalletGatewayError> {
        if !deposit.amount.is_positive() {
            return Err(WalletGatewayError::InvalidAmount(deposit.amount));
        }
        let mut conn = self.pool.acquire().await?;
        for _ in 0..MAX_CODE_ATTEMPTS {
            let code = new_settlement_code();
            match deposits::try_insert(&deposit, &code, &mut conn).await {
                Err(WalletGatewayError::SettlementCodeTaken(code)) => {
                    warn!("🗃️ Settlement code {code} collided with an existing deposit. Re-rolling.");
                },
                other => return other,
            }
        }
        Err(WalletGatewayError::SettlementCodeExhausted(MAX_CODE_ATTEMPTS))
    }

    async fn settle_deposit(
        &self,
        event: &SettlementEvent,
        mismatch_threshold: u32,
    ) -> Result<SettlementOutcome, WalletGatewayError> {
        let mut tx = self.pool.begin().await?;
        // Write-first: the guarded UPDATE is the match check. Whoever wins it owns the credit;
        // every other delivery of the event falls through to the diagnosis below.
        let outcome = match deposits::confirm_if_matching(event, &mut tx).await? {
            Some(confirmed) => {
                let reason = format!("deposit:{}", confirmed.settlement_code);
                match ledger::credit(confirmed.user_id, confirmed.amount, Some(confirmed.id), Some(reason), &mut tx)
                    .await
                {
                    Ok(entry) => {
                        SettlementOutcome::Credited { new_balance: entry.balance_after, transaction: confirmed }
                    },
                    Err(LedgerApiError::AlreadyCredited(id)) => {
                        // The CAS can only be won once per deposit, so this guard firing means the
                        // ledger and the deposit table disagree. Keep the confirmation, skip the
                        // credit, and shout about it.
                        error!(
                            "🗃️ Deposit {id} already has a ledger entry but was still pending. The wallet was NOT \
                             credited again."
                        );
                        SettlementOutcome::AlreadyConfirmed { transaction: confirmed }
                    },
                    Err(e) => return Err(e.into()),
                }
            },
            None => diagnose_miss(event, mismatch_threshold, &mut tx).await?,
        };
        tx.commit().await?;
        Ok(outcome)
    }

    async fn purchase_with_wallet(
        &self,
        user_id: UserId,
        purchase: &CoursePurchase,
    ) -> Result<PurchaseReceipt, WalletGatewayError> {
        if !purchase.amount.is_positive() {
            return Err(WalletGatewayError::InvalidAmount(purchase.amount));
        }
        let mut tx = self.pool.begin().await?;
        let mut discount = Money::default();
        if let Some(code) = &purchase.coupon_code {
            let coupon =
                coupons::fetch_coupon(code, &mut tx).await.map_err(CouponError::from)?.ok_or_else(|| {
                    CouponError::NotFound(code.clone())
                })?;
            if coupon.is_expired(Utc::now()) {
                return Err(CouponError::Expired(code.clone(), coupon.expires_at).into());
            }
            if !coupon.applies_to(purchase) {
                return Err(CouponError::ScopeMismatch(code.clone()).into());
            }
            if !coupons::take_usage_slot(code, &mut tx).await? {
                return Err(CouponError::Exhausted(code.clone()).into());
            }
            discount = coupon.discount_on(purchase.amount);
        }
        let final_amount = purchase.amount - discount;
        let reason = match &purchase.coupon_code {
            Some(code) => format!("enrollment:{} coupon:{code}", purchase.course_id),
            None => format!("enrollment:{}", purchase.course_id),
        };
        // An error from the debit (insufficient funds included) rolls the whole transaction back,
        // so a failed purchase never consumes a coupon slot.
        let entry = ledger::debit(user_id, final_amount, Some(reason), &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ User {user_id} paid {final_amount} for {}", purchase.course_id);
        Ok(PurchaseReceipt {
            course_id: purchase.course_id.clone(),
            base_amount: purchase.amount,
            discount,
            final_amount,
            new_balance: entry.balance_after,
            coupon_code: purchase.coupon_code.clone(),
            entry,
        })
    }

    async fn expire_stale_deposits(
        &self,
        claim_window: Duration,
    ) -> Result<Vec<DepositTransaction>, WalletGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let expired = deposits::expire_deposits(claim_window, &mut conn).await?;
        Ok(expired)
    }

    async fn close(&mut self) -> Result<(), WalletGatewayError> {
        self.pool.close().await;
        Ok(())
    }
}

/// Works out what a settlement event that failed the compare-and-set actually was.
///
/// Runs on the same transaction as the CAS, so the state it reads cannot shift under it.
async fn diagnose_miss(
    event: &SettlementEvent,
    mismatch_threshold: u32,
    tx: &mut sqlx::SqliteConnection,
) -> Result<SettlementOutcome, WalletGatewayError> {
    let Some(deposit) = deposits::fetch_deposit_by_code(&event.settlement_code, &mut *tx).await? else {
        return Ok(SettlementOutcome::Discarded { reason: DiscardReason::UnknownCode });
    };
    let outcome = match deposit.status {
        DepositStatus::Confirmed => {
            if deposit.external_ref.as_deref() == Some(event.external_ref.as_str()) {
                // Redelivery of the transfer that settled this deposit.
                SettlementOutcome::AlreadyConfirmed { transaction: deposit }
            } else {
                SettlementOutcome::Discarded { reason: DiscardReason::ForeignRef }
            }
        },
        DepositStatus::Expired | DepositStatus::Failed => {
            SettlementOutcome::Discarded { reason: DiscardReason::Closed(deposit.status) }
        },
        // Still pending and the CAS missed, so the reported amount was wrong.
        DepositStatus::Pending => match deposits::record_mismatch(deposit.id, &mut *tx).await? {
            Some(attempts) if attempts >= i64::from(mismatch_threshold) => {
                match deposits::mark_failed(deposit.id, &mut *tx).await? {
                    Some(failed) => SettlementOutcome::MarkedFailed { transaction: failed },
                    None => mismatch_outcome(deposit, attempts),
                }
            },
            Some(attempts) => mismatch_outcome(deposit, attempts),
            None => SettlementOutcome::Discarded { reason: DiscardReason::UnknownCode },
        },
    };
    Ok(outcome)
}

fn mismatch_outcome(mut deposit: DepositTransaction, attempts: i64) -> SettlementOutcome {
    deposit.mismatch_count = attempts;
    SettlementOutcome::MismatchRecorded { transaction: deposit, attempts }
}

impl LedgerManagement for SqliteDatabase {
    async fn fetch_wallet_balance(&self, user_id: UserId) -> Result<WalletBalance, LedgerApiError> {
        let mut conn = self.pool.acquire().await?;
        let balance = ledger::fetch_balance(user_id, &mut conn).await?;
        Ok(balance.unwrap_or_else(|| WalletBalance::empty(user_id)))
    }

    async fn fetch_ledger_entries(
        &self,
        user_id: UserId,
        pagination: &Pagination,
    ) -> Result<Vec<LedgerEntry>, LedgerApiError> {
        let mut conn = self.pool.acquire().await?;
        let entries = ledger::history(user_id, pagination, &mut conn).await?;
        Ok(entries)
    }

    async fn fetch_deposit(&self, id: i64) -> Result<Option<DepositTransaction>, LedgerApiError> {
        let mut conn = self.pool.acquire().await?;
        let deposit = deposits::fetch_deposit(id, &mut conn).await?;
        Ok(deposit)
    }

    async fn fetch_deposit_by_code(&self, code: &SettlementCode) -> Result<Option<DepositTransaction>, LedgerApiError> {
        let mut conn = self.pool.acquire().await?;
        let deposit = deposits::fetch_deposit_by_code(code, &mut conn).await?;
        Ok(deposit)
    }
}

impl CouponManagement for SqliteDatabase {
    async fn create_coupon(&self, coupon: NewCoupon) -> Result<Coupon, CouponError> {
        if !(0..=100).contains(&coupon.percentage) {
            return Err(CouponError::InvalidPercentage(coupon.percentage));
        }
        if coupon.expires_at <= Utc::now() {
            return Err(CouponError::InvalidExpiry(coupon.expires_at));
        }
        let mut conn = self.pool.acquire().await?;
        coupons::insert_coupon(coupon, &mut conn).await
    }

    async fn fetch_coupon(&self, code: &str) -> Result<Option<Coupon>, CouponError> {
        let mut conn = self.pool.acquire().await?;
        let coupon = coupons::fetch_coupon(code, &mut conn).await?;
        Ok(coupon)
    }
}
