use chrono::Duration;
use sqlx::SqliteConnection;

use crate::{
    db_types::{DepositTransaction, NewDeposit, SettlementCode, SettlementEvent},
    traits::WalletGatewayError,
};

/// Inserts a new pending deposit under the given settlement code.
///
/// A clash with an existing code surfaces as [`WalletGatewayError::SettlementCodeTaken`] so the
/// caller can re-roll the code and try again.
pub async fn try_insert(
    deposit: &NewDeposit,
    code: &SettlementCode,
    conn: &mut SqliteConnection,
) -> Result<DepositTransaction, WalletGatewayError> {
    let transaction = sqlx::query_as(
        r#"
            INSERT INTO deposits (user_id, amount, settlement_code) VALUES ($1, $2, $3)
            RETURNING *;
        "#,
    )
    .bind(deposit.user_id)
    .bind(deposit.amount)
    .bind(code)
    .fetch_one(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => {
            WalletGatewayError::SettlementCodeTaken(code.clone())
        },
        _ => WalletGatewayError::from(e),
    })?;
    Ok(transaction)
}

pub async fn fetch_deposit(id: i64, conn: &mut SqliteConnection) -> Result<Option<DepositTransaction>, sqlx::Error> {
    sqlx::query_as(r#"SELECT * FROM deposits WHERE id = ?"#).bind(id).fetch_optional(conn).await
}

pub async fn fetch_deposit_by_code(
    code: &SettlementCode,
    conn: &mut SqliteConnection,
) -> Result<Option<DepositTransaction>, sqlx::Error> {
    sqlx::query_as(r#"SELECT * FROM deposits WHERE settlement_code = ?"#).bind(code).fetch_optional(conn).await
}

/// The compare-and-set at the heart of settlement.
///
/// Confirms a deposit and stamps the bank reference onto it, but only if the row still carries
/// `Pending` status and its amount equals the reported amount exactly. The UNIQUE constraint on
/// `settlement_code` means at most one row can ever match. Returns `None` when the event fits
/// nothing, with no rows changed.
pub async fn confirm_if_matching(
    event: &SettlementEvent,
    conn: &mut SqliteConnection,
) -> Result<Option<DepositTransaction>, WalletGatewayError> {
    let confirmed = sqlx::query_as(
        r#"
            UPDATE deposits
            SET status = 'Confirmed', external_ref = $1,
                confirmed_at = CURRENT_TIMESTAMP, updated_at = CURRENT_TIMESTAMP
            WHERE settlement_code = $2 AND status = 'Pending' AND amount = $3
            RETURNING *;
        "#,
    )
    .bind(&event.external_ref)
    .bind(&event.settlement_code)
    .bind(event.reported_amount)
    .fetch_optional(conn)
    .await?;
    Ok(confirmed)
}

/// Adds a mismatch strike to a still-pending deposit and returns the new strike count.
/// `None` means the deposit is no longer pending (or vanished) and nothing was recorded.
pub async fn record_mismatch(id: i64, conn: &mut SqliteConnection) -> Result<Option<i64>, WalletGatewayError> {
    let attempts = sqlx::query_scalar(
        r#"
            UPDATE deposits SET mismatch_count = mismatch_count + 1, updated_at = CURRENT_TIMESTAMP
            WHERE id = $1 AND status = 'Pending'
            RETURNING mismatch_count;
        "#,
    )
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(attempts)
}

/// Closes a pending deposit as failed. Guarded on status, so a deposit that was confirmed in the
/// meantime is left alone and `None` comes back.
pub async fn mark_failed(id: i64, conn: &mut SqliteConnection) -> Result<Option<DepositTransaction>, WalletGatewayError> {
    let failed = sqlx::query_as(
        r#"
            UPDATE deposits SET status = 'Failed', updated_at = CURRENT_TIMESTAMP
            WHERE id = $1 AND status = 'Pending'
            RETURNING *;
        "#,
    )
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(failed)
}

/// Expires every pending deposit whose claim window has lapsed and returns the closed rows.
pub async fn expire_deposits(
    claim_window: Duration,
    conn: &mut SqliteConnection,
) -> Result<Vec<DepositTransaction>, WalletGatewayError> {
    let expired = sqlx::query_as(
        r#"
            UPDATE deposits SET status = 'Expired', updated_at = CURRENT_TIMESTAMP
            WHERE status = 'Pending' AND (unixepoch(CURRENT_TIMESTAMP) - unixepoch(created_at)) > $1
            RETURNING *;
        "#,
    )
    .bind(claim_window.num_seconds())
    .fetch_all(conn)
    .await?;
    Ok(expired)
}
