use epg_common::Money;
use sqlx::SqliteConnection;

use crate::{
    db_types::{LedgerEntry, UserId, WalletBalance},
    epe_api::wallet_objects::Pagination,
    traits::{LedgerApiError, WalletGatewayError},
};

pub const DEFAULT_PAGE_SIZE: i64 = 50;

async fn current_balance(user_id: UserId, conn: &mut SqliteConnection) -> Result<Money, sqlx::Error> {
    let balance: Option<Money> = sqlx::query_scalar(r#"SELECT balance FROM wallet_balances WHERE user_id = ?"#)
        .bind(user_id)
        .fetch_optional(conn)
        .await?;
    Ok(balance.unwrap_or_default())
}

/// Folds a signed delta into the stored balance, creating the wallet row on first use.
async fn apply_to_balance(user_id: UserId, delta: Money, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
            INSERT INTO wallet_balances (user_id, balance) VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE
            SET balance = wallet_balances.balance + excluded.balance, updated_at = CURRENT_TIMESTAMP;
        "#,
    )
    .bind(user_id)
    .bind(delta)
    .execute(conn)
    .await?;
    Ok(())
}

/// Writes a credit entry and folds the amount into the stored balance.
///
/// The UNIQUE index on `ledger_entries.transaction_id` is the double-credit guard: a second
/// credit quoting the same deposit fails with [`LedgerApiError::AlreadyCredited`] before the
/// balance is touched. Callers must wrap this in a transaction so the entry and the balance move
/// together.
pub async fn credit(
    user_id: UserId,
    amount: Money,
    transaction_id: Option<i64>,
    reason: Option<String>,
    conn: &mut SqliteConnection,
) -> Result<LedgerEntry, LedgerApiError> {
    let balance_after = current_balance(user_id, &mut *conn).await? + amount;
    let entry = sqlx::query_as(
        r#"
            INSERT INTO ledger_entries (user_id, transaction_id, entry_type, amount, balance_after, reason)
            VALUES ($1, $2, 'Credit', $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(user_id)
    .bind(transaction_id)
    .bind(amount)
    .bind(balance_after)
    .bind(reason)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => {
            LedgerApiError::AlreadyCredited(transaction_id.unwrap_or_default())
        },
        _ => LedgerApiError::from(e),
    })?;
    apply_to_balance(user_id, amount, conn).await?;
    Ok(entry)
}

/// Debits the wallet after an inline funds check.
///
/// Debit entries are stored with negative amounts, which keeps the sum of a user's entries equal
/// to their balance. Must run inside the caller's transaction for the same reason as [`credit`].
pub async fn debit(
    user_id: UserId,
    amount: Money,
    reason: Option<String>,
    conn: &mut SqliteConnection,
) -> Result<LedgerEntry, WalletGatewayError> {
    let available = current_balance(user_id, &mut *conn).await?;
    if available < amount {
        return Err(WalletGatewayError::InsufficientBalance { available, required: amount });
    }
    let entry = sqlx::query_as(
        r#"
            INSERT INTO ledger_entries (user_id, entry_type, amount, balance_after, reason)
            VALUES ($1, 'Debit', $2, $3, $4)
            RETURNING *;
        "#,
    )
    .bind(user_id)
    .bind(-amount)
    .bind(available - amount)
    .bind(reason)
    .fetch_one(&mut *conn)
    .await?;
    apply_to_balance(user_id, -amount, conn).await?;
    Ok(entry)
}

pub async fn fetch_balance(user_id: UserId, conn: &mut SqliteConnection) -> Result<Option<WalletBalance>, sqlx::Error> {
    sqlx::query_as(r#"SELECT * FROM wallet_balances WHERE user_id = ?"#).bind(user_id).fetch_optional(conn).await
}

/// The user's ledger entries, newest first.
pub async fn history(
    user_id: UserId,
    pagination: &Pagination,
    conn: &mut SqliteConnection,
) -> Result<Vec<LedgerEntry>, sqlx::Error> {
    sqlx::query_as(r#"SELECT * FROM ledger_entries WHERE user_id = $1 ORDER BY id DESC LIMIT $2 OFFSET $3"#)
        .bind(user_id)
        .bind(pagination.count.unwrap_or(DEFAULT_PAGE_SIZE))
        .bind(pagination.offset.unwrap_or(0))
        .fetch_all(conn)
        .await
}
