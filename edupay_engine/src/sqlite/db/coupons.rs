use sqlx::SqliteConnection;

use crate::{
    db_types::{Coupon, NewCoupon},
    traits::CouponError,
};

pub async fn insert_coupon(coupon: NewCoupon, conn: &mut SqliteConnection) -> Result<Coupon, CouponError> {
    let code = coupon.code.clone();
    let coupon = sqlx::query_as(
        r#"
            INSERT INTO coupons (code, percentage, max_usage, expires_at, target, target_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(coupon.code)
    .bind(coupon.percentage)
    .bind(coupon.max_usage)
    .bind(coupon.expires_at)
    .bind(coupon.target)
    .bind(coupon.target_id)
    .fetch_one(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => CouponError::AlreadyExists(code),
        _ => CouponError::from(e),
    })?;
    Ok(coupon)
}

pub async fn fetch_coupon(code: &str, conn: &mut SqliteConnection) -> Result<Option<Coupon>, sqlx::Error> {
    sqlx::query_as(r#"SELECT * FROM coupons WHERE code = ?"#).bind(code).fetch_optional(conn).await
}

/// Takes one usage slot on the coupon.
///
/// The cap check and the bump happen in a single guarded UPDATE, so concurrent redemptions can
/// never push `used_count` past `max_usage`. Returns false when no slot was available, which the
/// caller reports as the coupon being exhausted.
pub async fn take_usage_slot(code: &str, conn: &mut SqliteConnection) -> Result<bool, CouponError> {
    let result = sqlx::query(
        r#"
            UPDATE coupons SET used_count = used_count + 1
            WHERE code = $1 AND (max_usage IS NULL OR used_count < max_usage);
        "#,
    )
    .bind(code)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}
