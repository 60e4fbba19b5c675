use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db_types::{Coupon, NewCoupon};

#[derive(Debug, Clone, Error)]
pub enum CouponError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Coupon '{0}' already exists")]
    AlreadyExists(String),
    #[error("Coupon '{0}' does not exist")]
    NotFound(String),
    #[error("Coupon '{0}' expired at {1}")]
    Expired(String, DateTime<Utc>),
    #[error("Coupon expiry {0} is in the past")]
    InvalidExpiry(DateTime<Utc>),
    #[error("Coupon '{0}' does not apply to this purchase")]
    ScopeMismatch(String),
    #[error("Coupon '{0}' has reached its usage cap")]
    Exhausted(String),
    #[error("Coupon percentages must lie between 0 and 100. Got {0}.")]
    InvalidPercentage(i64),
}

impl From<sqlx::Error> for CouponError {
    fn from(e: sqlx::Error) -> Self {
        Self::DatabaseError(e.to_string())
    }
}

#[allow(async_fn_in_trait)]
pub trait CouponManagement {
    /// Registers a new coupon. The code must not already exist.
    async fn create_coupon(&self, coupon: NewCoupon) -> Result<Coupon, CouponError>;

    /// Looks a coupon up by its code, including its current usage count.
    async fn fetch_coupon(&self, code: &str) -> Result<Option<Coupon>, CouponError>;
}
