use log::*;

use crate::{
    db_types::{Coupon, NewCoupon},
    traits::{CouponError, CouponManagement},
};

/// Registration and inspection of discount coupons.
///
/// Redemption is *not* here: a coupon is only ever consumed inside a wallet purchase, where the
/// usage bump and the debit commit together.
#[derive(Debug, Clone)]
pub struct CouponApi<B> {
    db: B,
}

impl<B> CouponApi<B>
where B: CouponManagement
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    pub async fn create_coupon(&self, coupon: NewCoupon) -> Result<Coupon, CouponError> {
        let coupon = self.db.create_coupon(coupon).await?;
        info!("🎟️ Coupon {} registered: {}% off, cap {:?}", coupon.code, coupon.percentage, coupon.max_usage);
        Ok(coupon)
    }

    pub async fn coupon_by_code(&self, code: &str) -> Result<Option<Coupon>, CouponError> {
        self.db.fetch_coupon(code).await
    }
}
