use std::fmt::Display;

use chrono::{DateTime, Utc};
use edupay_engine::{
    db_types::{CoursePurchase, DepositTransaction, NewCoupon, SettlementEvent, UserId},
    helpers::{extract_settlement_code, BankDetails},
};
use epg_common::Money;
use serde::{Deserialize, Serialize};

use crate::auth::Roles;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

/// Token mint request from the storefront. Only accepted together with a valid `x-api-key` header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRequest {
    pub user_id: UserId,
    #[serde(default)]
    pub roles: Roles,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositRequest {
    pub amount: Money,
}

/// Everything the payer needs to complete a transfer: the open deposit record, the receiving
/// account, the memo to quote, and a rendered QR payload for scan-to-pay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositInvoice {
    pub transaction: DepositTransaction,
    pub bank: BankDetails,
    pub memo: String,
    pub qr_payload: String,
    pub expires_at: DateTime<Utc>,
}

/// A settlement notification as the bank gateway sends it. Field names follow the gateway's
/// camelCase convention; fields we do not use are ignored on deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankWebhookEvent {
    /// The bank's own reference for the transfer. Stable across redeliveries.
    pub reference_code: String,
    /// Free-text transfer memo, hopefully carrying a settlement code.
    #[serde(default)]
    pub content: String,
    /// "in" for money arriving in our account. Everything else is ignored.
    #[serde(default)]
    pub transfer_type: String,
    pub transfer_amount: i64,
}

impl BankWebhookEvent {
    /// Reduces the raw notification to a [`SettlementEvent`], or `None` when it cannot concern a
    /// deposit here: outgoing transfers, and memos with no recognisable settlement code.
    pub fn normalize(&self) -> Option<SettlementEvent> {
        if self.transfer_type != "in" {
            return None;
        }
        let code = extract_settlement_code(&self.content)?;
        Some(SettlementEvent::new(code, Money::from(self.transfer_amount), self.reference_code.clone()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseRequest {
    pub course_id: String,
    pub amount: Money,
    #[serde(default)]
    pub specialization_id: Option<String>,
    #[serde(default)]
    pub coupon_code: Option<String>,
}

impl PurchaseRequest {
    pub fn to_purchase(&self) -> CoursePurchase {
        let mut purchase = CoursePurchase::new(self.course_id.clone(), self.amount);
        if let Some(specialization_id) = &self.specialization_id {
            purchase = purchase.with_specialization(specialization_id.clone());
        }
        if let Some(code) = &self.coupon_code {
            purchase = purchase.with_coupon(code.clone());
        }
        purchase
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouponRequest {
    pub code: String,
    pub percentage: i64,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub max_usage: Option<i64>,
    #[serde(default)]
    pub course_id: Option<String>,
    #[serde(default)]
    pub specialization_id: Option<String>,
}

impl CouponRequest {
    pub fn to_new_coupon(&self) -> NewCoupon {
        let mut coupon = NewCoupon::new(self.code.clone(), self.percentage, self.expires_at);
        if let Some(cap) = self.max_usage {
            coupon = coupon.with_cap(cap);
        }
        if let Some(course_id) = &self.course_id {
            coupon = coupon.for_course(course_id.clone());
        }
        if let Some(specialization_id) = &self.specialization_id {
            coupon = coupon.for_specialization(specialization_id.clone());
        }
        coupon
    }
}
