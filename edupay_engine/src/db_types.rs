//! Row types and input records shared by the database layer and the public APIs.

use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use chrono::{DateTime, Duration, Utc};
use epg_common::Money;
use log::error;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

/// Marketplace user ids are issued by the identity service and are opaque to this crate.
pub type UserId = i64;

#[derive(Debug, Clone, Error)]
#[error("Cannot convert '{0}' into a {1}")]
pub struct ConversionError(String, &'static str);

//--------------------------------------     DepositStatus      ---------------------------------------------------

/// The lifecycle state of a wallet top-up.
///
/// A deposit starts out `Pending` and moves to exactly one of the closed states. Closed deposits
/// never change state again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
pub enum DepositStatus {
    /// Waiting for the bank to report a matching transfer.
    Pending,
    /// A transfer matched and the wallet has been credited.
    Confirmed,
    /// The claim window lapsed without a matching transfer.
    Expired,
    /// Too many mismatched transfer reports were seen for this deposit.
    Failed,
}

impl DepositStatus {
    pub fn is_closed(&self) -> bool {
        !matches!(self, DepositStatus::Pending)
    }
}

impl Display for DepositStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DepositStatus::Pending => write!(f, "Pending"),
            DepositStatus::Confirmed => write!(f, "Confirmed"),
            DepositStatus::Expired => write!(f, "Expired"),
            DepositStatus::Failed => write!(f, "Failed"),
        }
    }
}

impl FromStr for DepositStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Confirmed" => Ok(Self::Confirmed),
            "Expired" => Ok(Self::Expired),
            "Failed" => Ok(Self::Failed),
            s => Err(ConversionError(s.to_string(), "DepositStatus")),
        }
    }
}

impl From<String> for DepositStatus {
    fn from(s: String) -> Self {
        s.parse().unwrap_or_else(|e| {
            error!("We did not expect this conversion to fail: {e}. Defaulting to Pending");
            Self::Pending
        })
    }
}

//--------------------------------------    SettlementCode      ---------------------------------------------------

/// The opaque claim token a payer must quote in the transfer memo.
///
/// Codes are uppercase because bank rails routinely fold memo text to uppercase in transit.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Type)]
#[sqlx(transparent)]
pub struct SettlementCode(String);

impl SettlementCode {
    pub fn new(code: String) -> Self {
        Self(code)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<String> for SettlementCode {
    fn from(code: String) -> Self {
        Self(code)
    }
}

impl From<&str> for SettlementCode {
    fn from(code: &str) -> Self {
        Self(code.to_string())
    }
}

impl Display for SettlementCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//--------------------------------------   DepositTransaction   ---------------------------------------------------

/// A single wallet top-up record.
///
/// `amount`, `settlement_code` and `user_id` are immutable once the row is written. Only `status`,
/// `mismatch_count`, `external_ref` and the bookkeeping timestamps change afterwards.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct DepositTransaction {
    pub id: i64,
    pub user_id: UserId,
    pub amount: Money,
    pub settlement_code: SettlementCode,
    pub status: DepositStatus,
    /// Number of transfer reports that quoted this code with the wrong amount.
    pub mismatch_count: i64,
    /// The bank's own reference for the transfer that settled this deposit.
    pub external_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl DepositTransaction {
    pub fn is_pending(&self) -> bool {
        self.status == DepositStatus::Pending
    }

    pub fn expires_at(&self, claim_window: Duration) -> DateTime<Utc> {
        self.created_at + claim_window
    }
}

impl Display for DepositTransaction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Deposit #{} ({}): {} for user {} [{}]",
            self.id, self.settlement_code, self.amount, self.user_id, self.status
        )
    }
}

/// Input record for opening a new deposit. The settlement code is generated server-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDeposit {
    pub user_id: UserId,
    pub amount: Money,
}

impl NewDeposit {
    pub fn new(user_id: UserId, amount: Money) -> Self {
        Self { user_id, amount }
    }
}

//--------------------------------------    SettlementEvent     ---------------------------------------------------

/// A normalised inbound transfer report, after the webhook payload has been picked apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementEvent {
    pub settlement_code: SettlementCode,
    pub reported_amount: Money,
    /// The bank's unique reference for the transfer. Used to tell redeliveries from clashes.
    pub external_ref: String,
}

impl SettlementEvent {
    pub fn new<S: Into<SettlementCode>>(code: S, reported_amount: Money, external_ref: String) -> Self {
        Self { settlement_code: code.into(), reported_amount, external_ref }
    }
}

//--------------------------------------       LedgerEntry      ---------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
pub enum EntryType {
    Credit,
    Debit,
}

impl Display for EntryType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryType::Credit => write!(f, "Credit"),
            EntryType::Debit => write!(f, "Debit"),
        }
    }
}

impl FromStr for EntryType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Credit" => Ok(Self::Credit),
            "Debit" => Ok(Self::Debit),
            s => Err(ConversionError(s.to_string(), "EntryType")),
        }
    }
}

/// One immutable line in a user's wallet history.
///
/// `amount` is signed: credits are positive and debits negative, so the sum of a user's entries
/// always equals their balance. `balance_after` is the balance the moment this entry landed.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub user_id: UserId,
    /// Set for deposit credits. At most one entry may reference a given deposit.
    pub transaction_id: Option<i64>,
    pub entry_type: EntryType,
    pub amount: Money,
    pub balance_after: Money,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct WalletBalance {
    pub user_id: UserId,
    pub balance: Money,
    pub updated_at: DateTime<Utc>,
}

impl WalletBalance {
    /// Users without any wallet activity have an implicit zero balance.
    pub fn empty(user_id: UserId) -> Self {
        Self { user_id, balance: Money::from(0), updated_at: Utc::now() }
    }
}

//--------------------------------------        Coupons         ---------------------------------------------------

/// What a coupon may be applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
pub enum CouponTarget {
    /// Any purchase on the marketplace.
    All,
    /// A single course, identified by `target_id`.
    Course,
    /// Any course belonging to the specialization in `target_id`.
    Specialization,
}

impl Display for CouponTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CouponTarget::All => write!(f, "All"),
            CouponTarget::Course => write!(f, "Course"),
            CouponTarget::Specialization => write!(f, "Specialization"),
        }
    }
}

impl FromStr for CouponTarget {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "All" => Ok(Self::All),
            "Course" => Ok(Self::Course),
            "Specialization" => Ok(Self::Specialization),
            s => Err(ConversionError(s.to_string(), "CouponTarget")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Coupon {
    pub id: i64,
    pub code: String,
    /// Whole-number discount percentage, 0..=100.
    pub percentage: i64,
    /// `None` means unlimited redemptions.
    pub max_usage: Option<i64>,
    pub used_count: i64,
    pub expires_at: DateTime<Utc>,
    pub target: CouponTarget,
    pub target_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Coupon {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Does this coupon cover the given purchase?
    pub fn applies_to(&self, purchase: &CoursePurchase) -> bool {
        match self.target {
            CouponTarget::All => true,
            CouponTarget::Course => self.target_id.as_deref() == Some(purchase.course_id.as_str()),
            CouponTarget::Specialization => {
                self.target_id.is_some() && self.target_id.as_deref() == purchase.specialization_id.as_deref()
            },
        }
    }

    /// The discount this coupon takes off `base`. Fractional amounts round down.
    pub fn discount_on(&self, base: Money) -> Money {
        base.percentage(self.percentage)
    }
}

/// Input record for registering a coupon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCoupon {
    pub code: String,
    pub percentage: i64,
    pub max_usage: Option<i64>,
    pub expires_at: DateTime<Utc>,
    pub target: CouponTarget,
    pub target_id: Option<String>,
}

impl NewCoupon {
    pub fn new<S: Into<String>>(code: S, percentage: i64, expires_at: DateTime<Utc>) -> Self {
        Self { code: code.into(), percentage, max_usage: None, expires_at, target: CouponTarget::All, target_id: None }
    }

    pub fn with_cap(mut self, max_usage: i64) -> Self {
        self.max_usage = Some(max_usage);
        self
    }

    pub fn for_course<S: Into<String>>(mut self, course_id: S) -> Self {
        self.target = CouponTarget::Course;
        self.target_id = Some(course_id.into());
        self
    }

    pub fn for_specialization<S: Into<String>>(mut self, specialization_id: S) -> Self {
        self.target = CouponTarget::Specialization;
        self.target_id = Some(specialization_id.into());
        self
    }
}

//--------------------------------------    CoursePurchase      ---------------------------------------------------

/// A request to pay for course access out of the wallet balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoursePurchase {
    pub course_id: String,
    pub specialization_id: Option<String>,
    /// The list price, before any coupon is applied.
    pub amount: Money,
    pub coupon_code: Option<String>,
}

impl CoursePurchase {
    pub fn new<S: Into<String>>(course_id: S, amount: Money) -> Self {
        Self { course_id: course_id.into(), specialization_id: None, amount, coupon_code: None }
    }

    pub fn with_specialization<S: Into<String>>(mut self, specialization_id: S) -> Self {
        self.specialization_id = Some(specialization_id.into());
        self
    }

    pub fn with_coupon<S: Into<String>>(mut self, code: S) -> Self {
        self.coupon_code = Some(code.into());
        self
    }
}
