//! EduPay Wallet Engine
//!
//! The wallet engine is the settlement core of the course marketplace: it turns asynchronous bank
//! transfer reports into wallet credits, and wallet credits into course enrollments. This library
//! is storage- and transport-agnostic; the HTTP surface lives in the companion server crate.
//!
//! The library is divided into two main sections:
//! 1. Database management and control ([`mod@sqlite`]). SQLite is currently the only supported
//!    backend. You should never need to issue queries directly. Instead, use the public API. The
//!    exception is the data types stored in the database, which are defined in [`mod@db_types`]
//!    and are public.
//! 2. The engine public API ([`mod@epe_api`]). This carries the deposit, ledger and coupon flows.
//!    A backend acts as storage for the engine by implementing the traits in [`mod@traits`].
//!
//! The engine also emits events when money moves: a hook fires when a payment is confirmed and
//! when a pending deposit is closed unpaid. A small actor scheme in [`mod@events`] lets callers
//! subscribe async handlers to these, which is how the server pushes realtime notifications.
pub mod db_types;
mod epe_api;
pub mod events;
pub mod helpers;
#[cfg(feature = "sqlite")]
mod sqlite;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use epe_api::{
    coupon_api::CouponApi,
    deposit_flow_api::DepositFlowApi,
    ledger_api::LedgerApi,
    wallet_objects,
};
pub use traits::{
    CouponError,
    CouponManagement,
    DiscardReason,
    LedgerApiError,
    LedgerManagement,
    PurchaseReceipt,
    SettlementOutcome,
    WalletGatewayDatabase,
    WalletGatewayError,
};
