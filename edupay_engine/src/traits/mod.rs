//! The database-agnostic contracts that storage backends implement.
//!
//! * [`WalletGatewayDatabase`] is the write side: deposits, settlement, purchases and expiry.
//! * [`LedgerManagement`] is the read side: balances, history and deposit lookups.
//! * [`CouponManagement`] covers coupon registration and lookup.
//!
//! The server's endpoint handlers are generic over these traits, so they can be exercised against
//! mocks without a live database.

mod coupon_management;
mod data_objects;
mod ledger_management;
mod wallet_gateway_database;

pub use coupon_management::{CouponError, CouponManagement};
pub use data_objects::{DiscardReason, PurchaseReceipt, SettlementOutcome};
pub use ledger_management::{LedgerApiError, LedgerManagement};
pub use wallet_gateway_database::{WalletGatewayDatabase, WalletGatewayError};
