//! # Wallet gateway public API
//!
//! The `epe_api` module is the programmatic surface of the wallet engine. It is deliberately
//! modular so that callers can take only what they need:
//!
//! * [`deposit_flow_api`] drives the money paths: opening deposits, running inbound settlement
//!   events through the matching contract, wallet purchases and the expiry sweep.
//! * [`ledger_api`] is read-only access to balances, ledger history and deposit lookups.
//! * [`coupon_api`] registers and inspects discount coupons.
//!
//! Every API follows the same pattern: construct it with a database backend that implements the
//! trait the API needs, then call methods on it.
//!
//! ```rust,ignore
//! use edupay_engine::{LedgerApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url(...).await?;
//! // SqliteDatabase implements LedgerManagement
//! let api = LedgerApi::new(db);
//! let balance = api.balance(user_id).await?;
//! ```

pub mod coupon_api;
pub mod deposit_flow_api;
pub mod ledger_api;
pub mod wallet_objects;
