mod auth;
mod coupons;
mod deposits;
mod helpers;
mod ledger;
pub mod mocks;
mod purchases;
mod webhook;
