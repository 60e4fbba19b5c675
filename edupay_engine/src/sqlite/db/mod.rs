//! # Low-level SQLite queries
//!
//! Every query in this module is a plain function taking a `&mut SqliteConnection`. Callers
//! decide the transaction scope: grab a single connection from the pool for one-shot reads, or
//! open a transaction and thread it through several calls when the work must land atomically.
use std::env;

use log::info;
use sqlx::{sqlite::SqlitePoolOptions, Error as SqlxError, SqlitePool};

pub mod coupons;
pub mod deposits;
pub mod ledger;

const SQLITE_DB_URL: &str = "sqlite://data/edupay_wallet.db";

pub fn db_url() -> String {
    let result = env::var("EPG_DATABASE_URL").unwrap_or_else(|_| {
        info!("EPG_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect(url).await?;
    Ok(pool)
}
