//! SQLite backend for the wallet gateway.
mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteDatabase;
