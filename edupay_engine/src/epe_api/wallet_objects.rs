use epg_common::Money;
use serde::{Deserialize, Serialize};

use crate::db_types::{LedgerEntry, UserId};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Pagination {
    pub offset: Option<i64>,
    pub count: Option<i64>,
}

impl Pagination {
    pub fn page(offset: i64, count: i64) -> Self {
        Self { offset: Some(offset), count: Some(count) }
    }
}

/// A page of a user's wallet history together with the balance it adds up to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerHistory {
    pub user_id: UserId,
    pub balance: Money,
    pub entries: Vec<LedgerEntry>,
}
