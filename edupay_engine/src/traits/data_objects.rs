use std::fmt::{Display, Formatter};

use epg_common::Money;
use serde::{Deserialize, Serialize};

use crate::db_types::{DepositStatus, DepositTransaction, LedgerEntry};

/// What happened when a settlement event was run against the matching contract.
///
/// Every inbound event resolves to exactly one of these. Only `Credited` moves money; the others
/// exist so that redeliveries and junk stay observable without being retried forever.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SettlementOutcome {
    /// The event matched a pending deposit. The deposit is now confirmed and the wallet credited.
    Credited { transaction: DepositTransaction, new_balance: Money },
    /// The deposit was already confirmed by an earlier delivery of the same transfer.
    AlreadyConfirmed { transaction: DepositTransaction },
    /// The amount did not match. The strike was recorded but the deposit stays pending.
    MismatchRecorded { transaction: DepositTransaction, attempts: i64 },
    /// The mismatch strike limit was reached and the deposit has been closed as failed.
    MarkedFailed { transaction: DepositTransaction },
    /// The event could not be tied to any claimable deposit and was dropped.
    Discarded { reason: DiscardReason },
}

impl SettlementOutcome {
    pub fn transaction(&self) -> Option<&DepositTransaction> {
        match self {
            Self::Credited { transaction, .. } |
            Self::AlreadyConfirmed { transaction } |
            Self::MismatchRecorded { transaction, .. } |
            Self::MarkedFailed { transaction } => Some(transaction),
            Self::Discarded { .. } => None,
        }
    }

    pub fn is_credited(&self) -> bool {
        matches!(self, Self::Credited { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiscardReason {
    /// No deposit carries the quoted settlement code.
    UnknownCode,
    /// The deposit is confirmed, but against a different bank reference. Likely a memo clash.
    ForeignRef,
    /// The deposit was already closed (expired or failed) when the event arrived.
    Closed(DepositStatus),
}

impl Display for DiscardReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscardReason::UnknownCode => write!(f, "no deposit matches the settlement code"),
            DiscardReason::ForeignRef => write!(f, "the deposit was settled by a different transfer"),
            DiscardReason::Closed(status) => write!(f, "the deposit is already {status}"),
        }
    }
}

/// The result of a successful wallet purchase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseReceipt {
    pub course_id: String,
    pub base_amount: Money,
    pub discount: Money,
    pub final_amount: Money,
    pub new_balance: Money,
    pub coupon_code: Option<String>,
    pub entry: LedgerEntry,
}
