use epg_common::Money;
use serde::{Deserialize, Serialize};

use crate::db_types::SettlementCode;

/// VietQR quick-link format. Scanning the rendered image pre-fills the transfer form, including
/// the memo that carries the settlement code.
pub const DEFAULT_QR_TEMPLATE: &str =
    "https://img.vietqr.io/image/{bank_code}-{account_number}-compact2.png?amount={amount}&addInfo={memo}&accountName={account_name}";

/// The receiving account that payers should transfer into.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankDetails {
    pub bank_code: String,
    pub account_number: String,
    pub account_name: String,
}

impl BankDetails {
    pub fn new<S: Into<String>>(bank_code: S, account_number: S, account_name: S) -> Self {
        Self { bank_code: bank_code.into(), account_number: account_number.into(), account_name: account_name.into() }
    }
}

/// Expands a QR template into the final payload URL for one deposit.
///
/// Recognised placeholders: `{bank_code}`, `{account_number}`, `{account_name}`, `{amount}` and
/// `{memo}`. The memo is the bracketed settlement code. Free-text fields are percent-encoded;
/// `Money` renders as a bare integer here, not its display form.
pub fn render_qr_payload(template: &str, bank: &BankDetails, amount: Money, code: &SettlementCode) -> String {
    let memo = format!("[{code}]");
    template
        .replace("{bank_code}", &bank.bank_code)
        .replace("{account_number}", &bank.account_number)
        .replace("{account_name}", urlencoding::encode(&bank.account_name).as_ref())
        .replace("{amount}", &amount.value().to_string())
        .replace("{memo}", urlencoding::encode(&memo).as_ref())
}
