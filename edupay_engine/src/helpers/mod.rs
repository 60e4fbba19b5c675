mod code_extractor;
mod qr;

use rand::{distributions::Alphanumeric, thread_rng, Rng};

pub use code_extractor::extract_settlement_code;
pub use qr::{render_qr_payload, BankDetails, DEFAULT_QR_TEMPLATE};

use crate::db_types::SettlementCode;

pub const SETTLEMENT_CODE_PREFIX: &str = "DEP";
pub const SETTLEMENT_CODE_SUFFIX_LEN: usize = 10;

/// Generates a fresh settlement code, `DEP` plus 10 random characters.
///
/// The suffix is restricted to uppercase alphanumerics because bank rails fold memo text to
/// uppercase before it reaches us. Uniqueness is enforced by the database, not here.
pub fn new_settlement_code() -> SettlementCode {
    let mut rng = thread_rng();
    let suffix = (&mut rng)
        .sample_iter(Alphanumeric)
        .take(SETTLEMENT_CODE_SUFFIX_LEN)
        .map(|c| (c as char).to_ascii_uppercase())
        .collect::<String>();
    SettlementCode::new(format!("{SETTLEMENT_CODE_PREFIX}{suffix}"))
}
