use crate::db_types::SettlementCode;

/// Pulls a settlement code out of a free-form transfer memo.
///
/// Banks mangle memo text in transit: brackets get stripped, extra words get prepended, and the
/// whole string may be re-cased. So rather than requiring the exact `[DEP…]` template we asked the
/// payer to use, we case-fold the memo and take the first thing that looks like a code. Returns
/// `None` if nothing matches.
pub fn extract_settlement_code(memo: &str) -> Option<SettlementCode> {
    let pattern = regex::Regex::new(r"DEP[0-9A-Z]{10}").unwrap();
    let folded = memo.to_ascii_uppercase();
    pattern.find(&folded).map(|m| SettlementCode::from(m.as_str()))
}
