use actix_web::{http::StatusCode, web, web::ServiceConfig};
use chrono::{TimeZone, Utc};
use edupay_engine::{
    db_types::{EntryType, LedgerEntry, UserId, WalletBalance},
    LedgerApi,
};
use epg_common::Money;

use super::{
    helpers::{get_request, valid_token},
    mocks::MockWalletDb,
};
use crate::{
    auth::Role,
    routes::{MyBalanceRoute, MyHistoryRoute},
};

fn balance_row(user_id: UserId) -> WalletBalance {
    WalletBalance {
        user_id,
        balance: Money::from(350_000),
        updated_at: Utc.with_ymd_and_hms(2025, 8, 3, 9, 30, 0).unwrap(),
    }
}

// Mock response to `fetch_ledger_entries`, newest first
fn entries_response(user_id: UserId) -> Vec<LedgerEntry> {
    vec![
        LedgerEntry {
            id: 2,
            user_id,
            transaction_id: None,
            entry_type: EntryType::Debit,
            amount: Money::from(-150_000),
            balance_after: Money::from(350_000),
            reason: Some("Purchased course rust-101".to_string()),
            created_at: Utc.with_ymd_and_hms(2025, 8, 3, 9, 30, 0).unwrap(),
        },
        LedgerEntry {
            id: 1,
            user_id,
            transaction_id: Some(7),
            entry_type: EntryType::Credit,
            amount: Money::from(500_000),
            balance_after: Money::from(500_000),
            reason: Some("Deposit DEP4F7K2M9QX1".to_string()),
            created_at: Utc.with_ymd_and_hms(2025, 8, 1, 12, 0, 0).unwrap(),
        },
    ]
}

fn configure(cfg: &mut ServiceConfig) {
    let mut db = MockWalletDb::new();
    db.expect_fetch_wallet_balance().returning(|user_id| Ok(balance_row(user_id)));
    db.expect_fetch_ledger_entries().returning(|user_id, _| Ok(entries_response(user_id)));
    let api = LedgerApi::new(db);
    cfg.app_data(web::Data::new(api))
        .service(MyBalanceRoute::<MockWalletDb>::new())
        .service(MyHistoryRoute::<MockWalletDb>::new());
}

#[actix_web::test]
async fn my_balance_returns_the_wallet_row() {
    let _ = env_logger::try_init().ok();
    let token = valid_token(42, vec![Role::User]);
    let (status, body) = get_request(&token, "/balance", configure).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"user_id":42,"balance":350000,"updated_at":"2025-08-03T09:30:00Z"}"#);
}

#[actix_web::test]
async fn history_combines_balance_and_entries() {
    let _ = env_logger::try_init().ok();
    let token = valid_token(42, vec![Role::User]);
    let (status, body) = get_request(&token, "/history", configure).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, HISTORY_JSON);
}

#[actix_web::test]
async fn history_only_ever_covers_the_token_holder() {
    let _ = env_logger::try_init().ok();
    // The user id comes from the token, not the query string
    let token = valid_token(51, vec![Role::User]);
    let (status, body) = get_request(&token, "/history?user_id=42", configure).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    assert!(body.starts_with(r#"{"user_id":51"#), "was: {body}");
}

#[actix_web::test]
async fn pagination_is_forwarded_to_the_ledger() {
    let _ = env_logger::try_init().ok();
    let token = valid_token(42, vec![Role::User]);
    let configure: fn(&mut ServiceConfig) = |cfg| {
        let mut db = MockWalletDb::new();
        db.expect_fetch_wallet_balance().returning(|user_id| Ok(balance_row(user_id)));
        db.expect_fetch_ledger_entries()
            .withf(|_, p| p.offset == Some(1) && p.count == Some(1))
            .returning(|user_id, _| Ok(entries_response(user_id).split_off(1)));
        let api = LedgerApi::new(db);
        cfg.app_data(web::Data::new(api)).service(MyHistoryRoute::<MockWalletDb>::new());
    };
    let (status, body) = get_request(&token, "/history?offset=1&count=1", configure).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK, "was: {body}");
    assert!(body.contains(r#""id":1"#) && !body.contains(r#""id":2"#), "was: {body}");
}

const HISTORY_JSON: &str = r#"{"user_id":42,"balance":350000,"entries":[{"id":2,"user_id":42,"transaction_id":null,"entry_type":"Debit","amount":-150000,"balance_after":350000,"reason":"Purchased course rust-101","created_at":"2025-08-03T09:30:00Z"},{"id":1,"user_id":42,"transaction_id":7,"entry_type":"Credit","amount":500000,"balance_after":500000,"reason":"Deposit DEP4F7K2M9QX1","created_at":"2025-08-01T12:00:00Z"}]}"#;
