use actix_web::{http::StatusCode, web, web::ServiceConfig};
use chrono::{TimeZone, Utc};
use edupay_engine::{
    db_types::{DepositStatus, DepositTransaction, SettlementCode, UserId},
    events::EventProducers,
    DepositFlowApi,
    LedgerApi,
};
use epg_common::Money;

use super::{
    helpers::{get_request, post_request, valid_token},
    mocks::MockWalletDb,
};
use crate::{
    auth::Role,
    config::{BankConfig, ServerOptions},
    routes::{CreateDepositRoute, DepositStatusRoute},
};

fn pending_deposit(user_id: UserId) -> DepositTransaction {
    DepositTransaction {
        id: 7,
        user_id,
        amount: Money::from(250_000),
        settlement_code: SettlementCode::from("DEP4F7K2M9QX1"),
        status: DepositStatus::Pending,
        mismatch_count: 0,
        external_ref: None,
        created_at: Utc.with_ymd_and_hms(2025, 8, 1, 12, 0, 0).unwrap(),
        updated_at: Utc.with_ymd_and_hms(2025, 8, 1, 12, 0, 0).unwrap(),
        confirmed_at: None,
    }
}

fn test_options() -> ServerOptions {
    ServerOptions {
        use_x_forwarded_for: false,
        use_forwarded: false,
        mismatch_threshold: 3,
        claim_window: chrono::Duration::hours(24),
    }
}

fn test_bank() -> BankConfig {
    BankConfig {
        bank_code: "970422".into(),
        account_number: "0123456789".into(),
        account_name: "EDUMARKET".into(),
        qr_template: "pay://{bank_code}/{account_number}?amount={amount}&memo={memo}".into(),
    }
}

fn configure_create(cfg: &mut ServiceConfig) {
    let mut db = MockWalletDb::new();
    db.expect_create_deposit().returning(|deposit| {
        let mut tx = pending_deposit(deposit.user_id);
        tx.amount = deposit.amount;
        Ok(tx)
    });
    let api = DepositFlowApi::new(db, EventProducers::default());
    cfg.app_data(web::Data::new(api))
        .app_data(web::Data::new(test_options()))
        .app_data(web::Data::new(test_bank()))
        .service(CreateDepositRoute::<MockWalletDb>::new());
}

#[actix_web::test]
async fn opening_a_deposit_returns_the_invoice() {
    let _ = env_logger::try_init().ok();
    let token = valid_token(42, vec![Role::User]);
    let (status, body) =
        post_request(&token, "/deposit", r#"{"amount":250000}"#, configure_create).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK, "was: {body}");
    assert_eq!(body, INVOICE_JSON);
}

#[actix_web::test]
async fn deposits_require_the_user_role() {
    let _ = env_logger::try_init().ok();
    // An admin-only token cannot open deposits for itself
    let token = valid_token(42, vec![Role::Admin]);
    let err = post_request(&token, "/deposit", r#"{"amount":250000}"#, configure_create)
        .await
        .expect_err("Expected an ACL error");
    assert_eq!(err, "Insufficient permissions");
}

fn configure_status(cfg: &mut ServiceConfig) {
    let mut db = MockWalletDb::new();
    db.expect_fetch_deposit().returning(|id| if id == 7 { Ok(Some(pending_deposit(42))) } else { Ok(None) });
    let api = LedgerApi::new(db);
    cfg.app_data(web::Data::new(api)).service(DepositStatusRoute::<MockWalletDb>::new());
}

#[actix_web::test]
async fn users_see_their_own_deposits() {
    let _ = env_logger::try_init().ok();
    let token = valid_token(42, vec![Role::User]);
    let (status, body) = get_request(&token, "/deposit/7", configure_status).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, DEPOSIT_JSON);
}

#[actix_web::test]
async fn other_peoples_deposits_read_as_missing() {
    let _ = env_logger::try_init().ok();
    let token = valid_token(99, vec![Role::User]);
    let (status, body) = get_request(&token, "/deposit/7", configure_status).await.expect("Request failed");
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, r#"{"error":"The data was not found. Deposit 7"}"#);
}

#[actix_web::test]
async fn admins_see_all_deposits() {
    let _ = env_logger::try_init().ok();
    let token = valid_token(99, vec![Role::User, Role::Admin]);
    let (status, body) = get_request(&token, "/deposit/7", configure_status).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, DEPOSIT_JSON);
}

#[actix_web::test]
async fn missing_deposits_are_a_404() {
    let _ = env_logger::try_init().ok();
    let token = valid_token(42, vec![Role::User]);
    let (status, body) = get_request(&token, "/deposit/8", configure_status).await.expect("Request failed");
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, r#"{"error":"The data was not found. Deposit 8"}"#);
}

const DEPOSIT_JSON: &str = r#"{"id":7,"user_id":42,"amount":250000,"settlement_code":"DEP4F7K2M9QX1","status":"Pending","mismatch_count":0,"external_ref":null,"created_at":"2025-08-01T12:00:00Z","updated_at":"2025-08-01T12:00:00Z","confirmed_at":null}"#;

const INVOICE_JSON: &str = r#"{"transaction":{"id":7,"user_id":42,"amount":250000,"settlement_code":"DEP4F7K2M9QX1","status":"Pending","mismatch_count":0,"external_ref":null,"created_at":"2025-08-01T12:00:00Z","updated_at":"2025-08-01T12:00:00Z","confirmed_at":null},"bank":{"bank_code":"970422","account_number":"0123456789","account_name":"EDUMARKET"},"memo":"[DEP4F7K2M9QX1]","qr_payload":"pay://970422/0123456789?amount=250000&memo=%5BDEP4F7K2M9QX1%5D","expires_at":"2025-08-02T12:00:00Z"}"#;
