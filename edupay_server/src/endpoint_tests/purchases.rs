use actix_web::{
    body::MessageBody,
    http::{header::ContentType, StatusCode},
    test,
    test::TestRequest,
    web,
    web::ServiceConfig,
    App,
};
use chrono::{TimeZone, Utc};
use edupay_engine::{
    db_types::{EntryType, LedgerEntry},
    events::EventProducers,
    traits::{CouponError, PurchaseReceipt, WalletGatewayError},
    DepositFlowApi,
};
use epg_common::Money;

use super::{
    helpers::{get_auth_config, post_request, valid_token},
    mocks::MockWalletDb,
};
use crate::{
    auth::{Role, TokenIssuer},
    middleware::JwtAuthMiddlewareFactory,
    routes::PurchaseRoute,
};

fn receipt() -> PurchaseReceipt {
    PurchaseReceipt {
        course_id: "rust-101".to_string(),
        base_amount: Money::from(500_000),
        discount: Money::from(100_000),
        final_amount: Money::from(400_000),
        new_balance: Money::from(100_000),
        coupon_code: Some("LAUNCH20".to_string()),
        entry: LedgerEntry {
            id: 9,
            user_id: 42,
            transaction_id: None,
            entry_type: EntryType::Debit,
            amount: Money::from(-400_000),
            balance_after: Money::from(100_000),
            reason: Some("Purchased course rust-101".to_string()),
            created_at: Utc.with_ymd_and_hms(2025, 8, 3, 9, 30, 0).unwrap(),
        },
    }
}

fn configure_app(result: Result<PurchaseReceipt, WalletGatewayError>) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg| {
        let mut db = MockWalletDb::new();
        db.expect_purchase_with_wallet().return_once(move |_, _| result);
        let api = DepositFlowApi::new(db, EventProducers::default());
        cfg.app_data(web::Data::new(api)).service(PurchaseRoute::<MockWalletDb>::new());
    }
}

async fn post_purchase(
    token: &str,
    result: Result<PurchaseReceipt, WalletGatewayError>,
) -> Result<(StatusCode, String), String> {
    let _ = env_logger::try_init().ok();
    let body = r#"{"course_id":"rust-101","amount":500000,"coupon_code":"LAUNCH20"}"#;
    let req = TestRequest::post()
        .uri("/purchase")
        .insert_header(ContentType::json())
        .insert_header(("Authorization", format!("Bearer {token}")))
        .set_payload(body)
        .to_request();
    let issuer = TokenIssuer::new(&get_auth_config());
    let app = App::new().wrap(JwtAuthMiddlewareFactory::new(issuer)).configure(configure_app(result));
    let service = test::init_service(app).await;
    let (_, res) = test::try_call_service(&service, req).await.map_err(|e| e.to_string())?.into_parts();
    let status = res.status();
    let body = String::from_utf8_lossy(&res.into_body().try_into_bytes().unwrap()).into_owned();
    Ok((status, body))
}

#[actix_web::test]
async fn a_successful_purchase_returns_the_receipt() {
    let token = valid_token(42, vec![Role::User]);
    let (status, body) = post_purchase(&token, Ok(receipt())).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK, "was: {body}");
    assert_eq!(body, RECEIPT_JSON);
}

#[actix_web::test]
async fn short_wallets_cannot_buy() {
    let token = valid_token(42, vec![Role::User]);
    let err =
        WalletGatewayError::InsufficientBalance { available: Money::from(100_000), required: Money::from(400_000) };
    let (status, body) = post_purchase(&token, Err(err)).await.expect("Request failed");
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(
        body,
        r#"{"error":"Wallet error. Insufficient balance. The wallet holds 100,000 ₫ but the purchase needs 400,000 ₫."}"#
    );
}

#[actix_web::test]
async fn exhausted_coupons_are_a_conflict() {
    let token = valid_token(42, vec![Role::User]);
    let err = WalletGatewayError::CouponError(CouponError::Exhausted("LAUNCH20".to_string()));
    let (status, body) = post_purchase(&token, Err(err)).await.expect("Request failed");
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body, r#"{"error":"Wallet error. Coupon problem: Coupon 'LAUNCH20' has reached its usage cap"}"#);
}

#[actix_web::test]
async fn purchases_require_the_user_role() {
    let _ = env_logger::try_init().ok();
    let token = valid_token(42, vec![Role::Admin]);
    let body = r#"{"course_id":"rust-101","amount":500000}"#;
    let err = post_request(&token, "/purchase", body, |cfg| {
        let api = DepositFlowApi::new(MockWalletDb::new(), EventProducers::default());
        cfg.app_data(web::Data::new(api)).service(PurchaseRoute::<MockWalletDb>::new());
    })
    .await
    .expect_err("Expected an ACL error");
    assert_eq!(err, "Insufficient permissions");
}

const RECEIPT_JSON: &str = r#"{"course_id":"rust-101","base_amount":500000,"discount":100000,"final_amount":400000,"new_balance":100000,"coupon_code":"LAUNCH20","entry":{"id":9,"user_id":42,"transaction_id":null,"entry_type":"Debit","amount":-400000,"balance_after":100000,"reason":"Purchased course rust-101","created_at":"2025-08-03T09:30:00Z"}}"#;
