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
    db_types::{DepositStatus, DepositTransaction, SettlementCode},
    events::EventProducers,
    DepositFlowApi,
    DiscardReason,
    SettlementOutcome,
};
use epg_common::{Money, Secret};

use super::mocks::MockWalletDb;
use crate::{
    config::ServerOptions,
    helpers::calculate_hmac,
    middleware::HmacMiddlewareFactory,
    routes::SettlementWebhookRoute,
    server::SETTLEMENT_SIGNATURE_HEADER,
};

const WEBHOOK_SECRET: &str = "webhook-test-secret";
const SETTLEMENT_BODY: &str = r#"{"referenceCode":"FT2025123456","content":"chuyen tien [DEP4F7K2M9QX1]","transferType":"in","transferAmount":250000}"#;

fn confirmed_deposit() -> DepositTransaction {
    DepositTransaction {
        id: 7,
        user_id: 42,
        amount: Money::from(250_000),
        settlement_code: SettlementCode::from("DEP4F7K2M9QX1"),
        status: DepositStatus::Confirmed,
        mismatch_count: 0,
        external_ref: Some("FT2025123456".to_string()),
        created_at: Utc.with_ymd_and_hms(2025, 8, 1, 12, 0, 0).unwrap(),
        updated_at: Utc.with_ymd_and_hms(2025, 8, 1, 12, 5, 0).unwrap(),
        confirmed_at: Some(Utc.with_ymd_and_hms(2025, 8, 1, 12, 5, 0).unwrap()),
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

fn install(cfg: &mut ServiceConfig, db: MockWalletDb) {
    let api = DepositFlowApi::new(db, EventProducers::default());
    cfg.app_data(web::Data::new(api))
        .app_data(web::Data::new(test_options()))
        .service(SettlementWebhookRoute::<MockWalletDb>::new());
}

fn configure_settle(outcome: SettlementOutcome) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg| {
        let mut db = MockWalletDb::new();
        db.expect_settle_deposit()
            .withf(|event, threshold| event.settlement_code.as_str() == "DEP4F7K2M9QX1" && *threshold == 3)
            .return_once(move |_, _| Ok(outcome));
        install(cfg, db);
    }
}

// The settlement flow is never reached, so the mock carries no expectations and will panic on any
// call that slips through.
fn configure_untouched(cfg: &mut ServiceConfig) {
    install(cfg, MockWalletDb::new());
}

async fn post_webhook(
    signature: Option<String>,
    body: &'static str,
    checks_enabled: bool,
    configure: impl FnOnce(&mut ServiceConfig),
) -> Result<(StatusCode, String), String> {
    let _ = env_logger::try_init().ok();
    let mut req = TestRequest::post().uri("/settlement").insert_header(ContentType::json()).set_payload(body);
    if let Some(sig) = signature {
        req = req.insert_header((SETTLEMENT_SIGNATURE_HEADER, sig));
    }
    let key = Secret::new(WEBHOOK_SECRET.to_string());
    let app = App::new()
        .wrap(HmacMiddlewareFactory::new(SETTLEMENT_SIGNATURE_HEADER, key, checks_enabled))
        .configure(configure);
    let service = test::init_service(app).await;
    let (_, res) = test::try_call_service(&service, req.to_request()).await.map_err(|e| e.to_string())?.into_parts();
    let status = res.status();
    let body = String::from_utf8_lossy(&res.into_body().try_into_bytes().unwrap()).into_owned();
    Ok((status, body))
}

fn sign(body: &str) -> Option<String> {
    Some(calculate_hmac(WEBHOOK_SECRET, body.as_bytes()))
}

#[actix_web::test]
async fn unsigned_webhooks_are_rejected() {
    let err = post_webhook(None, SETTLEMENT_BODY, true, configure_untouched).await.expect_err("Expected a 403");
    assert_eq!(err, "No HMAC signature found.");
}

#[actix_web::test]
async fn tampered_payloads_are_rejected() {
    let signature = Some(calculate_hmac("some-other-secret", SETTLEMENT_BODY.as_bytes()));
    let err =
        post_webhook(signature, SETTLEMENT_BODY, true, configure_untouched).await.expect_err("Expected a 403");
    assert_eq!(err, "Invalid HMAC signature.");
}

#[actix_web::test]
async fn a_signed_settlement_credits_the_deposit() {
    let outcome =
        SettlementOutcome::Credited { transaction: confirmed_deposit(), new_balance: Money::from(250_000) };
    let (status, body) = post_webhook(sign(SETTLEMENT_BODY), SETTLEMENT_BODY, true, configure_settle(outcome))
        .await
        .expect("Request failed");
    assert_eq!(status, StatusCode::OK, "was: {body}");
    assert_eq!(body, r#"{"success":true,"message":"credited"}"#);
}

#[actix_web::test]
async fn redeliveries_are_acknowledged_without_a_second_credit() {
    let outcome = SettlementOutcome::AlreadyConfirmed { transaction: confirmed_deposit() };
    let (status, body) = post_webhook(sign(SETTLEMENT_BODY), SETTLEMENT_BODY, true, configure_settle(outcome))
        .await
        .expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"success":true,"message":"already confirmed"}"#);
}

#[actix_web::test]
async fn amount_mismatches_are_recorded() {
    let mut transaction = confirmed_deposit();
    transaction.status = DepositStatus::Pending;
    transaction.mismatch_count = 1;
    let outcome = SettlementOutcome::MismatchRecorded { transaction, attempts: 1 };
    let (status, body) = post_webhook(sign(SETTLEMENT_BODY), SETTLEMENT_BODY, true, configure_settle(outcome))
        .await
        .expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"success":true,"message":"mismatch recorded"}"#);
}

#[actix_web::test]
async fn unknown_codes_are_acknowledged_and_dropped() {
    let outcome = SettlementOutcome::Discarded { reason: DiscardReason::UnknownCode };
    let (status, body) = post_webhook(sign(SETTLEMENT_BODY), SETTLEMENT_BODY, true, configure_settle(outcome))
        .await
        .expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"success":true,"message":"discarded"}"#);
}

#[actix_web::test]
async fn memos_without_codes_are_ignored() {
    let body = r#"{"referenceCode":"FT2025123457","content":"lunch money","transferType":"in","transferAmount":50000}"#;
    let (status, body) = post_webhook(sign(body), body, true, configure_untouched).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"success":true,"message":"ignored"}"#);
}

#[actix_web::test]
async fn outgoing_transfers_are_ignored() {
    let body = r#"{"referenceCode":"FT2025123458","content":"refund [DEP4F7K2M9QX1]","transferType":"out","transferAmount":250000}"#;
    let (status, body) = post_webhook(sign(body), body, true, configure_untouched).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"success":true,"message":"ignored"}"#);
}

#[actix_web::test]
async fn signature_checks_can_be_disabled() {
    let outcome =
        SettlementOutcome::Credited { transaction: confirmed_deposit(), new_balance: Money::from(250_000) };
    let (status, body) =
        post_webhook(None, SETTLEMENT_BODY, false, configure_settle(outcome)).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"success":true,"message":"credited"}"#);
}
