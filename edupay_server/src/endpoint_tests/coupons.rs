use actix_web::{http::StatusCode, web, web::ServiceConfig};
use chrono::{TimeZone, Utc};
use edupay_engine::{
    db_types::{Coupon, CouponTarget},
    traits::CouponError,
    CouponApi,
};

use super::{
    helpers::{get_request, post_request, valid_token},
    mocks::MockCouponDb,
};
use crate::{
    auth::Role,
    routes::{CouponStatusRoute, CreateCouponRoute},
};

fn coupon_row(used_count: i64) -> Coupon {
    Coupon {
        id: 3,
        code: "LAUNCH20".to_string(),
        percentage: 20,
        max_usage: Some(100),
        used_count,
        expires_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        target: CouponTarget::All,
        target_id: None,
        created_at: Utc.with_ymd_and_hms(2025, 8, 1, 12, 0, 0).unwrap(),
    }
}

fn configure(cfg: &mut ServiceConfig) {
    let mut db = MockCouponDb::new();
    db.expect_create_coupon().returning(|c| {
        if c.code == "LAUNCH20" {
            Err(CouponError::AlreadyExists(c.code))
        } else {
            Ok(Coupon { code: c.code, ..coupon_row(0) })
        }
    });
    db.expect_fetch_coupon().returning(|code| {
        if code == "LAUNCH20" {
            Ok(Some(coupon_row(17)))
        } else {
            Ok(None)
        }
    });
    let api = CouponApi::new(db);
    cfg.app_data(web::Data::new(api))
        .service(CreateCouponRoute::<MockCouponDb>::new())
        .service(CouponStatusRoute::<MockCouponDb>::new());
}

#[actix_web::test]
async fn admins_can_register_coupons() {
    let _ = env_logger::try_init().ok();
    let token = valid_token(1, vec![Role::User, Role::Admin]);
    let body = r#"{"code":"SPRING10","percentage":10,"expires_at":"2026-01-01T00:00:00Z","max_usage":100}"#;
    let (status, body) = post_request(&token, "/coupons", body, configure).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK, "was: {body}");
    assert_eq!(
        body,
        r#"{"id":3,"code":"SPRING10","percentage":20,"max_usage":100,"used_count":0,"expires_at":"2026-01-01T00:00:00Z","target":"All","target_id":null,"created_at":"2025-08-01T12:00:00Z"}"#
    );
}

#[actix_web::test]
async fn plain_users_cannot_touch_coupons() {
    let _ = env_logger::try_init().ok();
    let token = valid_token(42, vec![Role::User]);
    let body = r#"{"code":"SPRING10","percentage":10,"expires_at":"2026-01-01T00:00:00Z"}"#;
    let err = post_request(&token, "/coupons", body, configure).await.expect_err("Expected an ACL error");
    assert_eq!(err, "Insufficient permissions");
    let err = get_request(&token, "/coupons/LAUNCH20", configure).await.expect_err("Expected an ACL error");
    assert_eq!(err, "Insufficient permissions");
}

#[actix_web::test]
async fn duplicate_codes_are_a_conflict() {
    let _ = env_logger::try_init().ok();
    let token = valid_token(1, vec![Role::Admin]);
    let body = r#"{"code":"LAUNCH20","percentage":20,"expires_at":"2026-01-01T00:00:00Z"}"#;
    let (status, body) = post_request(&token, "/coupons", body, configure).await.expect("Request failed");
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body, r#"{"error":"Coupon error. Coupon 'LAUNCH20' already exists"}"#);
}

#[actix_web::test]
async fn coupon_status_shows_the_usage_count() {
    let _ = env_logger::try_init().ok();
    let token = valid_token(1, vec![Role::Admin]);
    let (status, body) = get_request(&token, "/coupons/LAUNCH20", configure).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        r#"{"id":3,"code":"LAUNCH20","percentage":20,"max_usage":100,"used_count":17,"expires_at":"2026-01-01T00:00:00Z","target":"All","target_id":null,"created_at":"2025-08-01T12:00:00Z"}"#
    );
}

#[actix_web::test]
async fn unknown_coupons_are_a_404() {
    let _ = env_logger::try_init().ok();
    let token = valid_token(1, vec![Role::Admin]);
    let (status, body) = get_request(&token, "/coupons/NOPE", configure).await.expect("Request failed");
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, r#"{"error":"The data was not found. Coupon NOPE"}"#);
}
