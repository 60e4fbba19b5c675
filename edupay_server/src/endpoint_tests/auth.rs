use actix_web::{
    body::MessageBody,
    error::ResponseError,
    http::StatusCode,
    test,
    test::TestRequest,
    web,
    web::ServiceConfig,
    App,
};
use log::*;

use super::{
    helpers::{expired_token, get_auth_config, get_request, valid_token},
    mocks::MockWalletDb,
};
use crate::{
    auth::{Role, TokenIssuer},
    data_objects::TokenPair,
    errors::AUTH_ERROR_HEADER,
    routes::{auth, refresh, MyBalanceRoute},
};

fn configure_auth(cfg: &mut ServiceConfig) {
    let config = get_auth_config();
    let signer = TokenIssuer::new(&config);
    cfg.app_data(web::Data::new(signer)).app_data(web::Data::new(config)).service(auth).service(refresh);
}

async fn post_auth(path: &str, api_key: Option<&str>, body: serde_json::Value) -> (StatusCode, String) {
    let _ = env_logger::try_init().ok();
    let mut req = TestRequest::post().uri(path).set_json(body);
    if let Some(key) = api_key {
        req = req.insert_header(("x-api-key", key));
    }
    let req = req.to_request();
    let app = App::new().configure(configure_auth);
    let app = test::init_service(app).await;
    debug!("Making request");
    let (_, res) = test::call_service(&app, req).await.into_parts();
    let status = res.status();
    let body = String::from_utf8_lossy(&res.into_body().try_into_bytes().unwrap()).into_owned();
    (status, body)
}

#[actix_web::test]
async fn minting_without_an_api_key_is_rejected() {
    let (status, body) = post_auth("/auth", None, serde_json::json!({"user_id": 42})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, r#"{"error":"Authentication Error. Invalid API key."}"#);
}

#[actix_web::test]
async fn minting_with_a_bad_api_key_is_rejected() {
    let (status, body) = post_auth("/auth", Some("wrong-key"), serde_json::json!({"user_id": 42})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, r#"{"error":"Authentication Error. Invalid API key."}"#);
}

#[actix_web::test]
async fn minting_returns_a_usable_token_pair() {
    let (status, body) = post_auth("/auth", Some("endpoint-test-api-key"), serde_json::json!({"user_id": 42})).await;
    assert_eq!(status, StatusCode::OK, "was: {body}");
    let pair = serde_json::from_str::<TokenPair>(&body).unwrap();
    let signer = TokenIssuer::new(&get_auth_config());
    let claims = signer.decode_access_token(&pair.access_token).unwrap();
    assert_eq!(claims.sub, 42);
    // No roles requested defaults to a plain user
    assert_eq!(claims.roles, vec![Role::User]);
    assert!(!claims.is_admin());
    let claims = signer.decode_refresh_token(&pair.refresh_token).unwrap();
    assert_eq!(claims.sub, 42);
}

#[actix_web::test]
async fn requested_roles_are_carried_into_the_tokens() {
    let body = serde_json::json!({"user_id": 1, "roles": ["user", "admin"]});
    let (status, body) = post_auth("/auth", Some("endpoint-test-api-key"), body).await;
    assert_eq!(status, StatusCode::OK, "was: {body}");
    let pair = serde_json::from_str::<TokenPair>(&body).unwrap();
    let signer = TokenIssuer::new(&get_auth_config());
    let claims = signer.decode_access_token(&pair.access_token).unwrap();
    assert_eq!(claims.roles, vec![Role::User, Role::Admin]);
    assert!(claims.is_admin());
}

#[actix_web::test]
async fn refresh_tokens_buy_a_fresh_pair() {
    let signer = TokenIssuer::new(&get_auth_config());
    let refresh_token = signer.issue_refresh_token(42, vec![Role::User]).unwrap();
    let (status, body) = post_auth("/auth/refresh", None, serde_json::json!({"refresh_token": refresh_token})).await;
    assert_eq!(status, StatusCode::OK, "was: {body}");
    let pair = serde_json::from_str::<TokenPair>(&body).unwrap();
    let claims = signer.decode_access_token(&pair.access_token).unwrap();
    assert_eq!(claims.sub, 42);
    assert_eq!(claims.roles, vec![Role::User]);
}

#[actix_web::test]
async fn access_tokens_cannot_be_used_to_refresh() {
    let signer = TokenIssuer::new(&get_auth_config());
    let access_token = signer.issue_access_token(42, vec![Role::User]).unwrap();
    let (status, body) = post_auth("/auth/refresh", None, serde_json::json!({"refresh_token": access_token})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, r#"{"error":"Authentication Error. Wrong token type for this endpoint."}"#);
}

//---- The access-token middleware contract, exercised through a protected route ----

fn configure_balance(cfg: &mut ServiceConfig) {
    let mut db = MockWalletDb::new();
    db.expect_fetch_wallet_balance()
        .returning(|user_id| Ok(edupay_engine::db_types::WalletBalance::empty(user_id)));
    let api = edupay_engine::LedgerApi::new(db);
    cfg.app_data(web::Data::new(api)).service(MyBalanceRoute::<MockWalletDb>::new());
}

#[actix_web::test]
async fn requests_without_a_token_are_rejected() {
    let _ = env_logger::try_init().ok();
    let err = get_request("", "/balance", configure_balance).await.expect_err("Expected an auth error");
    assert_eq!(err, "Authentication Error. No access token provided.");
}

#[actix_web::test]
async fn garbage_tokens_are_rejected() {
    let _ = env_logger::try_init().ok();
    let err = get_request("made.up.nonsense", "/balance", configure_balance).await.expect_err("Expected an auth error");
    assert!(err.contains("Token is invalid"), "was: {err}");
}

#[actix_web::test]
async fn expired_tokens_announce_themselves_in_a_header() {
    let _ = env_logger::try_init().ok();
    let token = expired_token(42, vec![Role::User]);
    let req =
        TestRequest::get().uri("/balance").insert_header(("Authorization", format!("Bearer {token}"))).to_request();
    let signer = TokenIssuer::new(&get_auth_config());
    let app = App::new().wrap(crate::middleware::JwtAuthMiddlewareFactory::new(signer)).configure(configure_balance);
    let app = test::init_service(app).await;
    let err = test::try_call_service(&app, req).await.expect_err("Expected an auth error");
    assert_eq!(err.as_response_error().status_code(), StatusCode::UNAUTHORIZED);
    // Clients tell an expired token apart from a rejected one by this header
    let res = err.as_response_error().error_response();
    let header = res.headers().get(AUTH_ERROR_HEADER).and_then(|v| v.to_str().ok());
    assert_eq!(header, Some("token-expired"));
}

#[actix_web::test]
async fn fresh_tokens_pass_the_middleware() {
    let _ = env_logger::try_init().ok();
    let token = valid_token(42, vec![Role::User]);
    let (status, body) = get_request(&token, "/balance", configure_balance).await.unwrap();
    assert_eq!(status, StatusCode::OK, "was: {body}");
    assert!(body.contains(r#""user_id":42"#), "was: {body}");
}
