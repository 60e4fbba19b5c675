use actix_web::{
    body::MessageBody,
    http::{header::ContentType, StatusCode},
    test,
    test::TestRequest,
    web::ServiceConfig,
    App,
};
use chrono::Duration;
use edupay_engine::db_types::UserId;
use epg_common::Secret;
use log::debug;

use crate::{
    auth::{Roles, TokenIssuer},
    config::AuthConfig,
    middleware::JwtAuthMiddlewareFactory,
};

// Creates a test `AuthConfig` for issuing tokens. DO NOT re-use this secret anywhere.
pub fn get_auth_config() -> AuthConfig {
    AuthConfig {
        jwt_secret: Secret::new("an-adequately-long-endpoint-test-signing-secret".to_string()),
        api_key: Secret::new("endpoint-test-api-key".to_string()),
        access_token_ttl: Duration::minutes(15),
        refresh_token_ttl: Duration::days(7),
    }
}

pub fn valid_token(user_id: UserId, roles: Roles) -> String {
    let issuer = TokenIssuer::new(&get_auth_config());
    issuer.issue_access_token(user_id, roles).expect("Failed to sign token")
}

pub fn expired_token(user_id: UserId, roles: Roles) -> String {
    let mut config = get_auth_config();
    config.access_token_ttl = Duration::minutes(-5);
    let issuer = TokenIssuer::new(&config);
    issuer.issue_access_token(user_id, roles).expect("Failed to sign token")
}

/// Fires a GET at an app wrapped in the access-token middleware, exactly as `/api` routes are served.
pub async fn get_request(
    auth_header: &str,
    path: &str,
    configure: fn(&mut ServiceConfig),
) -> Result<(StatusCode, String), String> {
    let mut req = TestRequest::get().uri(path);
    if !auth_header.is_empty() {
        req = req.insert_header(("Authorization", format!("Bearer {auth_header}")));
    }
    send_request(req, configure).await
}

pub async fn post_request(
    auth_header: &str,
    path: &str,
    body: &str,
    configure: fn(&mut ServiceConfig),
) -> Result<(StatusCode, String), String> {
    let mut req = TestRequest::post().uri(path).insert_header(ContentType::json()).set_payload(body.to_string());
    if !auth_header.is_empty() {
        req = req.insert_header(("Authorization", format!("Bearer {auth_header}")));
    }
    send_request(req, configure).await
}

async fn send_request(req: TestRequest, configure: fn(&mut ServiceConfig)) -> Result<(StatusCode, String), String> {
    let req = req.to_request();
    let issuer = TokenIssuer::new(&get_auth_config());
    let app = App::new().wrap(JwtAuthMiddlewareFactory::new(issuer)).configure(configure);

    let service = test::init_service(app).await;
    debug!("Making request");
    let (_, res) = test::try_call_service(&service, req).await.map_err(|e| e.to_string())?.into_parts();
    let status = res.status();
    let body = String::from_utf8_lossy(&res.into_body().try_into_bytes().unwrap()).into_owned();
    Ok((status, body))
}
