//! JWT handling for the wallet gateway.
//!
//! The platform's identity service lives elsewhere; this server only needs to know *who* a request
//! is for and *what* it may do. Both travel inside an HS256-signed JWT. Access tokens are
//! short-lived and accepted on `/api` routes; refresh tokens are long-lived and accepted only on
//! `/auth/refresh`. The two are distinguished by the `token_type` claim so a leaked refresh token
//! cannot be replayed as an access token.

use actix_web::{dev::Payload, FromRequest, HttpMessage, HttpRequest};
use chrono::{Duration, Utc};
use futures::future::{ready, Ready};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::{
    config::AuthConfig,
    errors::{AuthError, ServerError},
};

pub const ACCESS_TOKEN_TYPE: &str = "access";
pub const REFRESH_TOKEN_TYPE: &str = "refresh";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

pub type Roles = Vec<Role>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: i64,
    pub roles: Roles,
    pub token_type: String,
    pub iat: i64,
    pub exp: i64,
}

impl JwtClaims {
    pub fn user_id(&self) -> i64 {
        self.sub
    }

    pub fn is_admin(&self) -> bool {
        self.roles.contains(&Role::Admin)
    }
}

/// Pulls the validated claims out of the request extensions, where the JWT middleware put them.
/// Routes that take a `JwtClaims` parameter therefore only ever see authenticated requests.
impl FromRequest for JwtClaims {
    type Error = ServerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let claims = req.extensions().get::<JwtClaims>().cloned();
        ready(claims.ok_or(ServerError::AuthenticationError(AuthError::MissingToken)))
    }
}

pub fn extract_bearer_token(header_value: Option<&str>) -> Result<&str, AuthError> {
    let raw = header_value.ok_or(AuthError::MissingToken)?;
    let token = raw.trim().strip_prefix("Bearer ").map(str::trim).unwrap_or_default();
    if token.is_empty() {
        return Err(AuthError::MissingToken);
    }
    Ok(token)
}

#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_ttl: Duration,
    refresh_token_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig) -> Self {
        let secret = config.jwt_secret.reveal().as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            access_token_ttl: config.access_token_ttl,
            refresh_token_ttl: config.refresh_token_ttl,
        }
    }

    pub fn access_token_ttl(&self) -> Duration {
        self.access_token_ttl
    }

    pub fn issue_access_token(&self, user_id: i64, roles: Roles) -> Result<String, AuthError> {
        self.issue(user_id, roles, ACCESS_TOKEN_TYPE, self.access_token_ttl)
    }

    pub fn issue_refresh_token(&self, user_id: i64, roles: Roles) -> Result<String, AuthError> {
        self.issue(user_id, roles, REFRESH_TOKEN_TYPE, self.refresh_token_ttl)
    }

    fn issue(&self, user_id: i64, roles: Roles, token_type: &str, ttl: Duration) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = JwtClaims {
            sub: user_id,
            roles,
            token_type: token_type.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding_key).map_err(|e| AuthError::InvalidToken(format!("{e:?}")))
    }

    pub fn decode_access_token(&self, token: &str) -> Result<JwtClaims, AuthError> {
        let claims = self.decode(token)?;
        if claims.token_type != ACCESS_TOKEN_TYPE {
            return Err(AuthError::WrongTokenType);
        }
        Ok(claims)
    }

    pub fn decode_refresh_token(&self, token: &str) -> Result<JwtClaims, AuthError> {
        let claims = self.decode(token)?;
        if claims.token_type != REFRESH_TOKEN_TYPE {
            return Err(AuthError::WrongTokenType);
        }
        Ok(claims)
    }

    fn decode(&self, token: &str) -> Result<JwtClaims, AuthError> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<JwtClaims>(token, &self.decoding_key, &validation).map(|data| data.claims).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken(e.to_string()),
            }
        })
    }
}
