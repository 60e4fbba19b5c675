use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use edupay_engine::{CouponError, LedgerApiError, WalletGatewayError};
use thiserror::Error;

/// Response header carrying the reason for a 401, so clients can tell an expired token apart
/// from a rejected one without parsing the body.
pub const AUTH_ERROR_HEADER: &str = "x-auth-error";
pub const TOKEN_EXPIRED_VALUE: &str = "token-expired";

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("Authentication Error. {0}")]
    AuthenticationError(#[from] AuthError),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("Wallet error. {0}")]
    WalletError(#[from] WalletGatewayError),
    #[error("Coupon error. {0}")]
    CouponError(#[from] CouponError),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::AuthenticationError(_) => StatusCode::UNAUTHORIZED,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::WalletError(e) => wallet_status_code(e),
            Self::CouponError(e) => coupon_status_code(e),
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut builder = HttpResponse::build(self.status_code());
        builder.insert_header(ContentType::json());
        if matches!(self, Self::AuthenticationError(AuthError::TokenExpired)) {
            builder.insert_header((AUTH_ERROR_HEADER, TOKEN_EXPIRED_VALUE));
        }
        builder.body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

fn wallet_status_code(e: &WalletGatewayError) -> StatusCode {
    match e {
        WalletGatewayError::InvalidAmount(_) => StatusCode::BAD_REQUEST,
        WalletGatewayError::InsufficientBalance { .. } => StatusCode::PAYMENT_REQUIRED,
        WalletGatewayError::DepositNotFound(_) => StatusCode::NOT_FOUND,
        WalletGatewayError::CouponError(e) => coupon_status_code(e),
        WalletGatewayError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        WalletGatewayError::SettlementCodeTaken(_) => StatusCode::INTERNAL_SERVER_ERROR,
        WalletGatewayError::SettlementCodeExhausted(_) => StatusCode::INTERNAL_SERVER_ERROR,
        WalletGatewayError::LedgerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn coupon_status_code(e: &CouponError) -> StatusCode {
    match e {
        CouponError::NotFound(_) => StatusCode::NOT_FOUND,
        CouponError::Expired(_, _) => StatusCode::GONE,
        CouponError::Exhausted(_) => StatusCode::CONFLICT,
        CouponError::AlreadyExists(_) => StatusCode::CONFLICT,
        CouponError::ScopeMismatch(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CouponError::InvalidPercentage(_) => StatusCode::BAD_REQUEST,
        CouponError::InvalidExpiry(_) => StatusCode::BAD_REQUEST,
        CouponError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("No access token provided.")]
    MissingToken,
    #[error("Token is invalid. {0}")]
    InvalidToken(String),
    #[error("Token has expired.")]
    TokenExpired,
    #[error("Wrong token type for this endpoint.")]
    WrongTokenType,
    #[error("Invalid API key.")]
    InvalidApiKey,
}

impl From<LedgerApiError> for ServerError {
    fn from(e: LedgerApiError) -> Self {
        Self::WalletError(e.into())
    }
}
