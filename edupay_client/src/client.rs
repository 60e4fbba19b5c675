use edupay_engine::{
    db_types::{Coupon, DepositTransaction, UserId, WalletBalance},
    traits::PurchaseReceipt,
    wallet_objects::{LedgerHistory, Pagination},
};
use edupay_server::{
    auth::Roles,
    data_objects::{
        AuthRequest,
        CouponRequest,
        DepositInvoice,
        DepositRequest,
        PurchaseRequest,
        RefreshRequest,
        TokenPair,
    },
    errors::{AUTH_ERROR_HEADER, TOKEN_EXPIRED_VALUE},
};
use epg_common::Money;
use log::{debug, info};
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
    Response,
    StatusCode,
};
use serde::{de::DeserializeOwned, Deserialize};
use url::Url;

use crate::error::ClientError;

/// REST client for the wallet gateway.
///
/// Holds the token pair it was last issued; [`authenticate`](Self::authenticate) and
/// [`refresh`](Self::refresh) replace it. Everything under `/api` goes out with the current
/// access token as a bearer header.
pub struct WalletClient {
    client: Client,
    server: Url,
    access_token: String,
    refresh_token: String,
}

impl WalletClient {
    pub fn new(server: Url) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert("Accept", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .user_agent("EduPay Wallet Client")
            .default_headers(headers)
            .build()
            .expect("Failed to create reqwest client");
        WalletClient { client, server, access_token: String::new(), refresh_token: String::new() }
    }

    pub fn server(&self) -> &str {
        self.server.as_str()
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn url(&self, path: &str) -> Result<Url, ClientError> {
        Ok(self.server.join(path)?)
    }

    /// The push socket endpoint, with the current access token attached as the `token` query
    /// parameter.
    pub fn ws_url(&self) -> Result<Url, ClientError> {
        let mut url = self.server.join("/ws")?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| ClientError::Socket(format!("No websocket endpoint can be derived from {}", self.server)))?;
        url.query_pairs_mut().append_pair("token", &self.access_token);
        Ok(url)
    }

    pub async fn health(&self) -> Result<String, ClientError> {
        let url = self.url("/health")?;
        let res = self.client.get(url).send().await?;
        Ok(res.text().await?)
    }

    /// Mints a token pair for `user_id` and stores it on the client. Only trusted backend callers
    /// hold the API key; browsers never make this call themselves.
    pub async fn authenticate(
        &mut self,
        api_key: &str,
        user_id: UserId,
        roles: Roles,
    ) -> Result<TokenPair, ClientError> {
        let url = self.url("/auth")?;
        let body = AuthRequest { user_id, roles };
        let res = self.client.post(url).header("x-api-key", api_key).json(&body).send().await?;
        let pair: TokenPair = parse_response(res).await?;
        info!("Authenticated as user {user_id}. The access token expires at {}", pair.access_expires_at);
        self.access_token = pair.access_token.clone();
        self.refresh_token = pair.refresh_token.clone();
        Ok(pair)
    }

    /// Trades the stored refresh token for a fresh pair. This is the call the push session makes
    /// when its socket is turned away with the token-expired signal.
    pub async fn refresh(&mut self) -> Result<TokenPair, ClientError> {
        let url = self.url("/auth/refresh")?;
        let body = RefreshRequest { refresh_token: self.refresh_token.clone() };
        let res = self.client.post(url).json(&body).send().await?;
        let pair: TokenPair = parse_response(res).await?;
        debug!("Token pair refreshed. The access token expires at {}", pair.access_expires_at);
        self.access_token = pair.access_token.clone();
        self.refresh_token = pair.refresh_token.clone();
        Ok(pair)
    }

    /// Opens a deposit for `amount` and returns the invoice to show the payer.
    pub async fn create_deposit(&self, amount: Money) -> Result<DepositInvoice, ClientError> {
        let url = self.url("/api/deposit")?;
        let res =
            self.client.post(url).bearer_auth(&self.access_token).json(&DepositRequest { amount }).send().await?;
        parse_response(res).await
    }

    /// The current state of one deposit. This is the reconcile call for clients that missed the
    /// push: poll it after reconnecting, or while the push link is down.
    pub async fn deposit_status(&self, transaction_id: i64) -> Result<DepositTransaction, ClientError> {
        let url = self.url(&format!("/api/deposit/{transaction_id}"))?;
        let res = self.client.get(url).bearer_auth(&self.access_token).send().await?;
        parse_response(res).await
    }

    pub async fn my_balance(&self) -> Result<WalletBalance, ClientError> {
        let url = self.url("/api/balance")?;
        let res = self.client.get(url).bearer_auth(&self.access_token).send().await?;
        parse_response(res).await
    }

    pub async fn my_history(&self, pagination: &Pagination) -> Result<LedgerHistory, ClientError> {
        let url = self.url("/api/history")?;
        let res = self.client.get(url).query(pagination).bearer_auth(&self.access_token).send().await?;
        parse_response(res).await
    }

    pub async fn purchase(&self, purchase: &PurchaseRequest) -> Result<PurchaseReceipt, ClientError> {
        let url = self.url("/api/purchase")?;
        let res = self.client.post(url).bearer_auth(&self.access_token).json(purchase).send().await?;
        parse_response(res).await
    }

    /// Registers a coupon. Requires a token carrying the admin role.
    pub async fn create_coupon(&self, coupon: &CouponRequest) -> Result<Coupon, ClientError> {
        let url = self.url("/api/coupons")?;
        let res = self.client.post(url).bearer_auth(&self.access_token).json(coupon).send().await?;
        parse_response(res).await
    }

    /// Looks up a coupon and its usage count. Requires a token carrying the admin role.
    pub async fn coupon_status(&self, code: &str) -> Result<Coupon, ClientError> {
        let url = self.url(&format!("/api/coupons/{code}"))?;
        let res = self.client.get(url).bearer_auth(&self.access_token).send().await?;
        parse_response(res).await
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

async fn parse_response<T: DeserializeOwned>(res: Response) -> Result<T, ClientError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res.json().await?);
    }
    let expired = token_expired(res.headers());
    let body = res.text().await.unwrap_or_default();
    Err(error_from(status, expired, body))
}

fn token_expired(headers: &HeaderMap) -> bool {
    headers.get(AUTH_ERROR_HEADER).map(|v| v == TOKEN_EXPIRED_VALUE).unwrap_or(false)
}

fn error_from(status: StatusCode, expired: bool, body: String) -> ClientError {
    if status == StatusCode::UNAUTHORIZED && expired {
        return ClientError::TokenExpired;
    }
    let message = serde_json::from_str::<ErrorBody>(&body).map(|b| b.error).unwrap_or(body);
    ClientError::Api { status: status.as_u16(), message }
}
