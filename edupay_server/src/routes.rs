//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests:
//! ```nocompile
//!     fn my_handler() -> impl Responder {
//!         std::thread::sleep(Duration::from_secs(5)); // <-- Bad practice! Will cause the current worker thread to
//! hang!
//!     }
//! ```
//! For this reason, any long, non-cpu-bound operation (e.g. I/O, database operations, etc.) should be expressed as
//! futures or asynchronous functions. Async handlers get executed concurrently by worker threads and thus don’t block
//! execution:
//!
//! ```nocompile
//!     async fn my_handler() -> impl Responder {
//!         tokio::time::sleep(Duration::from_secs(5)).await; // <-- Ok. Worker thread will handle other requests here
//!     }
//! ```

use actix_web::{get, post, web, HttpRequest, HttpResponse, Responder};
use chrono::{Duration, Utc};
use edupay_engine::{
    db_types::{DepositTransaction, NewDeposit, UserId},
    helpers::render_qr_payload,
    CouponApi,
    CouponManagement,
    DepositFlowApi,
    LedgerApi,
    LedgerManagement,
    SettlementOutcome,
    WalletGatewayDatabase,
    wallet_objects::Pagination,
};
use log::*;
use serde::Deserialize;

use crate::{
    auth::{JwtClaims, Role, Roles, TokenIssuer},
    config::{AuthConfig, BankConfig, ServerOptions},
    data_objects::{
        AuthRequest,
        BankWebhookEvent,
        CouponRequest,
        DepositInvoice,
        DepositRequest,
        JsonResponse,
        PurchaseRequest,
        RefreshRequest,
        TokenPair,
    },
    errors::{AuthError, ServerError},
    helpers::remote_ip,
    hub::NotificationHub,
    ws::serve_push_session,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal requires [$($roles:expr),*]) => {
        paste::paste! { pub struct [<$name:camel Route>];}
        paste::paste! {
                impl [<$name:camel Route>] {
                #[allow(clippy::new_without_default)]
                pub fn new() -> Self { Self }
            }
        }
        paste::paste! {
            impl actix_web::dev::HttpServiceFactory for [<$name:camel Route>] {
                fn register(self, config: &mut actix_web::dev::AppService) {
                    let res = actix_web::Resource::new($path)
                        .name(stringify!($name))
                        .guard(actix_web::guard::$method())
                        .to($name)
                        .wrap($crate::middleware::AclMiddlewareFactory::new(&[$($roles),+]));
                    actix_web::dev::HttpServiceFactory::register(res, config);
                }
            }
        }
    };

    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };

    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+ where requires [$($roles:expr),*])  => {
        paste::paste! { pub struct [<$name:camel Route>]<A>(core::marker::PhantomData<fn() -> A>);}
        paste::paste! { impl<A> [<$name:camel Route>]<A> {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self(core::marker::PhantomData::<fn() -> A>)
            }
        }}
        paste::paste! { impl<A> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<A>
        where
            A: $($bounds)++ 'static,
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::<A>)
                    .wrap($crate::middleware::AclMiddlewareFactory::new(&[$($roles),+]));
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Auth  ----------------------------------------------------

/// Route handler for the token mint endpoint
///
/// The marketplace's identity service authenticates users; this server only needs a trusted party
/// to vouch for them. That party calls here with the shared `x-api-key` header and a user id, and
/// receives an access + refresh token pair. Requested roles are carried into the tokens; an empty
/// request defaults to [`Role::User`].
#[post("/auth")]
pub async fn auth(
    req: HttpRequest,
    body: web::Json<AuthRequest>,
    signer: web::Data<TokenIssuer>,
    config: web::Data<AuthConfig>,
) -> Result<HttpResponse, ServerError> {
    trace!("💻️ Received token mint request");
    let presented = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .ok_or(ServerError::AuthenticationError(AuthError::InvalidApiKey))?;
    if presented != config.api_key.reveal() {
        warn!("💻️ Token mint request with a bad API key was rejected");
        return Err(ServerError::AuthenticationError(AuthError::InvalidApiKey));
    }
    let request = body.into_inner();
    let roles = if request.roles.is_empty() { vec![Role::User] } else { request.roles };
    let pair = issue_pair(&signer, request.user_id, roles)?;
    debug!("💻️ Issued token pair for user {}", request.user_id);
    Ok(HttpResponse::Ok().json(pair))
}

/// Route handler for the token refresh endpoint
///
/// Exchanges a still-valid refresh token for a fresh access + refresh pair. Access tokens are not
/// accepted here, and refresh tokens are not accepted on `/api` routes.
#[post("/auth/refresh")]
pub async fn refresh(
    body: web::Json<RefreshRequest>,
    signer: web::Data<TokenIssuer>,
) -> Result<HttpResponse, ServerError> {
    trace!("💻️ Received token refresh request");
    let claims = signer.decode_refresh_token(&body.refresh_token)?;
    let pair = issue_pair(&signer, claims.sub, claims.roles)?;
    debug!("💻️ Refreshed token pair for user {}", claims.sub);
    Ok(HttpResponse::Ok().json(pair))
}

fn issue_pair(signer: &TokenIssuer, user_id: UserId, roles: Roles) -> Result<TokenPair, ServerError> {
    let access_token = signer.issue_access_token(user_id, roles.clone())?;
    let refresh_token = signer.issue_refresh_token(user_id, roles)?;
    let access_expires_at = Utc::now() + signer.access_token_ttl();
    Ok(TokenPair { access_token, refresh_token, access_expires_at })
}

//----------------------------------------------   Deposits  ----------------------------------------------------

route!(create_deposit => Post "/deposit" impl WalletGatewayDatabase where requires [Role::User]);
/// Route handler for opening a deposit
///
/// Issues a pending deposit for the authenticated user and returns the invoice: the deposit
/// record, the receiving bank account, the memo the payer must quote, and a rendered QR payload.
/// The credit happens later, when the bank reports a matching transfer on `/webhook/settlement`.
pub async fn create_deposit<B: WalletGatewayDatabase>(
    claims: JwtClaims,
    body: web::Json<DepositRequest>,
    api: web::Data<DepositFlowApi<B>>,
    options: web::Data<ServerOptions>,
    bank: web::Data<BankConfig>,
) -> Result<HttpResponse, ServerError> {
    let amount = body.into_inner().amount;
    debug!("💻️ POST deposit of {amount} for user {}", claims.user_id());
    let transaction = api.issue_deposit(NewDeposit::new(claims.user_id(), amount)).await?;
    let invoice = deposit_invoice(transaction, bank.get_ref(), options.claim_window);
    Ok(HttpResponse::Ok().json(invoice))
}

fn deposit_invoice(transaction: DepositTransaction, bank: &BankConfig, claim_window: Duration) -> DepositInvoice {
    let details = bank.details();
    let qr_payload = render_qr_payload(&bank.qr_template, &details, transaction.amount, &transaction.settlement_code);
    let memo = format!("[{}]", transaction.settlement_code);
    let expires_at = transaction.expires_at(claim_window);
    DepositInvoice { transaction, bank: details, memo, qr_payload, expires_at }
}

route!(deposit_status => Get "/deposit/{id}" impl LedgerManagement);
/// Route handler for polling a deposit
///
/// The reconcile path for clients that missed the push notification. Users see their own
/// deposits; admins see all of them. Anything else is a 404, so existence is not leaked.
pub async fn deposit_status<B: LedgerManagement>(
    claims: JwtClaims,
    path: web::Path<i64>,
    api: web::Data<LedgerApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = path.into_inner();
    debug!("💻️ GET deposit {id} for user {}", claims.user_id());
    let transaction = api
        .deposit(id)
        .await?
        .filter(|t| t.user_id == claims.user_id() || claims.is_admin())
        .ok_or_else(|| ServerError::NoRecordFound(format!("Deposit {id}")))?;
    Ok(HttpResponse::Ok().json(transaction))
}

//----------------------------------------------   Wallet  ----------------------------------------------------

route!(my_balance => Get "/balance" impl LedgerManagement);
pub async fn my_balance<B: LedgerManagement>(
    claims: JwtClaims,
    api: web::Data<LedgerApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET balance for user {}", claims.user_id());
    let balance = api.balance(claims.user_id()).await?;
    Ok(HttpResponse::Ok().json(balance))
}

route!(my_history => Get "/history" impl LedgerManagement);
pub async fn my_history<B: LedgerManagement>(
    claims: JwtClaims,
    query: web::Query<Pagination>,
    api: web::Data<LedgerApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET history for user {}", claims.user_id());
    let history = api.history(claims.user_id(), &query.into_inner()).await?;
    Ok(HttpResponse::Ok().json(history))
}

route!(purchase => Post "/purchase" impl WalletGatewayDatabase where requires [Role::User]);
/// Route handler for wallet purchases
///
/// Debits the authenticated user's wallet for a course, applying an optional coupon, and returns
/// the receipt. Fails without side effects when the balance cannot cover the discounted price.
pub async fn purchase<B: WalletGatewayDatabase>(
    claims: JwtClaims,
    body: web::Json<PurchaseRequest>,
    api: web::Data<DepositFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let request = body.into_inner();
    debug!("💻️ POST purchase of course {} for user {}", request.course_id, claims.user_id());
    let receipt = api.purchase(claims.user_id(), &request.to_purchase()).await?;
    Ok(HttpResponse::Ok().json(receipt))
}

//----------------------------------------------   Coupons  ----------------------------------------------------

route!(create_coupon => Post "/coupons" impl CouponManagement where requires [Role::Admin]);
pub async fn create_coupon<B: CouponManagement>(
    body: web::Json<CouponRequest>,
    api: web::Data<CouponApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let request = body.into_inner();
    debug!("💻️ POST new coupon {}", request.code);
    let coupon = api.create_coupon(request.to_new_coupon()).await?;
    Ok(HttpResponse::Ok().json(coupon))
}

route!(coupon_status => Get "/coupons/{code}" impl CouponManagement where requires [Role::Admin]);
pub async fn coupon_status<B: CouponManagement>(
    path: web::Path<String>,
    api: web::Data<CouponApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let code = path.into_inner();
    debug!("💻️ GET coupon {code}");
    let coupon =
        api.coupon_by_code(&code).await?.ok_or_else(|| ServerError::NoRecordFound(format!("Coupon {code}")))?;
    Ok(HttpResponse::Ok().json(coupon))
}

//----------------------------------------------   Settlement webhook  -----------------------------------------

route!(settlement_webhook => Post "/settlement" impl WalletGatewayDatabase);
/// Route handler for the bank gateway's settlement webhook
///
/// Delivery is at-least-once, so this endpoint is built to be hammered: every recognisable
/// outcome, including redeliveries and junk memos, is acknowledged with a 200 so the gateway
/// stops resending. Only genuine backend failures surface as errors, which the gateway will
/// retry later. The HMAC middleware has already authenticated the payload by the time we get
/// here.
pub async fn settlement_webhook<B: WalletGatewayDatabase>(
    req: HttpRequest,
    body: web::Json<BankWebhookEvent>,
    api: web::Data<DepositFlowApi<B>>,
    options: web::Data<ServerOptions>,
) -> Result<HttpResponse, ServerError> {
    let event = body.into_inner();
    let caller = remote_ip(&req, options.use_x_forwarded_for, options.use_forwarded);
    info!("💻️ Settlement webhook {} from {caller:?}", event.reference_code);
    let Some(settlement) = event.normalize() else {
        debug!("💻️ Webhook {} does not concern a deposit here. Acknowledging without action.", event.reference_code);
        return Ok(HttpResponse::Ok().json(JsonResponse::success("ignored")));
    };
    let outcome = api.settle(&settlement, options.mismatch_threshold).await?;
    Ok(HttpResponse::Ok().json(JsonResponse::success(settlement_ack(&outcome))))
}

fn settlement_ack(outcome: &SettlementOutcome) -> &'static str {
    match outcome {
        SettlementOutcome::Credited { .. } => "credited",
        SettlementOutcome::AlreadyConfirmed { .. } => "already confirmed",
        SettlementOutcome::MismatchRecorded { .. } => "mismatch recorded",
        SettlementOutcome::MarkedFailed { .. } => "deposit failed",
        SettlementOutcome::Discarded { .. } => "discarded",
    }
}

//----------------------------------------------   WebSocket  ----------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct WsQuery {
    token: String,
}

route!(ws_connect => Get "/ws" impl LedgerManagement);
/// Route handler for websocket upgrades
///
/// Browsers cannot set an Authorization header on a websocket handshake, so the access token
/// rides in the `token` query parameter instead and is validated here, before the upgrade.
/// The session itself is served by [`serve_push_session`].
pub async fn ws_connect<B: LedgerManagement + 'static>(
    req: HttpRequest,
    stream: web::Payload,
    query: web::Query<WsQuery>,
    signer: web::Data<TokenIssuer>,
    hub: web::Data<NotificationHub>,
    ledger: web::Data<LedgerApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let claims = signer.decode_access_token(&query.token).map_err(ServerError::AuthenticationError)?;
    let (response, session, msg_stream) =
        actix_ws::handle(&req, stream).map_err(|e| ServerError::Unspecified(e.to_string()))?;
    debug!("💻️ Upgrading connection for user {} to a push session", claims.user_id());
    let hub = hub.get_ref().clone();
    actix_web::rt::spawn(serve_push_session(claims, hub, ledger.into_inner(), session, msg_stream));
    Ok(response)
}
