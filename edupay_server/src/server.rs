use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use edupay_engine::{
    events::{EventHandlers, EventHooks, EventProducers},
    CouponApi,
    DepositFlowApi,
    LedgerApi,
    SqliteDatabase,
};
use log::*;

use crate::{
    auth::TokenIssuer,
    config::{ServerConfig, ServerOptions},
    errors::ServerError,
    hub::{payment_room, user_room, NotificationHub, PushEvent},
    middleware::{HmacMiddlewareFactory, JwtAuthMiddlewareFactory},
    routes::{
        auth,
        health,
        refresh,
        CouponStatusRoute,
        CreateCouponRoute,
        CreateDepositRoute,
        DepositStatusRoute,
        MyBalanceRoute,
        MyHistoryRoute,
        PurchaseRoute,
        SettlementWebhookRoute,
        WsConnectRoute,
    },
    sweeper::start_sweeper,
};

/// The header the bank gateway uses to sign settlement webhook payloads.
pub const SETTLEMENT_SIGNATURE_HEADER: &str = "x-settlement-signature";

pub const PUSH_EVENT_BUFFER_SIZE: usize = 25;

/// Assigns event handlers that feed the notification hub.
///
/// Two engine events matter to connected clients:
///
/// 1. PaymentConfirmedEvent - A transfer matched and the wallet was credited. Pushed to the
///    deposit's payment room and to the owner's user room.
/// 2. DepositClosedEvent - A pending deposit was closed unpaid, by the sweeper or by the mismatch
///    strike limit. Pushed to the same rooms so watchers can stop waiting.
pub fn create_push_event_handlers(hub: NotificationHub) -> EventHandlers {
    let mut hooks = EventHooks::default();
    let hub_clone = hub.clone();
    // --- On PaymentConfirmed Handler ---
    hooks.on_payment_confirmed(move |ev| {
        let event = PushEvent::payment_confirmed(&ev.transaction, ev.new_balance);
        let transaction = ev.transaction;
        let hub = hub_clone.clone();
        Box::pin(async move {
            let watchers = hub.publish(&payment_room(transaction.id), event.clone()).await;
            hub.publish(&user_room(transaction.user_id), event).await;
            debug!("📬️ Payment confirmation for deposit {} pushed to {watchers} watchers", transaction.id);
        })
    });
    // --- On DepositClosed Handler ---
    hooks.on_deposit_closed(move |ev| {
        let event = PushEvent::deposit_closed(&ev.transaction);
        let transaction = ev.transaction;
        let hub = hub.clone();
        Box::pin(async move {
            hub.publish(&payment_room(transaction.id), event.clone()).await;
            hub.publish(&user_room(transaction.user_id), event).await;
            debug!("📬️ Deposit {} closed as {}. Watchers notified", transaction.id, transaction.status);
        })
    });
    EventHandlers::new(PUSH_EVENT_BUFFER_SIZE, hooks)
}

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.run_migrations().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let hub = NotificationHub::new();
    let handlers = create_push_event_handlers(hub.clone());
    let producers = handlers.producers();
    handlers.start_handlers().await;
    let _sweeper = start_sweeper(db.clone(), producers.clone(), config.claim_window, config.sweep_interval_secs);
    let srv = create_server_instance(config, db, producers, hub)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    producers: EventProducers,
    hub: NotificationHub,
) -> Result<Server, ServerError> {
    let host = config.host.clone();
    let port = config.port;
    let srv = HttpServer::new(move || {
        let deposits_api = DepositFlowApi::new(db.clone(), producers.clone());
        let ledger_api = LedgerApi::new(db.clone());
        let coupons_api = CouponApi::new(db.clone());
        let jwt_signer = TokenIssuer::new(&config.auth);
        let options = ServerOptions::from_config(&config);
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("epg::access_log"))
            .app_data(web::Data::new(deposits_api))
            .app_data(web::Data::new(ledger_api))
            .app_data(web::Data::new(coupons_api))
            .app_data(web::Data::new(jwt_signer.clone()))
            .app_data(web::Data::new(config.auth.clone()))
            .app_data(web::Data::new(config.bank.clone()))
            .app_data(web::Data::new(options))
            .app_data(web::Data::new(hub.clone()));
        // Routes that require an access token
        let api_scope = web::scope("/api")
            .wrap(JwtAuthMiddlewareFactory::new(jwt_signer))
            .service(CreateDepositRoute::<SqliteDatabase>::new())
            .service(DepositStatusRoute::<SqliteDatabase>::new())
            .service(MyBalanceRoute::<SqliteDatabase>::new())
            .service(MyHistoryRoute::<SqliteDatabase>::new())
            .service(PurchaseRoute::<SqliteDatabase>::new())
            .service(CreateCouponRoute::<SqliteDatabase>::new())
            .service(CouponStatusRoute::<SqliteDatabase>::new());
        // The bank gateway signs payloads instead of carrying a token
        let webhook_scope = web::scope("/webhook")
            .wrap(HmacMiddlewareFactory::new(
                SETTLEMENT_SIGNATURE_HEADER,
                config.webhook.hmac_secret.clone(),
                config.webhook.hmac_checks,
            ))
            .service(SettlementWebhookRoute::<SqliteDatabase>::new());
        app.service(health)
            .service(auth)
            .service(refresh)
            .service(WsConnectRoute::<SqliteDatabase>::new())
            .service(api_scope)
            .service(webhook_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    Ok(srv)
}
