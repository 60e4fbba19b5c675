//! Webhook signature middleware.
//!
//! The bank gateway signs every settlement webhook it sends: base64 of the HMAC-SHA256 digest of
//! the raw request body under the shared `EPG_WEBHOOK_HMAC_SECRET`. The signature travels in the
//! `x-settlement-signature` header.
//!
//! Wrap the webhook scope with this middleware so that unsigned or tampered payloads are rejected
//! before any parsing happens. Requests without a signature are turned away without reading the
//! body at all. Since checking the signature consumes the payload, the verified bytes are handed
//! back to the request for the handler to deserialize.

use std::{
    future::{ready, Ready},
    rc::Rc,
};

use actix_http::h1;
use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    error::{ErrorBadRequest, ErrorForbidden},
    web,
    Error,
};
use epg_common::Secret;
use futures::future::LocalBoxFuture;
use log::{trace, warn};

use crate::helpers::calculate_hmac;

pub struct HmacMiddlewareFactory {
    signature_header: String,
    secret: Secret<String>,
    // When false, requests pass through unchecked. Local dev only.
    enabled: bool,
}

impl HmacMiddlewareFactory {
    pub fn new(signature_header: &str, secret: Secret<String>, enabled: bool) -> Self {
        HmacMiddlewareFactory { signature_header: signature_header.into(), secret, enabled }
    }
}

impl<S, B> Transform<S, ServiceRequest> for HmacMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = HmacMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(HmacMiddlewareService {
            signature_header: self.signature_header.clone(),
            secret: self.secret.clone(),
            enabled: self.enabled,
            service: Rc::new(service),
        }))
    }
}

pub struct HmacMiddlewareService<S> {
    signature_header: String,
    secret: Secret<String>,
    enabled: bool,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for HmacMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let secret = self.secret.reveal().clone();
        let header = self.signature_header.clone();
        let enabled = self.enabled;
        Box::pin(async move {
            if !enabled {
                trace!("🔐️ Signature checks are disabled. Allowing request.");
                return service.call(req).await;
            }
            // Clone the header value so the borrow does not span the payload extraction below
            let presented = match req.headers().get(&header) {
                Some(value) => value.clone(),
                None => {
                    warn!("🔐️ Webhook arrived without a signature. Denying access.");
                    return Err(ErrorForbidden("No HMAC signature found."));
                },
            };
            let body = req.extract::<web::Bytes>().await.map_err(|e| {
                warn!("🔐️ Could not read the webhook body: {e:?}");
                ErrorBadRequest("Failed to extract request data.")
            })?;
            let expected = calculate_hmac(&secret, body.as_ref());
            if presented != expected.as_str() {
                warn!("🔐️ Webhook signature does not match the body. Denying access.");
                return Err(ErrorForbidden("Invalid HMAC signature."));
            }
            trace!("🔐️ Webhook signature verified ✅️");
            req.set_payload(replay_payload(body));
            service.call(req).await
        })
    }
}

/// Extracting the body consumed the request payload; build a fresh one carrying the same bytes.
fn replay_payload(body: web::Bytes) -> Payload {
    let (_, mut payload) = h1::Payload::create(true);
    payload.unread_data(body);
    Payload::from(payload)
}
