//! Access token middleware.
//!
//! Wraps the `/api` scope. Every request must carry `Authorization: Bearer <access token>`; the
//! validated claims are stored in the request extensions for the [`crate::auth::JwtClaims`]
//! extractor and the ACL middleware further down the chain. Expired tokens are answered with a
//! 401 carrying the `x-auth-error: token-expired` header so clients know to refresh rather than
//! re-authenticate.

use std::{
    future::{ready, Ready},
    rc::Rc,
};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::AUTHORIZATION,
    Error,
    HttpMessage,
};
use futures::future::LocalBoxFuture;
use log::trace;

use crate::{
    auth::{extract_bearer_token, TokenIssuer},
    errors::ServerError,
};

pub struct JwtAuthMiddlewareFactory {
    issuer: TokenIssuer,
}

impl JwtAuthMiddlewareFactory {
    pub fn new(issuer: TokenIssuer) -> Self {
        JwtAuthMiddlewareFactory { issuer }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtAuthMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = JwtAuthMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(JwtAuthMiddlewareService { issuer: self.issuer.clone(), service: Rc::new(service) }))
    }
}

pub struct JwtAuthMiddlewareService<S> {
    issuer: TokenIssuer,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for JwtAuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let issuer = self.issuer.clone();
        Box::pin(async move {
            trace!("🔑️ Validating access token for {}", req.path());
            let header = req.headers().get(AUTHORIZATION).and_then(|v| v.to_str().ok());
            let claims = extract_bearer_token(header)
                .and_then(|token| issuer.decode_access_token(token))
                .map_err(ServerError::AuthenticationError)?;
            req.extensions_mut().insert(claims);
            service.call(req).await
        })
    }
}
