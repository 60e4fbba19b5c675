//! Role checks for individual routes.
//!
//! The JWT middleware has already validated the token and parked the claims in the request
//! extensions by the time this runs; this layer only compares those claims against the roles the
//! route demands. A token missing any required role is turned away with a 403. Routes declare
//! their requirements through the `route!` macro, which wraps them in this middleware.

use std::{
    future::{ready, Ready},
    rc::Rc,
};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    error::{ErrorForbidden, ErrorInternalServerError},
    Error,
    HttpMessage,
};
use futures::future::LocalBoxFuture;
use log::{error, warn};

use crate::auth::{JwtClaims, Role};

pub struct AclMiddlewareFactory {
    required_roles: Vec<Role>,
}

impl AclMiddlewareFactory {
    pub fn new(required_roles: &[Role]) -> Self {
        AclMiddlewareFactory { required_roles: required_roles.to_vec() }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AclMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = AclMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AclMiddlewareService { required_roles: self.required_roles.clone(), service: Rc::new(service) }))
    }
}

pub struct AclMiddlewareService<S> {
    required_roles: Vec<Role>,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for AclMiddlewareService<S>
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
        let required = self.required_roles.clone();
        Box::pin(async move {
            let claims = match req.extensions().get::<JwtClaims>().cloned() {
                Some(claims) => claims,
                // Only reachable if a route demands roles without the JWT middleware in front
                None => {
                    error!("No claims in the request extensions. Is the route missing the JWT middleware?");
                    return Err(ErrorInternalServerError("No JWT claims found in request extensions"));
                },
            };
            match required.iter().find(|&role| !claims.roles.contains(role)) {
                None => service.call(req).await,
                Some(missing) => {
                    warn!("User {} lacks the {missing:?} role required by {}", claims.sub, req.path());
                    Err(ErrorForbidden("Insufficient permissions"))
                },
            }
        })
    }
}
