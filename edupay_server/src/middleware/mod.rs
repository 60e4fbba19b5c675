mod acl;
mod hmac;
mod jwt_auth;

pub use acl::{AclMiddlewareFactory, AclMiddlewareService};
pub use hmac::{HmacMiddlewareFactory, HmacMiddlewareService};
pub use jwt_auth::{JwtAuthMiddlewareFactory, JwtAuthMiddlewareService};
