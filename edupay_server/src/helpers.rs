use std::{net::IpAddr, str::FromStr};

use actix_web::HttpRequest;
use hmac::{Hmac, Mac};
use log::{debug, trace};
use regex::Regex;
use sha2::Sha256;

/// Calculates the signature for a webhook body: base64 of the HMAC-SHA256 digest under the shared
/// secret. This must match what the bank gateway computes on its side.
pub fn calculate_hmac(secret: &str, data: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any size");
    mac.update(data);
    base64::encode(mac.finalize().into_bytes())
}

/// The address a request came from, for the audit log.
///
/// Proxy headers are spoofable, so each one is only consulted when the deployment explicitly
/// enables it: `X-Forwarded-For` first, then `Forwarded`, then the socket peer address.
pub fn remote_ip(req: &HttpRequest, use_x_forwarded_for: bool, use_forwarded: bool) -> Option<IpAddr> {
    if use_x_forwarded_for {
        if let Some(ip) = x_forwarded_for_ip(req) {
            debug!("Using X-Forwarded-For for the remote address: {ip}");
            return Some(ip);
        }
    }
    if use_forwarded {
        if let Some(ip) = forwarded_ip(req) {
            debug!("Using Forwarded for the remote address: {ip}");
            return Some(ip);
        }
    }
    let info = req.connection_info();
    let peer = info.peer_addr()?;
    trace!("Using the socket peer address: {peer}");
    IpAddr::from_str(peer).ok()
}

/// `X-Forwarded-For` lists every hop. The first entry is the original client.
fn x_forwarded_for_ip(req: &HttpRequest) -> Option<IpAddr> {
    let value = req.headers().get("X-Forwarded-For")?.to_str().ok()?;
    let first = value.split(',').next()?.trim();
    IpAddr::from_str(first).ok()
}

fn forwarded_ip(req: &HttpRequest) -> Option<IpAddr> {
    let value = req.headers().get("Forwarded")?.to_str().ok()?;
    let re = Regex::new(r#"for=(?P<ip>[^;]+)"#).ok()?;
    let ip = re.captures(value)?.name("ip")?.as_str();
    IpAddr::from_str(ip.trim()).ok()
}
