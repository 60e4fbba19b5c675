//! # EduPay gateway server
//! This module hosts the HTTP and websocket surface of the EduPay wallet gateway. It is responsible for:
//! Minting and refreshing the JWT pairs that clients authenticate with.
//! Issuing deposit invoices and answering wallet balance, history and purchase requests.
//! Listening for signed settlement webhooks from the bank gateway and feeding them to the engine.
//! Pushing payment notifications to websocket subscribers as money moves.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/auth` and `/auth/refresh`: Token issuance for the marketplace's identity service.
//! * `/ws`: The websocket upgrade for realtime payment notifications.
//! * `/api/...`: The authenticated wallet API (deposits, balance, history, purchases, coupons).
//! * `/webhook/settlement`: The HMAC-signed transfer reports from the bank gateway.

pub mod auth;
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;

pub mod helpers;
pub mod hub;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod sweeper;
pub mod ws;

#[cfg(test)]
mod endpoint_tests;
