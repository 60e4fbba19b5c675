//! # EduPay wallet client
//!
//! Client-side plumbing for storefront backends that talk to the wallet gateway:
//!
//! * [`WalletClient`] wraps the REST surface: token minting and refresh, deposits, balance and
//!   history reads, purchases, and coupon administration.
//! * [`session`] is the reconnect policy for the realtime push link, kept as a pure state
//!   machine so the policy is testable without a socket.
//! * [`realtime`] drives that machine over a tokio-tungstenite socket and forwards
//!   [`PushEvent`]s to the application.
//!
//! The wire types come straight from the server and engine crates, so a caller compiled against
//! this crate agrees with the server about every payload.

pub mod client;
pub mod error;
pub mod realtime;
pub mod session;

pub use client::WalletClient;
pub use edupay_server::hub::{payment_room, user_room, PushEvent};
pub use error::ClientError;
pub use realtime::{PushSession, SessionEnd};
pub use session::{AuthFailure, LinkCommand, LinkEvent, LinkState, SessionLink};
