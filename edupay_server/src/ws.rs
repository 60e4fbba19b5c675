//! WebSocket push sessions.
//!
//! A connected client drives its subscriptions with JSON commands (`join` / `leave` a room) and
//! receives [`PushEvent`]s as JSON text frames. The session enforces three things:
//!
//! * Liveness. We ping on an interval and drop clients that go quiet, so the hub is not left
//!   holding senders for dead sockets.
//! * Room ownership. A user may watch their own `user:` room and the `payment:` rooms of their
//!   own deposits. Admins may watch anything.
//! * Token lifetime. The socket is only as trusted as the access token that opened it. When that
//!   token's expiry passes, the session closes with [`CloseCode::Policy`] and the description
//!   [`TOKEN_EXPIRED_CLOSE`], which tells the client to refresh and reconnect rather than retry
//!   blindly.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use actix_ws::{CloseCode, CloseReason, Message, MessageStream, Session};
use chrono::Utc;
use edupay_engine::{db_types::UserId, LedgerApi, LedgerManagement};
use log::*;
use serde::{Deserialize, Serialize};
use tokio::{sync::mpsc, time};

use crate::{
    auth::JwtClaims,
    data_objects::JsonResponse,
    hub::{NotificationHub, PushEvent, SessionId},
};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);
/// Close-frame description sent when the session's access token reaches its expiry.
pub const TOKEN_EXPIRED_CLOSE: &str = "token expired";

/// Commands a client may send down the socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum WsCommand {
    Join { room: String },
    Leave { room: String },
}

/// Runs one socket to completion. Spawned by the `/ws` route after the handshake.
pub async fn serve_push_session<B: LedgerManagement>(
    claims: JwtClaims,
    hub: NotificationHub,
    ledger: Arc<LedgerApi<B>>,
    mut session: Session,
    mut msg_stream: MessageStream,
) {
    let session_id = hub.register();
    let user_id = claims.user_id();
    let is_admin = claims.is_admin();
    info!("🔌️ Push session {session_id} opened for user {user_id}");
    let (tx, mut rx) = mpsc::unbounded_channel::<PushEvent>();
    let mut last_heartbeat = Instant::now();
    let mut heartbeat = time::interval(HEARTBEAT_INTERVAL);
    let token_ttl = (claims.exp - Utc::now().timestamp()).max(0) as u64;
    let token_deadline = time::sleep(Duration::from_secs(token_ttl));
    tokio::pin!(token_deadline);

    let close_reason = loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                if Instant::now().duration_since(last_heartbeat) > CLIENT_TIMEOUT {
                    debug!("🔌️ Session {session_id} missed its heartbeats. Closing.");
                    break None;
                }
                if session.ping(b"").await.is_err() {
                    break None;
                }
            },
            () = &mut token_deadline => {
                debug!("🔌️ Session {session_id} outlived its access token. Closing.");
                break Some(CloseReason { code: CloseCode::Policy, description: Some(TOKEN_EXPIRED_CLOSE.into()) });
            },
            event = rx.recv() => {
                // tx is owned by this loop, so recv() cannot return None here
                if let Some(event) = event {
                    match serde_json::to_string(&event) {
                        Ok(json) => {
                            if session.text(json).await.is_err() {
                                break None;
                            }
                        },
                        Err(e) => error!("🔌️ Could not serialize push event: {e}"),
                    }
                }
            },
            msg = msg_stream.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        last_heartbeat = Instant::now();
                        let reply = handle_command(&text, session_id, user_id, is_admin, &hub, &ledger, &tx).await;
                        let Ok(json) = serde_json::to_string(&reply) else { continue };
                        if session.text(json).await.is_err() {
                            break None;
                        }
                    },
                    Some(Ok(Message::Ping(payload))) => {
                        last_heartbeat = Instant::now();
                        if session.pong(&payload).await.is_err() {
                            break None;
                        }
                    },
                    Some(Ok(Message::Close(reason))) => {
                        debug!("🔌️ Session {session_id} closed by client: {reason:?}");
                        break None;
                    },
                    Some(Ok(_)) => {
                        last_heartbeat = Instant::now();
                    },
                    Some(Err(e)) => {
                        warn!("🔌️ Protocol error on session {session_id}: {e}");
                        break None;
                    },
                    None => break None,
                }
            },
        }
    };

    hub.drop_session(session_id).await;
    let _ = session.close(close_reason).await;
    info!("🔌️ Push session {session_id} for user {user_id} ended");
}

async fn handle_command<B: LedgerManagement>(
    text: &str,
    session_id: SessionId,
    user_id: UserId,
    is_admin: bool,
    hub: &NotificationHub,
    ledger: &LedgerApi<B>,
    sender: &mpsc::UnboundedSender<PushEvent>,
) -> JsonResponse {
    match serde_json::from_str::<WsCommand>(text) {
        Ok(WsCommand::Join { room }) => match may_watch(&room, user_id, is_admin, ledger).await {
            Ok(()) => {
                hub.subscribe(&room, session_id, sender.clone()).await;
                JsonResponse::success(format!("joined {room}"))
            },
            Err(reason) => JsonResponse::failure(reason),
        },
        Ok(WsCommand::Leave { room }) => {
            hub.unsubscribe(&room, session_id).await;
            JsonResponse::success(format!("left {room}"))
        },
        Err(e) => JsonResponse::failure(format!("Unrecognised command. {e}")),
    }
}

/// Decides whether this user may subscribe to the given room. Deposit existence is not leaked to
/// users probing payment rooms that are not theirs.
async fn may_watch<B: LedgerManagement>(
    room: &str,
    user_id: UserId,
    is_admin: bool,
    ledger: &LedgerApi<B>,
) -> Result<(), String> {
    if is_admin {
        return Ok(());
    }
    if let Some(id) = room.strip_prefix("user:") {
        return if id.parse::<UserId>() == Ok(user_id) {
            Ok(())
        } else {
            Err(format!("{room} is not your room"))
        };
    }
    if let Some(id) = room.strip_prefix("payment:") {
        let Ok(transaction_id) = id.parse::<i64>() else {
            return Err(format!("{room} is not a valid payment room"));
        };
        return match ledger.deposit(transaction_id).await {
            Ok(Some(transaction)) if transaction.user_id == user_id => Ok(()),
            Ok(_) => Err(format!("{room} is not your deposit")),
            Err(e) => {
                error!("🔌️ Could not look up deposit {transaction_id}: {e}");
                Err(format!("could not verify access to {room}"))
            },
        };
    }
    Err(format!("unknown room family: {room}"))
}
