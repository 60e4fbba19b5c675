//! Transport driver for the realtime push link.
//!
//! The reconnect policy lives in [`SessionLink`] as a pure state machine; this module only
//! translates transport outcomes into link events and link commands into socket work. The
//! server's rejection signals map as follows:
//!
//! * HTTP 401 on the handshake with the `x-auth-error: token-expired` header, or a policy close
//!   frame whose reason is `token expired`, is the token-expired signal. The machine answers
//!   with a refresh followed by one redial.
//! * Every other handshake rejection is [`AuthFailure::Rejected`] and terminal.

use std::collections::VecDeque;

use edupay_server::{
    errors::{AUTH_ERROR_HEADER, TOKEN_EXPIRED_VALUE},
    hub::PushEvent,
    ws::{WsCommand, TOKEN_EXPIRED_CLOSE},
};
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::{net::TcpStream, sync::mpsc};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        self,
        http::{HeaderMap, StatusCode},
        protocol::{frame::coding::CloseCode, CloseFrame},
        Message,
    },
    MaybeTlsStream,
    WebSocketStream,
};
use url::Url;

use crate::{
    client::WalletClient,
    session::{AuthFailure, LinkCommand, LinkEvent, SessionLink},
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How a push session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The refresh path is exhausted. The user must log in again before realtime comes back.
    LoginRequired,
    /// The reconnect budget ran out. REST polling still works, and the caller may start a new
    /// session later.
    Degraded,
    /// The event receiver was dropped, so nobody is listening any more.
    Closed,
}

/// A live push subscription: a wallet client for the refresh calls, the reconnect machine, and
/// the socket plumbing between them.
///
/// Pick the rooms with [`watch`](Self::watch) before calling [`run`](Self::run); the session
/// re-joins all of them after every reconnect.
pub struct PushSession {
    client: WalletClient,
    link: SessionLink,
}

impl PushSession {
    pub fn new(client: WalletClient) -> Self {
        Self { client, link: SessionLink::new() }
    }

    /// Adds a room to the watch list.
    pub fn watch(&mut self, room: impl Into<String>) {
        self.link.handle(LinkEvent::Watch(room.into()));
    }

    /// Runs the link until it gives up or the receiver hangs up, forwarding every push event
    /// into `events`.
    pub async fn run(mut self, events: mpsc::UnboundedSender<PushEvent>) -> SessionEnd {
        let mut queue: VecDeque<LinkCommand> = self.link.handle(LinkEvent::Open).into();
        while let Some(command) = queue.pop_front() {
            match command {
                LinkCommand::OpenSocket => {
                    let url = match self.client.ws_url() {
                        Ok(url) => url,
                        Err(e) => {
                            warn!("No socket URL for the push link: {e}");
                            return SessionEnd::Degraded;
                        },
                    };
                    match dial(&url).await {
                        Dial::Open(stream) => {
                            info!("Push link established");
                            let joins = self.link.handle(LinkEvent::TransportUp);
                            match pump(&mut self.link, stream, joins, &events).await {
                                Some(follow_ups) => queue.extend(follow_ups),
                                None => return SessionEnd::Closed,
                            }
                        },
                        Dial::AuthFailed(failure) => {
                            debug!("Push link handshake rejected: {failure:?}");
                            queue.extend(self.link.handle(LinkEvent::AuthFailed(failure)));
                        },
                        Dial::Failed(reason) => {
                            warn!("Push link could not connect: {reason}");
                            queue.extend(self.link.handle(LinkEvent::TransportLost));
                        },
                    }
                },
                LinkCommand::RefreshToken => match self.client.refresh().await {
                    Ok(_) => queue.extend(self.link.handle(LinkEvent::RefreshSucceeded)),
                    Err(e) => {
                        warn!("Could not refresh the access token: {e}");
                        queue.extend(self.link.handle(LinkEvent::RefreshFailed));
                    },
                },
                LinkCommand::GiveUp => {
                    info!("Push link gave up. A new login is required.");
                    return SessionEnd::LoginRequired;
                },
                // Joins ride along with TransportUp and are sent inside pump. A stray join or
                // leave out here means the socket already closed again; the room stays tracked
                // for the next connection.
                LinkCommand::JoinRoom(_) | LinkCommand::LeaveRoom(_) => {},
            }
        }
        info!("Push link is down. Falling back to REST polling.");
        SessionEnd::Degraded
    }
}

enum Dial {
    Open(WsStream),
    AuthFailed(AuthFailure),
    Failed(String),
}

async fn dial(url: &Url) -> Dial {
    match connect_async(url.as_str()).await {
        Ok((stream, _response)) => Dial::Open(stream),
        Err(tungstenite::Error::Http(response)) if response.status().is_client_error() => {
            Dial::AuthFailed(classify_rejection(response.status(), response.headers()))
        },
        Err(e) => Dial::Failed(e.to_string()),
    }
}

fn classify_rejection(status: StatusCode, headers: &HeaderMap) -> AuthFailure {
    let expired = headers.get(AUTH_ERROR_HEADER).map(|v| v == TOKEN_EXPIRED_VALUE).unwrap_or(false);
    if status == StatusCode::UNAUTHORIZED && expired {
        AuthFailure::TokenExpired
    } else {
        AuthFailure::Rejected
    }
}

fn close_signals_token_expiry(frame: Option<&CloseFrame<'_>>) -> bool {
    frame.map(|f| f.code == CloseCode::Policy && f.reason == TOKEN_EXPIRED_CLOSE).unwrap_or(false)
}

/// Sends the join commands, then forwards pushes until the socket closes. Returns the machine's
/// follow-up commands, or `None` when the event receiver is gone and the session should end.
async fn pump(
    link: &mut SessionLink,
    stream: WsStream,
    joins: Vec<LinkCommand>,
    events: &mpsc::UnboundedSender<PushEvent>,
) -> Option<Vec<LinkCommand>> {
    let (mut writer, mut reader) = stream.split();
    for command in joins {
        if let LinkCommand::JoinRoom(room) = command {
            debug!("Joining room {room}");
            let Ok(frame) = serde_json::to_string(&WsCommand::Join { room }) else { continue };
            if writer.send(Message::Text(frame)).await.is_err() {
                return Some(link.handle(LinkEvent::TransportLost));
            }
        }
    }
    while let Some(frame) = reader.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                if let Ok(event) = serde_json::from_str::<PushEvent>(&text) {
                    if events.send(event).is_err() {
                        debug!("Push receiver hung up. Closing the link.");
                        let _ = writer.send(Message::Close(None)).await;
                        return None;
                    }
                } else {
                    // Room acks and anything else the server has to say
                    debug!("Server frame: {text}");
                }
            },
            Ok(Message::Close(reason)) => {
                let event = if close_signals_token_expiry(reason.as_ref()) {
                    debug!("The server closed the link because the token expired");
                    LinkEvent::AuthFailed(AuthFailure::TokenExpired)
                } else {
                    debug!("The server closed the link: {reason:?}");
                    LinkEvent::TransportLost
                };
                return Some(link.handle(event));
            },
            Ok(_) => {},
            Err(e) => {
                warn!("Push link protocol error: {e}");
                return Some(link.handle(LinkEvent::TransportLost));
            },
        }
    }
    Some(link.handle(LinkEvent::TransportLost))
}
