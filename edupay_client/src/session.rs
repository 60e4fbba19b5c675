//! Reconnect policy for the realtime push link.
//!
//! The policy is a pure state machine: the transport driver feeds it [`LinkEvent`]s and carries
//! out the [`LinkCommand`]s it returns. Nothing in here touches a socket or a clock, which is
//! what makes the reconnect behaviour testable on its own.
//!
//! The contract the machine enforces:
//!
//! * A token-expired rejection never redials directly. It refreshes first, then redials once.
//!   Any other auth rejection is terminal, since retrying with the same credentials would only
//!   produce the same answer.
//! * One refresh per connection. If the server rejects the refreshed token again, the machine
//!   gives up instead of looping against the refresh endpoint.
//! * One redial per transport loss. A connection that drops gets a single automatic reconnect;
//!   if that also fails the machine parks itself in [`LinkState::Disconnected`] and the caller
//!   falls back to REST polling.
//! * The machine tracks the watched rooms. The server forgets subscriptions when a socket
//!   closes, so every successful (re)connect emits a join for each tracked room.

use std::collections::BTreeSet;

/// Where the realtime link currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    Refreshing,
    /// The server refused to know us and a refresh cannot fix it. Someone has to log in again.
    Terminal,
}

/// How the server turned a connection away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// A 401 carrying the token-expired marker, or a policy close frame with the same reason.
    TokenExpired,
    /// Any other authentication failure.
    Rejected,
}

/// Everything that can happen to the link. Fed in by the transport driver and the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// The caller wants the link up.
    Open,
    /// The socket handshake completed.
    TransportUp,
    /// The socket dropped without an auth signal: network trouble, server restart, idle timeout.
    TransportLost,
    /// The server turned the connection away.
    AuthFailed(AuthFailure),
    RefreshSucceeded,
    RefreshFailed,
    /// Start watching a room. Tracked across reconnects.
    Watch(String),
    /// Stop watching a room.
    Unwatch(String),
}

/// What the transport driver must do next, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkCommand {
    /// Dial the socket with the current access token.
    OpenSocket,
    /// Call the token refresh endpoint and report back with a refresh event.
    RefreshToken,
    /// Send a join for the room on the open socket.
    JoinRoom(String),
    /// Send a leave for the room on the open socket.
    LeaveRoom(String),
    /// The link is beyond saving. Surface a log-in-again condition.
    GiveUp,
}

/// The reconnect state machine. See the module docs for the rules it enforces.
#[derive(Debug, Clone)]
pub struct SessionLink {
    state: LinkState,
    rooms: BTreeSet<String>,
    reconnects_left: u8,
    refresh_spent: bool,
}

impl Default for SessionLink {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLink {
    pub fn new() -> Self {
        Self { state: LinkState::Disconnected, rooms: BTreeSet::new(), reconnects_left: 1, refresh_spent: false }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// The rooms the link is watching, in the order joins are emitted.
    pub fn rooms(&self) -> impl Iterator<Item = &str> {
        self.rooms.iter().map(String::as_str)
    }

    /// Feeds one event through the machine and returns the commands the driver must carry out.
    pub fn handle(&mut self, event: LinkEvent) -> Vec<LinkCommand> {
        if self.state == LinkState::Terminal {
            return Vec::new();
        }
        match event {
            LinkEvent::Open => self.open(),
            LinkEvent::TransportUp => self.transport_up(),
            LinkEvent::TransportLost => self.transport_lost(),
            LinkEvent::AuthFailed(failure) => self.auth_failed(failure),
            LinkEvent::RefreshSucceeded => self.refresh_finished(true),
            LinkEvent::RefreshFailed => self.refresh_finished(false),
            LinkEvent::Watch(room) => self.watch(room),
            LinkEvent::Unwatch(room) => self.unwatch(room),
        }
    }

    fn open(&mut self) -> Vec<LinkCommand> {
        if self.state != LinkState::Disconnected {
            return Vec::new();
        }
        self.state = LinkState::Connecting;
        self.reconnects_left = 1;
        self.refresh_spent = false;
        vec![LinkCommand::OpenSocket]
    }

    fn transport_up(&mut self) -> Vec<LinkCommand> {
        if self.state != LinkState::Connecting {
            return Vec::new();
        }
        self.state = LinkState::Connected;
        self.reconnects_left = 1;
        self.refresh_spent = false;
        self.rooms.iter().cloned().map(LinkCommand::JoinRoom).collect()
    }

    fn transport_lost(&mut self) -> Vec<LinkCommand> {
        match self.state {
            LinkState::Connected | LinkState::Connecting if self.reconnects_left > 0 => {
                self.reconnects_left -= 1;
                self.state = LinkState::Connecting;
                vec![LinkCommand::OpenSocket]
            },
            LinkState::Connected | LinkState::Connecting => {
                self.state = LinkState::Disconnected;
                Vec::new()
            },
            _ => Vec::new(),
        }
    }

    fn auth_failed(&mut self, failure: AuthFailure) -> Vec<LinkCommand> {
        match self.state {
            LinkState::Connected | LinkState::Connecting => match failure {
                AuthFailure::TokenExpired if !self.refresh_spent => {
                    self.refresh_spent = true;
                    self.state = LinkState::Refreshing;
                    vec![LinkCommand::RefreshToken]
                },
                _ => {
                    self.state = LinkState::Terminal;
                    vec![LinkCommand::GiveUp]
                },
            },
            _ => Vec::new(),
        }
    }

    fn refresh_finished(&mut self, succeeded: bool) -> Vec<LinkCommand> {
        if self.state != LinkState::Refreshing {
            return Vec::new();
        }
        if succeeded {
            self.state = LinkState::Connecting;
            vec![LinkCommand::OpenSocket]
        } else {
            self.state = LinkState::Terminal;
            vec![LinkCommand::GiveUp]
        }
    }

    fn watch(&mut self, room: String) -> Vec<LinkCommand> {
        let added = self.rooms.insert(room.clone());
        if added && self.state == LinkState::Connected {
            vec![LinkCommand::JoinRoom(room)]
        } else {
            Vec::new()
        }
    }

    fn unwatch(&mut self, room: String) -> Vec<LinkCommand> {
        let removed = self.rooms.remove(&room);
        if removed && self.state == LinkState::Connected {
            vec![LinkCommand::LeaveRoom(room)]
        } else {
            Vec::new()
        }
    }
}
