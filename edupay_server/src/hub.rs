//! Room-based push notification hub.
//!
//! Sockets subscribe to named rooms; settlement events get published into rooms. Delivery is
//! best effort. Wallet balances are the source of truth and live in the database; a subscriber
//! that is offline at publish time simply misses the push and catches up by polling
//! `/api/deposit/{id}`. Nothing here blocks, retries, or persists.
//!
//! Two room families exist:
//! * `payment:<transaction_id>` watches one deposit, as a checkout page does.
//! * `user:<user_id>` watches everything belonging to a user, as a dashboard does.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use edupay_engine::db_types::{DepositStatus, DepositTransaction, UserId};
use epg_common::Money;
use log::*;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};

pub type SessionId = u64;

pub fn payment_room(transaction_id: i64) -> String {
    format!("payment:{transaction_id}")
}

pub fn user_room(user_id: UserId) -> String {
    format!("user:{user_id}")
}

/// A push notification as it goes out on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PushEvent {
    #[serde(rename_all = "camelCase")]
    PaymentConfirmed { transaction_id: i64, user_id: UserId, amount: Money, new_balance: Money },
    #[serde(rename_all = "camelCase")]
    DepositClosed { transaction_id: i64, user_id: UserId, status: DepositStatus },
}

impl PushEvent {
    pub fn payment_confirmed(transaction: &DepositTransaction, new_balance: Money) -> Self {
        Self::PaymentConfirmed {
            transaction_id: transaction.id,
            user_id: transaction.user_id,
            amount: transaction.amount,
            new_balance,
        }
    }

    pub fn deposit_closed(transaction: &DepositTransaction) -> Self {
        Self::DepositClosed {
            transaction_id: transaction.id,
            user_id: transaction.user_id,
            status: transaction.status,
        }
    }
}

type RoomMembers = HashMap<SessionId, mpsc::UnboundedSender<PushEvent>>;

#[derive(Clone, Debug, Default)]
pub struct NotificationHub {
    next_session: Arc<AtomicU64>,
    rooms: Arc<RwLock<HashMap<String, RoomMembers>>>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands out the identity a socket uses for all of its subscriptions.
    pub fn register(&self) -> SessionId {
        self.next_session.fetch_add(1, Ordering::Relaxed)
    }

    pub async fn subscribe(&self, room: &str, session: SessionId, sender: mpsc::UnboundedSender<PushEvent>) {
        let mut rooms = self.rooms.write().await;
        rooms.entry(room.to_string()).or_default().insert(session, sender);
        debug!("📬️ Session {session} joined room {room}");
    }

    pub async fn unsubscribe(&self, room: &str, session: SessionId) {
        let mut rooms = self.rooms.write().await;
        if let Some(members) = rooms.get_mut(room) {
            members.remove(&session);
            if members.is_empty() {
                rooms.remove(room);
            }
        }
        debug!("📬️ Session {session} left room {room}");
    }

    /// Takes the session out of every room it joined. Called when its socket closes, for any
    /// reason, so a crashed client leaves nothing behind.
    pub async fn drop_session(&self, session: SessionId) {
        let mut rooms = self.rooms.write().await;
        rooms.retain(|_, members| {
            members.remove(&session);
            !members.is_empty()
        });
        debug!("📬️ Session {session} dropped from all rooms");
    }

    /// Delivers the event to everyone currently in the room and returns how many sends landed.
    /// Subscribers whose receiving half is gone are pruned on the way through.
    pub async fn publish(&self, room: &str, event: PushEvent) -> usize {
        let mut rooms = self.rooms.write().await;
        let Some(members) = rooms.get_mut(room) else {
            trace!("📬️ Nobody in room {room}");
            return 0;
        };
        members.retain(|session, sender| {
            if sender.send(event.clone()).is_ok() {
                true
            } else {
                debug!("📬️ Pruning dead session {session} from room {room}");
                false
            }
        });
        let delivered = members.len();
        if members.is_empty() {
            rooms.remove(room);
        }
        debug!("📬️ Delivered event to {delivered} subscriber(s) in {room}");
        delivered
    }
}
