//! Inbox and the "seen" signal behind unread badges.
//!
//! Opening the inbox records the newest received timestamp as seen and
//! publishes an [`InboxSeen`] on [`InboxSignals`]. Badge components hold an
//! [`InboxSubscription`] for their user and recheck [`has_unread`] whenever a
//! signal arrives.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use kila_types::{Message, OutgoingMessage, Principal, UserId, latest_received};

use crate::error::{EditorError, EditorResult};
use crate::store::MessageStore;

/// Published when a user has looked at their inbox.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InboxSeen {
    pub user_id: UserId,
    /// Newest received message at the time; `None` for an empty inbox.
    pub seen_at: Option<DateTime<Utc>>,
}

/// Publish/subscribe bus for inbox-seen signals, plus the last seen
/// timestamp per user.
#[derive(Clone)]
pub struct InboxSignals {
    tx: broadcast::Sender<InboxSeen>,
    seen: Arc<RwLock<HashMap<UserId, DateTime<Utc>>>>,
}

impl InboxSignals {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            seen: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Record what `user_id` has seen and notify subscribers.
    ///
    /// The stored value never moves backwards. Returns the number of
    /// subscribers notified.
    pub fn mark_seen(&self, user_id: UserId, seen_at: Option<DateTime<Utc>>) -> usize {
        if let Some(at) = seen_at {
            let mut seen = self.seen.write();
            let entry = seen.entry(user_id).or_insert(at);
            if at > *entry {
                *entry = at;
            }
        }
        self.tx.send(InboxSeen { user_id, seen_at }).unwrap_or(0)
    }

    pub fn seen_at(&self, user_id: UserId) -> Option<DateTime<Utc>> {
        self.seen.read().get(&user_id).copied()
    }

    /// Signals for one user only.
    pub fn subscribe(&self, user_id: UserId) -> InboxSubscription {
        InboxSubscription {
            user_id,
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for InboxSignals {
    fn default() -> Self {
        Self::new(64)
    }
}

impl std::fmt::Debug for InboxSignals {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboxSignals")
            .field("subscribers", &self.tx.receiver_count())
            .finish_non_exhaustive()
    }
}

/// A badge's view of the bus.
pub struct InboxSubscription {
    user_id: UserId,
    rx: broadcast::Receiver<InboxSeen>,
}

impl InboxSubscription {
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Next signal for this user. `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<InboxSeen> {
        loop {
            match self.rx.recv().await {
                Ok(seen) if seen.user_id == self.user_id => return Some(seen),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(user_id = %self.user_id, lagged = n, "inbox subscription lagged behind");
                }
            }
        }
    }

    /// Next pending signal for this user, without waiting.
    pub fn try_recv(&mut self) -> Option<InboxSeen> {
        loop {
            match self.rx.try_recv() {
                Ok(seen) if seen.user_id == self.user_id => return Some(seen),
                Ok(_) => {}
                Err(broadcast::error::TryRecvError::Empty)
                | Err(broadcast::error::TryRecvError::Closed) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!(user_id = %self.user_id, lagged = n, "inbox subscription lagged behind");
                }
            }
        }
    }
}

impl std::fmt::Debug for InboxSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboxSubscription")
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

// ── Operations ─────────────────────────────────────────────────────────────

/// List a user's messages (newest first) and mark them seen.
pub async fn open_inbox(
    store: &dyn MessageStore,
    signals: &InboxSignals,
    user_id: UserId,
) -> EditorResult<Vec<Message>> {
    let messages = store
        .list_messages_for_user(user_id)
        .await
        .map_err(EditorError::LoadFailed)?;
    let seen_at = latest_received(&messages, user_id);
    let notified = signals.mark_seen(user_id, seen_at);
    debug!(%user_id, count = messages.len(), notified, "inbox opened");
    Ok(messages)
}

/// Whether the user has received anything newer than what they last saw.
pub async fn has_unread(
    store: &dyn MessageStore,
    signals: &InboxSignals,
    user_id: UserId,
) -> EditorResult<bool> {
    let latest = store
        .latest_inbox_timestamp(user_id)
        .await
        .map_err(EditorError::LoadFailed)?;
    Ok(match (latest, signals.seen_at(user_id)) {
        (None, _) => false,
        (Some(_), None) => true,
        (Some(latest), Some(seen)) => latest > seen,
    })
}

/// Send one body to several recipients. Staff only.
pub async fn send_message(
    store: &dyn MessageStore,
    sender: &Principal,
    recipient_ids: Vec<UserId>,
    body: &str,
) -> EditorResult<()> {
    if !sender.role.is_staff() {
        return Err(EditorError::permission_denied(format!(
            "{} may not send messages",
            sender.name
        )));
    }
    let is_broadcast = recipient_ids.len() > 1;
    store
        .send_message(OutgoingMessage {
            sender_id: sender.id,
            sender_name: sender.name.clone(),
            sender_avatar_url: None,
            recipient_ids,
            body: body.to_string(),
            is_broadcast,
        })
        .await
        .map_err(EditorError::Mutation)
}
