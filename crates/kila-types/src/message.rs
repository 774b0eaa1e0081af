//! Inbox messages between camp staff and families.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{MessageId, UserId};

/// One delivered message. Broadcasts are stored once per recipient.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub recipient_id: UserId,
    pub sender_name: String,
    pub sender_avatar_url: Option<String>,
    pub body: String,
    pub is_broadcast: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for sending one message body to several recipients.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub sender_id: UserId,
    pub sender_name: String,
    pub sender_avatar_url: Option<String>,
    pub recipient_ids: Vec<UserId>,
    pub body: String,
    pub is_broadcast: bool,
}

/// Newest timestamp among messages addressed to `user`.
pub fn latest_received(messages: &[Message], user: UserId) -> Option<DateTime<Utc>> {
    messages
        .iter()
        .filter(|message| message.recipient_id == user)
        .map(|message| message.created_at)
        .max()
}
