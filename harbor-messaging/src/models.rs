use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::{conversation_members, conversations, message_receipts, messages};

// --- Conversation ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = conversations)]
pub struct Conversation {
    pub id: Uuid,
    pub is_group: bool,
    #[serde(skip_serializing)]
    pub dm_key: Option<String>,
    pub name: Option<String>,
    pub image_url: Option<String>,
    pub admin_id: Option<Uuid>,
    pub last_message_preview: Option<String>,
    pub last_message_sender: Option<Uuid>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = conversations)]
pub struct NewConversation {
    pub id: Uuid,
    pub is_group: bool,
    pub dm_key: Option<String>,
    pub name: Option<String>,
    pub image_url: Option<String>,
    pub admin_id: Option<Uuid>,
}

impl NewConversation {
    /// An individual (1:1) conversation, identified by its canonical dm_key.
    pub fn individual(dm_key: String) -> Self {
        Self {
            id: Uuid::now_v7(),
            is_group: false,
            dm_key: Some(dm_key),
            name: None,
            image_url: None,
            admin_id: None,
        }
    }

    /// A group conversation; the creator starts as admin.
    pub fn group(name: String, image_url: Option<String>, admin_id: Uuid) -> Self {
        Self {
            id: Uuid::now_v7(),
            is_group: true,
            dm_key: None,
            name: Some(name),
            image_url,
            admin_id: Some(admin_id),
        }
    }
}

// --- ConversationMember ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = conversation_members)]
pub struct ConversationMember {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub unread_count: i32,
    pub joined_at: DateTime<Utc>,
    pub last_read_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = conversation_members)]
pub struct NewConversationMember {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
}

// --- Message ---

/// Delivery state. The only transition is `sent -> seen`, made when any
/// recipient acknowledges the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sent,
    Seen,
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageStatus::Sent => write!(f, "sent"),
            MessageStatus::Seen => write!(f, "seen"),
        }
    }
}

impl std::str::FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(MessageStatus::Sent),
            "seen" => Ok(MessageStatus::Seen),
            _ => Err(format!("unknown message status: {s}")),
        }
    }
}

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = messages)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: Option<String>,
    pub media_url: Option<String>,
    pub media_type: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = messages)]
pub struct NewMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: Option<String>,
    pub media_url: Option<String>,
    pub media_type: Option<String>,
    pub status: String,
}

impl NewMessage {
    /// Message ids are v7 uuids so id ordering follows creation time; the
    /// message list cursor relies on this.
    pub fn new(
        conversation_id: Uuid,
        sender_id: Uuid,
        content: Option<String>,
        media_url: Option<String>,
        media_type: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            conversation_id,
            sender_id,
            content,
            media_url,
            media_type,
            status: MessageStatus::Sent.to_string(),
        }
    }
}

// --- MessageReceipt ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = message_receipts)]
pub struct MessageReceipt {
    pub id: Uuid,
    pub message_id: Uuid,
    pub user_id: Uuid,
    pub seen_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = message_receipts)]
pub struct NewMessageReceipt {
    pub message_id: Uuid,
    pub user_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_status_rejects_unknown_values() {
        assert!("delivered".parse::<MessageStatus>().is_err());
        assert_eq!("sent".parse::<MessageStatus>().unwrap(), MessageStatus::Sent);
        assert_eq!("seen".parse::<MessageStatus>().unwrap(), MessageStatus::Seen);
    }

    #[test]
    fn new_messages_start_as_sent() {
        let msg = NewMessage::new(Uuid::now_v7(), Uuid::now_v7(), Some("hi".into()), None, None);
        assert_eq!(msg.status, MessageStatus::Sent.to_string());
    }
}
