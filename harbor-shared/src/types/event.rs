use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// RabbitMQ Event envelope wrapping all domain events.
///
/// Routing key format: `harbor.{domain}.{entity}.{action}`
/// Example: `harbor.messaging.message.sent`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event<T: Serialize> {
    pub id: Uuid,
    pub source: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub data: T,
}

impl<T: Serialize> Event<T> {
    pub fn new(source: impl Into<String>, event_type: impl Into<String>, data: T) -> Self {
        Self {
            id: Uuid::now_v7(),
            source: source.into(),
            event_type: event_type.into(),
            timestamp: Utc::now(),
            correlation_id: None,
            user_id: None,
            data,
        }
    }

    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_correlation(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }
}

/// RabbitMQ routing keys
pub mod routing_keys {
    // Auth events
    pub const AUTH_USER_DELETED: &str = "harbor.auth.user.deleted";

    // Messaging events
    pub const MESSAGING_CONVERSATION_CREATED: &str = "harbor.messaging.conversation.created";
    pub const MESSAGING_MESSAGE_SENT: &str = "harbor.messaging.message.sent";
    pub const MESSAGING_CONVERSATION_SEEN: &str = "harbor.messaging.conversation.seen";
    pub const MESSAGING_MEMBER_ADDED: &str = "harbor.messaging.member.added";
    pub const MESSAGING_MEMBER_REMOVED: &str = "harbor.messaging.member.removed";
    pub const MESSAGING_GROUP_UPDATED: &str = "harbor.messaging.group.updated";
}

/// Common event data payloads
pub mod payloads {
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct UserDeleted {
        pub credential_id: Uuid,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ConversationCreated {
        pub conversation_id: Uuid,
        pub is_group: bool,
        pub member_ids: Vec<Uuid>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct MessageSent {
        pub message_id: Uuid,
        pub conversation_id: Uuid,
        pub sender_id: Uuid,
        pub content_preview: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ConversationSeen {
        pub conversation_id: Uuid,
        pub user_id: Uuid,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct MemberChanged {
        pub conversation_id: Uuid,
        pub user_id: Uuid,
        pub actor_id: Uuid,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct GroupUpdated {
        pub conversation_id: Uuid,
        pub actor_id: Uuid,
    }
}
