//! Chat message model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ConversationId, MessageId, TempId, UserId};

/// A confirmed, server-assigned chat line. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Row inserted when sending
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewMessage {
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub content: String,
}

/// A locally echoed message awaiting server confirmation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMessage {
    pub temp_id: TempId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub content: String,
    /// Client clock
    pub created_at: DateTime<Utc>,
}

impl PendingMessage {
    #[must_use]
    pub fn new(conversation_id: ConversationId, sender_id: UserId, content: String) -> Self {
        Self {
            temp_id: TempId::new(),
            conversation_id,
            sender_id,
            content,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn to_insert(&self) -> NewMessage {
        NewMessage {
            conversation_id: self.conversation_id,
            sender_id: self.sender_id,
            content: self.content.clone(),
        }
    }
}

/// One visible row of a message feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEntry {
    Pending(PendingMessage),
    Confirmed(Message),
}

impl FeedEntry {
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    #[must_use]
    pub fn content(&self) -> &str {
        match self {
            Self::Pending(pending) => &pending.content,
            Self::Confirmed(message) => &message.content,
        }
    }

    #[must_use]
    pub const fn sender_id(&self) -> UserId {
        match self {
            Self::Pending(pending) => pending.sender_id,
            Self::Confirmed(message) => message.sender_id,
        }
    }

    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        match self {
            Self::Pending(pending) => pending.created_at,
            Self::Confirmed(message) => message.created_at,
        }
    }

    #[must_use]
    pub const fn message_id(&self) -> Option<MessageId> {
        match self {
            Self::Pending(_) => None,
            Self::Confirmed(message) => Some(message.id),
        }
    }

    #[must_use]
    pub const fn temp_id(&self) -> Option<TempId> {
        match self {
            Self::Pending(pending) => Some(pending.temp_id),
            Self::Confirmed(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_message_builds_insert_row() {
        let pending = PendingMessage::new(ConversationId::new(), UserId::new(), "Olá".into());
        let row = pending.to_insert();
        assert_eq!(row.content, "Olá");
        assert_eq!(row.sender_id, pending.sender_id);

        let json = serde_json::to_value(&row).unwrap();
        assert!(json.get("id").is_none());
        assert!(json.get("created_at").is_none());
    }

    #[test]
    fn feed_entry_accessors() {
        let pending = PendingMessage::new(ConversationId::new(), UserId::new(), "hi".into());
        let entry = FeedEntry::Pending(pending.clone());
        assert!(entry.is_pending());
        assert_eq!(entry.temp_id(), Some(pending.temp_id));
        assert_eq!(entry.message_id(), None);
        assert_eq!(entry.content(), "hi");
    }
}
