use serde::{Deserialize, Serialize};

use crate::types::{
    GroupId, Message, MessageContent, MessageId, PinnedEntry, ReactionMap, UserId,
};

use std::collections::BTreeSet;

/// Events a connection may send to the server.
///
/// Wire form is adjacently tagged JSON: `{"event": "...", "data": {...}}`,
/// validated at the transport boundary before reaching the hub.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    Authenticate {
        token: String,
    },
    JoinGroup {
        group_id: GroupId,
    },
    LeaveGroup {
        group_id: GroupId,
    },
    NewMessage {
        group_id: GroupId,
        content: MessageContent,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reply_to: Option<MessageId>,
    },
    ToggleReaction {
        group_id: GroupId,
        message_id: MessageId,
        emoji: String,
    },
    MarkSeen {
        group_id: GroupId,
        message_id: MessageId,
    },
    Typing {
        group_id: GroupId,
        is_typing: bool,
    },
    DeleteMessage {
        group_id: GroupId,
        message_id: MessageId,
    },
    PinMessage {
        group_id: GroupId,
        message_id: MessageId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_days: Option<i64>,
    },
}

/// Events the server pushes to connections.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    /// Presence list, broadcast to every authenticated connection. The
    /// payload is the bare id list.
    OnlineUsers(BTreeSet<UserId>),

    /// Unicast reply to a successful `joinGroup`.
    GroupHistory {
        group_id: GroupId,
        messages: Vec<Message>,
        pinned_entries: Vec<PinnedEntry>,
    },

    /// A freshly appended message; the payload is the message itself.
    MessageReceived(Message),

    ReactionUpdate {
        group_id: GroupId,
        message_id: MessageId,
        reactions: ReactionMap,
    },

    SeenUpdate {
        group_id: GroupId,
        message_id: MessageId,
        seen_by: BTreeSet<UserId>,
    },

    UserTyping {
        group_id: GroupId,
        user_id: UserId,
        is_typing: bool,
    },

    MessageDeleted {
        group_id: GroupId,
        message_id: MessageId,
    },

    PinnedUpdate {
        group_id: GroupId,
        pins: Vec<PinnedEntry>,
    },

    /// Unicast failure report for a rejected client event.
    Error { code: String, message: String },
}

impl ServerEvent {
    pub fn error(err: &crate::error::ChatError) -> Self {
        ServerEvent::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessageContent;

    #[test]
    fn test_client_event_roundtrip() {
        let event = ClientEvent::NewMessage {
            group_id: GroupId("general".to_string()),
            content: MessageContent::Text {
                body: "hi".to_string(),
            },
            reply_to: None,
        };

        let json = serde_json::to_string(&event).unwrap();
        let restored: ClientEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, restored);
    }

    #[test]
    fn test_event_names_match_protocol_vocabulary() {
        let event = ClientEvent::ToggleReaction {
            group_id: GroupId("general".to_string()),
            message_id: MessageId::new(),
            emoji: "👍".to_string(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "toggleReaction");
        assert!(value["data"].get("messageId").is_some());
        assert!(value["data"].get("groupId").is_some());

        let event = ServerEvent::OnlineUsers(BTreeSet::from([UserId::new("alice")]));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "onlineUsers");
        // Bare id list, not an object wrapper.
        assert_eq!(value["data"], serde_json::json!(["alice"]));
    }

    #[test]
    fn test_message_received_payload_is_the_message() {
        let message = Message {
            id: MessageId::new(),
            group_id: GroupId("general".to_string()),
            author_id: UserId::new("alice"),
            created_at: chrono::Utc::now(),
            content: MessageContent::Text {
                body: "hi".to_string(),
            },
            reply_to: None,
            reactions: ReactionMap::new(),
            seen_by: BTreeSet::from([UserId::new("alice")]),
        };

        let value = serde_json::to_value(ServerEvent::MessageReceived(message)).unwrap();
        assert_eq!(value["event"], "messageReceived");
        assert_eq!(value["data"]["body"], "hi");
        assert_eq!(value["data"]["authorId"], "alice");
    }

    #[test]
    fn test_unknown_event_rejected() {
        let raw = r#"{"event": "shellAccess", "data": {}}"#;
        assert!(serde_json::from_str::<ClientEvent>(raw).is_err());
    }
}
