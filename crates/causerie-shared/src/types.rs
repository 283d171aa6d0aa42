use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// User identity = normalized (lowercase) unique handle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub String);

impl UserId {
    /// Build a user id from raw input, normalizing case and whitespace.
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(pub String);

impl GroupId {
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Collision-resistant message id (UUID v4, never wall-clock derived).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one live transport connection (not a user: multi-device).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    Member,
    Admin,
    SuperAdmin,
}

impl Role {
    pub fn is_super_admin(&self) -> bool {
        matches!(self, Role::SuperAdmin)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Admin => "admin",
            Role::SuperAdmin => "superAdmin",
        }
    }
}

/// Verified identity claims for the actor performing an operation.
///
/// Produced only from a successful credential check or token verification;
/// store operations trust these claims and never re-authenticate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
}

/// Public view of a user; the stored credential never leaves the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    pub display_name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GroupSettings {
    pub allow_media: bool,
    /// Maximum member count; `0` means unlimited.
    pub max_members: usize,
}

impl Default for GroupSettings {
    fn default() -> Self {
        Self {
            allow_media: true,
            max_members: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub description: String,
    pub member_ids: BTreeSet<UserId>,
    pub admin_ids: BTreeSet<UserId>,
    pub is_default: bool,
    pub settings: GroupSettings,
    pub created_at: DateTime<Utc>,
}

/// `emoji -> users who reacted with it`; empty sets are never kept.
pub type ReactionMap = BTreeMap<String, BTreeSet<UserId>>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum MessageContent {
    Text { body: String },
    Image { url: String },
    Video { url: String },
}

impl MessageContent {
    pub fn is_media(&self) -> bool {
        !matches!(self, MessageContent::Text { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub group_id: GroupId,
    pub author_id: UserId,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub content: MessageContent,
    pub reply_to: Option<MessageId>,
    pub reactions: ReactionMap,
    pub seen_by: BTreeSet<UserId>,
}

/// A time-limited highlight of an existing message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PinnedEntry {
    pub message_id: MessageId,
    pub group_id: GroupId,
    pub pinned_by: UserId,
    pub pinned_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PinnedEntry {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now <= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_normalization() {
        assert_eq!(UserId::new("  Alice "), UserId::new("alice"));
    }

    #[test]
    fn test_message_content_tagging() {
        let text = MessageContent::Text {
            body: "hi".to_string(),
        };
        let json = serde_json::to_value(&text).unwrap();
        assert_eq!(json["kind"], "text");

        let video = MessageContent::Video {
            url: "/media/abc".to_string(),
        };
        let json = serde_json::to_value(&video).unwrap();
        assert_eq!(json["kind"], "video");
        assert_eq!(json["url"], "/media/abc");
    }

    #[test]
    fn test_pin_active_window() {
        let now = Utc::now();
        let pin = PinnedEntry {
            message_id: MessageId::new(),
            group_id: GroupId("general".to_string()),
            pinned_by: UserId::new("carol"),
            pinned_at: now,
            expires_at: now + chrono::Duration::days(1),
        };
        assert!(pin.is_active(now));
        assert!(!pin.is_active(now + chrono::Duration::days(2)));
    }
}
