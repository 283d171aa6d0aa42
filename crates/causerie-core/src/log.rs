//! Per-group bounded message history.

use std::collections::{BTreeSet, VecDeque};

use chrono::Utc;
use tracing::debug;

use causerie_shared::constants::{MAX_HISTORY, MAX_MESSAGE_LEN};
use causerie_shared::error::{ChatError, Result};
use causerie_shared::types::{
    GroupId, Message, MessageContent, MessageId, ReactionMap, UserId,
};

/// Ordered, size-bounded history for one group.
///
/// Owns the reaction and seen-by sub-state of every message it holds.
/// Membership gating happens at the session hub; by the time an operation
/// reaches the log, its actor is already authorized for the group.
#[derive(Debug)]
pub struct MessageLog {
    group_id: GroupId,
    max_history: usize,
    entries: VecDeque<Message>,
}

impl MessageLog {
    pub fn new(group_id: GroupId) -> Self {
        Self::with_max(group_id, MAX_HISTORY)
    }

    pub fn with_max(group_id: GroupId, max_history: usize) -> Self {
        Self {
            group_id,
            max_history,
            entries: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a message, assigning a fresh id and timestamp.
    ///
    /// The author starts in `seen_by`; reactions start empty. Once the bound
    /// is exceeded the oldest entries are evicted silently, taking their
    /// reaction/seen state with them.
    pub fn append(
        &mut self,
        author_id: &UserId,
        content: MessageContent,
        reply_to: Option<MessageId>,
    ) -> Result<Message> {
        let content = validate_content(content)?;

        let message = Message {
            id: MessageId::new(),
            group_id: self.group_id.clone(),
            author_id: author_id.clone(),
            created_at: Utc::now(),
            content,
            reply_to,
            reactions: ReactionMap::new(),
            seen_by: BTreeSet::from([author_id.clone()]),
        };

        self.entries.push_back(message.clone());
        while self.entries.len() > self.max_history {
            let evicted = self.entries.pop_front();
            if let Some(m) = evicted {
                debug!(group = %self.group_id, message = %m.id, "Evicted oldest message");
            }
        }

        Ok(message)
    }

    pub fn get(&self, id: MessageId) -> Result<&Message> {
        self.entries
            .iter()
            .find(|m| m.id == id)
            .ok_or_else(|| ChatError::NotFound(format!("message {id}")))
    }

    /// Hard-delete a message. Permitted for its author or a group admin.
    ///
    /// Returns the removed message so the caller can cascade (active pins,
    /// broadcast). Reaction and seen-by state go with it.
    pub fn delete(
        &mut self,
        id: MessageId,
        acting_user: &UserId,
        acting_as_admin: bool,
    ) -> Result<Message> {
        let index = self
            .entries
            .iter()
            .position(|m| m.id == id)
            .ok_or_else(|| ChatError::NotFound(format!("message {id}")))?;

        if self.entries[index].author_id != *acting_user && !acting_as_admin {
            return Err(ChatError::PermissionDenied);
        }

        self.entries
            .remove(index)
            .ok_or_else(|| ChatError::Internal("message index out of bounds".to_string()))
    }

    /// Toggle `user_id`'s reaction with `emoji` and return the new snapshot.
    ///
    /// Adding when absent, removing when present; an emoji key whose set
    /// becomes empty is dropped. Toggles from different users touch disjoint
    /// entries, so they commute.
    pub fn toggle_reaction(
        &mut self,
        id: MessageId,
        user_id: &UserId,
        emoji: &str,
    ) -> Result<ReactionMap> {
        if emoji.is_empty() || emoji.chars().count() > 8 {
            return Err(ChatError::Malformed("invalid emoji".to_string()));
        }

        let message = self.get_mut(id)?;
        let users = message.reactions.entry(emoji.to_string()).or_default();
        if !users.insert(user_id.clone()) {
            users.remove(user_id);
        }
        if message.reactions.get(emoji).is_some_and(|s| s.is_empty()) {
            message.reactions.remove(emoji);
        }

        Ok(message.reactions.clone())
    }

    /// Record that `user_id` has seen the message.
    ///
    /// Returns the updated set only when it actually changed; `None` means
    /// the caller should not broadcast.
    pub fn mark_seen(&mut self, id: MessageId, user_id: &UserId) -> Result<Option<BTreeSet<UserId>>> {
        let message = self.get_mut(id)?;
        if message.seen_by.insert(user_id.clone()) {
            Ok(Some(message.seen_by.clone()))
        } else {
            Ok(None)
        }
    }

    /// The most recent `limit` messages, oldest first for display.
    pub fn recent(&self, limit: usize) -> Vec<Message> {
        let start = self.entries.len().saturating_sub(limit);
        self.entries.iter().skip(start).cloned().collect()
    }

    fn get_mut(&mut self, id: MessageId) -> Result<&mut Message> {
        self.entries
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| ChatError::NotFound(format!("message {id}")))
    }
}

fn validate_content(content: MessageContent) -> Result<MessageContent> {
    match content {
        MessageContent::Text { body } => {
            let body = body.trim().to_string();
            if body.is_empty() {
                return Err(ChatError::Malformed("empty message".to_string()));
            }
            if body.chars().count() > MAX_MESSAGE_LEN {
                return Err(ChatError::Malformed(format!(
                    "message exceeds {MAX_MESSAGE_LEN} characters"
                )));
            }
            Ok(MessageContent::Text { body })
        }
        MessageContent::Image { ref url } | MessageContent::Video { ref url } => {
            if url.trim().is_empty() {
                return Err(ChatError::Malformed("empty media reference".to_string()));
            }
            Ok(content)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log() -> MessageLog {
        MessageLog::new(GroupId("general".to_string()))
    }

    fn text(body: &str) -> MessageContent {
        MessageContent::Text {
            body: body.to_string(),
        }
    }

    #[test]
    fn test_append_initializes_seen_by_with_author() {
        let mut log = log();
        let msg = log.append(&UserId::new("alice"), text("hi"), None).unwrap();
        assert_eq!(msg.seen_by, BTreeSet::from([UserId::new("alice")]));
        assert!(msg.reactions.is_empty());
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_empty_and_oversize_text_rejected() {
        let mut log = log();
        assert!(matches!(
            log.append(&UserId::new("alice"), text("   "), None),
            Err(ChatError::Malformed(_))
        ));
        let long = "x".repeat(MAX_MESSAGE_LEN + 1);
        assert!(matches!(
            log.append(&UserId::new("alice"), text(&long), None),
            Err(ChatError::Malformed(_))
        ));
        assert!(log.is_empty());
    }

    #[test]
    fn test_bounded_history_evicts_oldest() {
        let mut log = MessageLog::with_max(GroupId("general".to_string()), 5);
        let alice = UserId::new("alice");
        for i in 0..8 {
            log.append(&alice, text(&format!("m{i}")), None).unwrap();
        }

        assert_eq!(log.len(), 5);
        let bodies: Vec<_> = log
            .recent(10)
            .into_iter()
            .map(|m| match m.content {
                MessageContent::Text { body } => body,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(bodies, vec!["m3", "m4", "m5", "m6", "m7"]);
    }

    #[test]
    fn test_recent_returns_tail_oldest_first() {
        let mut log = log();
        let alice = UserId::new("alice");
        for i in 0..4 {
            log.append(&alice, text(&format!("m{i}")), None).unwrap();
        }

        let recent = log.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, text("m2"));
        assert_eq!(recent[1].content, text("m3"));
    }

    #[test]
    fn test_toggle_reaction_idempotence() {
        let mut log = log();
        let alice = UserId::new("alice");
        let bob = UserId::new("bob");
        let msg = log.append(&alice, text("hi"), None).unwrap();

        let after_one = log.toggle_reaction(msg.id, &bob, "👍").unwrap();
        assert_eq!(after_one["👍"], BTreeSet::from([bob.clone()]));

        let after_two = log.toggle_reaction(msg.id, &bob, "👍").unwrap();
        assert!(after_two.is_empty());
    }

    #[test]
    fn test_toggle_reaction_disjoint_users_commute() {
        let alice = UserId::new("alice");
        let bob = UserId::new("bob");
        let carol = UserId::new("carol");

        let mut forward = log();
        let msg = forward.append(&alice, text("hi"), None).unwrap();
        forward.toggle_reaction(msg.id, &bob, "🔥").unwrap();
        let end_forward = forward.toggle_reaction(msg.id, &carol, "🔥").unwrap();

        let mut reverse = log();
        let msg = reverse.append(&alice, text("hi"), None).unwrap();
        reverse.toggle_reaction(msg.id, &carol, "🔥").unwrap();
        let end_reverse = reverse.toggle_reaction(msg.id, &bob, "🔥").unwrap();

        assert_eq!(end_forward["🔥"], end_reverse["🔥"]);
        assert_eq!(end_forward["🔥"], BTreeSet::from([bob, carol]));
    }

    #[test]
    fn test_empty_emoji_key_dropped() {
        let mut log = log();
        let alice = UserId::new("alice");
        let msg = log.append(&alice, text("hi"), None).unwrap();

        log.toggle_reaction(msg.id, &alice, "😀").unwrap();
        let reactions = log.toggle_reaction(msg.id, &alice, "😀").unwrap();
        assert!(!reactions.contains_key("😀"));
    }

    #[test]
    fn test_mark_seen_reports_change_once() {
        let mut log = log();
        let alice = UserId::new("alice");
        let bob = UserId::new("bob");
        let msg = log.append(&alice, text("hi"), None).unwrap();

        let first = log.mark_seen(msg.id, &bob).unwrap();
        assert_eq!(
            first,
            Some(BTreeSet::from([alice.clone(), bob.clone()]))
        );

        // Second call is a no-op: no snapshot, no broadcast.
        assert_eq!(log.mark_seen(msg.id, &bob).unwrap(), None);
    }

    #[test]
    fn test_delete_permissions() {
        let mut log = log();
        let alice = UserId::new("alice");
        let bob = UserId::new("bob");
        let msg = log.append(&alice, text("hi"), None).unwrap();

        assert_eq!(
            log.delete(msg.id, &bob, false),
            Err(ChatError::PermissionDenied)
        );
        assert_eq!(log.len(), 1);

        // Group admin may delete someone else's message.
        let removed = log.delete(msg.id, &bob, true).unwrap();
        assert_eq!(removed.id, msg.id);
        assert!(log.is_empty());
    }

    #[test]
    fn test_deleted_message_is_gone() {
        let mut log = log();
        let alice = UserId::new("alice");
        let msg = log.append(&alice, text("hi"), None).unwrap();
        log.delete(msg.id, &alice, false).unwrap();

        assert!(matches!(log.get(msg.id), Err(ChatError::NotFound(_))));
        assert!(matches!(
            log.toggle_reaction(msg.id, &alice, "👍"),
            Err(ChatError::NotFound(_))
        ));
    }

    #[test]
    fn test_author_deletes_own_message() {
        let mut log = log();
        let alice = UserId::new("alice");
        let msg = log.append(&alice, text("hi"), None).unwrap();
        assert!(log.delete(msg.id, &alice, false).is_ok());
    }
}
