//! Time-expiring pinned messages for one group.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use causerie_shared::constants::MAX_PIN_DURATION_DAYS;
use causerie_shared::error::{ChatError, Result};
use causerie_shared::types::{GroupId, MessageId, PinnedEntry, UserId};

/// Active pins for one group.
///
/// A message holds at most one active pin; re-pinning replaces the previous
/// entry. Expiry is not an error: entries are dropped lazily on read and by
/// the periodic sweep.
#[derive(Debug)]
pub struct PinBoard {
    group_id: GroupId,
    pins: Vec<PinnedEntry>,
}

impl PinBoard {
    pub fn new(group_id: GroupId) -> Self {
        Self {
            group_id,
            pins: Vec::new(),
        }
    }

    /// Pin a message for `duration_days`. The admin gate and the check that
    /// the message exists both happen at the hub, which sees log and board
    /// under the same group lock.
    pub fn pin(
        &mut self,
        message_id: MessageId,
        pinned_by: &UserId,
        duration_days: i64,
    ) -> Result<PinnedEntry> {
        // Bounded on both ends: chrono's Duration::days panics far past the
        // upper limit, and the value arrives straight off the wire.
        if !(1..=MAX_PIN_DURATION_DAYS).contains(&duration_days) {
            return Err(ChatError::Malformed(format!(
                "pin duration must be between 1 and {MAX_PIN_DURATION_DAYS} days"
            )));
        }

        let now = Utc::now();
        let entry = PinnedEntry {
            message_id,
            group_id: self.group_id.clone(),
            pinned_by: pinned_by.clone(),
            pinned_at: now,
            expires_at: now + Duration::days(duration_days),
        };

        // Replace, never duplicate, any prior entry for this message.
        self.pins.retain(|p| p.message_id != message_id);
        self.pins.push(entry.clone());
        Ok(entry)
    }

    /// Drop any active pin for a deleted message. Returns whether the active
    /// set changed.
    pub fn unpin(&mut self, message_id: MessageId) -> bool {
        let before = self.pins.len();
        self.pins.retain(|p| p.message_id != message_id);
        self.pins.len() != before
    }

    /// The current active set, lazily dropping expired entries.
    pub fn active_pins(&mut self) -> Vec<PinnedEntry> {
        self.sweep_expired(Utc::now());
        self.pins.clone()
    }

    /// Remove entries expired as of `now`. Returns the new active set when
    /// anything was dropped, so the caller can broadcast it.
    pub fn sweep_expired(&mut self, now: DateTime<Utc>) -> Option<Vec<PinnedEntry>> {
        let before = self.pins.len();
        self.pins.retain(|p| p.is_active(now));
        if self.pins.len() == before {
            return None;
        }
        debug!(
            group = %self.group_id,
            dropped = before - self.pins.len(),
            "Expired pins swept"
        );
        Some(self.pins.clone())
    }
}
