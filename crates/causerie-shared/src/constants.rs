//! Protocol-level limits and intervals.

/// Maximum messages retained per group; the oldest are evicted past this.
pub const MAX_HISTORY: usize = 1000;

/// Maximum length of a text message body, in characters.
pub const MAX_MESSAGE_LEN: usize = 1000;

/// Number of messages replayed to a connection when it joins a group.
pub const HISTORY_REPLAY_LIMIT: usize = 50;

/// Interval between pin-expiry sweeps, in seconds.
pub const PIN_SWEEP_INTERVAL_SECS: u64 = 60;

/// Pin duration used when a client omits one.
pub const DEFAULT_PIN_DURATION_DAYS: i64 = 1;

/// Longest accepted pin duration (ten years).
pub const MAX_PIN_DURATION_DAYS: i64 = 3650;

/// Maximum uploaded media size (50 MiB).
pub const MAX_MEDIA_SIZE: usize = 50 * 1024 * 1024;
