//! # causerie-core
//!
//! In-memory stores for the group-messaging core: user identities, group
//! membership, per-group bounded message history, and time-expiring pins.
//!
//! Every store is a plain synchronous data structure that validates fully
//! before mutating (a rejected operation leaves state unchanged). Locking is
//! the caller's concern; the server wraps group-scoped state in per-group
//! mutexes so unrelated groups proceed concurrently.

pub mod identity;
pub mod log;
pub mod pins;
pub mod registry;

pub use identity::IdentityStore;
pub use log::MessageLog;
pub use pins::PinBoard;
pub use registry::GroupRegistry;
