//! # causerie-shared
//!
//! Types shared between the Causerie server and its clients: identifiers,
//! domain models, the client/server event protocol, signed access tokens,
//! and the error taxonomy.

pub mod auth;
pub mod constants;
pub mod error;
pub mod protocol;
pub mod types;

pub use error::ChatError;
