//! User accounts and role data.

use std::collections::HashMap;

use chrono::Utc;
use subtle::ConstantTimeEq;

use causerie_shared::error::{ChatError, Result};
use causerie_shared::types::{Actor, Role, UserId, UserProfile};

/// One stored account. The opaque credential never leaves this module.
#[derive(Debug, Clone)]
struct UserAccount {
    profile: UserProfile,
    credential: String,
}

/// Maps user identifiers to profile and role data.
///
/// Pure data with lookup/mutation guards; never touches sockets or groups.
#[derive(Debug, Default)]
pub struct IdentityStore {
    accounts: HashMap<UserId, UserAccount>,
}

impl IdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, id: &UserId) -> Result<&UserProfile> {
        self.accounts
            .get(id)
            .map(|a| &a.profile)
            .ok_or_else(|| ChatError::NotFound(format!("user {id}")))
    }

    /// Check a credential in constant time.
    ///
    /// An unknown identifier reports `InvalidCredential` rather than
    /// `NotFound` so callers cannot enumerate accounts.
    pub fn verify(&self, id: &UserId, credential: &str) -> Result<UserProfile> {
        let account = self
            .accounts
            .get(id)
            .ok_or(ChatError::InvalidCredential)?;

        let supplied = credential.as_bytes();
        let stored = account.credential.as_bytes();
        if supplied.len() != stored.len() || supplied.ct_eq(stored).unwrap_u8() != 1 {
            return Err(ChatError::InvalidCredential);
        }

        Ok(account.profile.clone())
    }

    /// Create a user on behalf of `actor`.
    ///
    /// Any admin may create ordinary members; only a superAdmin may create
    /// users with elevated roles.
    pub fn create_user(
        &mut self,
        id: UserId,
        display_name: String,
        credential: String,
        role: Role,
        actor: &Actor,
    ) -> Result<UserProfile> {
        match actor.role {
            Role::SuperAdmin => {}
            Role::Admin if role == Role::Member => {}
            _ => return Err(ChatError::PermissionDenied),
        }

        self.insert(id, display_name, credential, role)
    }

    /// Seed an account at startup, bypassing the actor gate.
    pub fn bootstrap_user(
        &mut self,
        id: UserId,
        display_name: String,
        credential: String,
        role: Role,
    ) -> Result<UserProfile> {
        self.insert(id, display_name, credential, role)
    }

    fn insert(
        &mut self,
        id: UserId,
        display_name: String,
        credential: String,
        role: Role,
    ) -> Result<UserProfile> {
        if self.accounts.contains_key(&id) {
            return Err(ChatError::DuplicateIdentifier(id.to_string()));
        }
        if id.as_str().is_empty() {
            return Err(ChatError::Malformed("empty user id".to_string()));
        }

        let now = Utc::now();
        let profile = UserProfile {
            id: id.clone(),
            display_name,
            role,
            created_at: now,
            last_seen_at: now,
        };
        self.accounts.insert(
            id,
            UserAccount {
                profile: profile.clone(),
                credential,
            },
        );
        Ok(profile)
    }

    /// Record activity for presence bookkeeping.
    pub fn touch_seen(&mut self, id: &UserId) {
        if let Some(account) = self.accounts.get_mut(id) {
            account.profile.last_seen_at = Utc::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn super_admin() -> Actor {
        Actor {
            id: UserId::new("root"),
            role: Role::SuperAdmin,
        }
    }

    fn seeded() -> IdentityStore {
        let mut store = IdentityStore::new();
        store
            .bootstrap_user(
                UserId::new("alice"),
                "Alice".to_string(),
                "hunter2".to_string(),
                Role::Member,
            )
            .unwrap();
        store
    }

    #[test]
    fn test_lookup_and_verify() {
        let store = seeded();
        assert!(store.lookup(&UserId::new("alice")).is_ok());
        assert!(store.verify(&UserId::new("alice"), "hunter2").is_ok());
        assert_eq!(
            store.verify(&UserId::new("alice"), "wrong"),
            Err(ChatError::InvalidCredential)
        );
    }

    #[test]
    fn test_verify_unknown_user_does_not_leak_existence() {
        let store = seeded();
        assert_eq!(
            store.verify(&UserId::new("nobody"), "anything"),
            Err(ChatError::InvalidCredential)
        );
    }

    #[test]
    fn test_duplicate_identifier_rejected() {
        let mut store = seeded();
        let err = store
            .create_user(
                UserId::new("Alice"),
                "Alice 2".to_string(),
                "pw".to_string(),
                Role::Member,
                &super_admin(),
            )
            .unwrap_err();
        assert!(matches!(err, ChatError::DuplicateIdentifier(_)));
    }

    #[test]
    fn test_only_super_admin_creates_elevated_roles() {
        let mut store = seeded();
        let admin = Actor {
            id: UserId::new("carol"),
            role: Role::Admin,
        };

        assert_eq!(
            store.create_user(
                UserId::new("eve"),
                "Eve".to_string(),
                "pw".to_string(),
                Role::Admin,
                &admin,
            ),
            Err(ChatError::PermissionDenied)
        );

        assert!(store
            .create_user(
                UserId::new("eve"),
                "Eve".to_string(),
                "pw".to_string(),
                Role::Member,
                &admin,
            )
            .is_ok());
    }

    #[test]
    fn test_member_cannot_create_users() {
        let mut store = seeded();
        let member = Actor {
            id: UserId::new("alice"),
            role: Role::Member,
        };
        assert_eq!(
            store.create_user(
                UserId::new("mallory"),
                "Mallory".to_string(),
                "pw".to_string(),
                Role::Member,
                &member,
            ),
            Err(ChatError::PermissionDenied)
        );
    }
}
