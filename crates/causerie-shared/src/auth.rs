//! Signed access tokens.
//!
//! The transport layer issues an [`AccessToken`] after a credential check and
//! clients present it when opening a connection. Claims (identity + role) are
//! Ed25519-signed by the server, so the session hub only ever consumes an
//! already-verified `UserId` and `Role` — no string matching on the token.

use base64::Engine;
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::error::ChatError;
use crate::types::{Actor, Role, UserId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    pub user_id: UserId,
    pub role: Role,
    pub expires_at: DateTime<Utc>,
    pub signature: Vec<u8>,
}

// payload = user_id 0x1F role 0x1F expires_at (rfc3339)
fn claims_payload(user_id: &UserId, role: Role, expires_at: DateTime<Utc>) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(user_id.as_str().as_bytes());
    payload.push(0x1F);
    payload.extend_from_slice(role.as_str().as_bytes());
    payload.push(0x1F);
    payload.extend_from_slice(expires_at.to_rfc3339().as_bytes());
    payload
}

impl AccessToken {
    pub fn issue(
        user_id: UserId,
        role: Role,
        expires_at: DateTime<Utc>,
        signing_key: &SigningKey,
    ) -> Self {
        let signature = signing_key.sign(&claims_payload(&user_id, role, expires_at));
        Self {
            user_id,
            role,
            expires_at,
            signature: signature.to_bytes().to_vec(),
        }
    }

    /// Verify signature and expiry; on success returns the trusted claims.
    pub fn verify(&self, server_pubkey: &VerifyingKey) -> Result<Actor, ChatError> {
        if Utc::now() > self.expires_at {
            return Err(ChatError::InvalidCredential);
        }

        let signature =
            Signature::from_slice(&self.signature).map_err(|_| ChatError::InvalidCredential)?;

        let payload = claims_payload(&self.user_id, self.role, self.expires_at);
        server_pubkey
            .verify(&payload, &signature)
            .map_err(|_| ChatError::InvalidCredential)?;

        Ok(Actor {
            id: self.user_id.clone(),
            role: self.role,
        })
    }

    /// Wire form: base64 over the JSON token.
    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).expect("token serialization is infallible");
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(raw: &str) -> Result<Self, ChatError> {
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(raw.trim())
            .map_err(|_| ChatError::InvalidCredential)?;
        serde_json::from_slice(&bytes).map_err(|_| ChatError::InvalidCredential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rand::rngs::OsRng;

    fn keypair() -> (SigningKey, VerifyingKey) {
        let signing = SigningKey::generate(&mut OsRng);
        let verifying = signing.verifying_key();
        (signing, verifying)
    }

    #[test]
    fn test_token_valid() {
        let (signing, verifying) = keypair();
        let token = AccessToken::issue(
            UserId::new("alice"),
            Role::Member,
            Utc::now() + Duration::hours(24),
            &signing,
        );

        let actor = token.verify(&verifying).unwrap();
        assert_eq!(actor.id, UserId::new("alice"));
        assert_eq!(actor.role, Role::Member);
    }

    #[test]
    fn test_token_expired() {
        let (signing, verifying) = keypair();
        let token = AccessToken::issue(
            UserId::new("alice"),
            Role::Member,
            Utc::now() - Duration::hours(1),
            &signing,
        );

        assert_eq!(
            token.verify(&verifying),
            Err(ChatError::InvalidCredential)
        );
    }

    #[test]
    fn test_token_wrong_server_key() {
        let (signing, _) = keypair();
        let (_, other_verifying) = keypair();
        let token = AccessToken::issue(
            UserId::new("alice"),
            Role::Admin,
            Utc::now() + Duration::hours(24),
            &signing,
        );

        assert!(token.verify(&other_verifying).is_err());
    }

    #[test]
    fn test_tampered_claims_rejected() {
        let (signing, verifying) = keypair();
        let mut token = AccessToken::issue(
            UserId::new("alice"),
            Role::Member,
            Utc::now() + Duration::hours(24),
            &signing,
        );
        // Claiming a higher role must invalidate the signature.
        token.role = Role::SuperAdmin;

        assert!(token.verify(&verifying).is_err());
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let (signing, verifying) = keypair();
        let token = AccessToken::issue(
            UserId::new("bob"),
            Role::Member,
            Utc::now() + Duration::hours(1),
            &signing,
        );

        let wire = token.encode();
        let restored = AccessToken::decode(&wire).unwrap();
        assert!(restored.verify(&verifying).is_ok());
    }

    #[test]
    fn test_garbage_token_rejected() {
        assert!(AccessToken::decode("not-a-token!!").is_err());
    }
}
