//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;

use causerie_shared::constants::{MAX_HISTORY, MAX_MEDIA_SIZE};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP/WebSocket server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// Filesystem path where uploaded media is stored.
    /// Env: `MEDIA_STORAGE_PATH`
    /// Default: `./media`
    pub media_storage_path: PathBuf,

    /// Ed25519 seed for the access-token signing key (hex, 64 chars).
    /// Env: `TOKEN_SIGNING_KEY`
    /// Default: none — an ephemeral key is generated, so tokens do not
    /// survive a restart (development only).
    pub token_signing_seed: Option<[u8; 32]>,

    /// Access token lifetime in hours.
    /// Env: `TOKEN_TTL_HOURS`
    /// Default: `24`
    pub token_ttl_hours: i64,

    /// Human-readable name for this server instance.
    /// Env: `INSTANCE_NAME`
    /// Default: `"Causerie"`
    pub instance_name: String,

    /// Identifier of the bootstrap superAdmin account.
    /// Env: `BOOTSTRAP_ADMIN`
    /// Default: `admin`
    pub bootstrap_admin: String,

    /// Password for the bootstrap superAdmin account.
    /// Env: `BOOTSTRAP_ADMIN_PASSWORD`
    /// Default: `admin` (development only; set this in production).
    pub bootstrap_admin_password: String,

    /// Name of the default group every new user is enrolled into.
    /// Env: `DEFAULT_GROUP_NAME`
    /// Default: `"General Chat"`
    pub default_group_name: String,

    /// Messages retained per group before eviction.
    /// Env: `MAX_HISTORY`
    pub max_history: usize,

    /// Maximum uploaded media size in bytes (50 MiB).
    pub max_media_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], 8080).into(),
            media_storage_path: PathBuf::from("./media"),
            token_signing_seed: None,
            token_ttl_hours: 24,
            instance_name: "Causerie".to_string(),
            bootstrap_admin: "admin".to_string(),
            bootstrap_admin_password: "admin".to_string(),
            default_group_name: "General Chat".to_string(),
            max_history: MAX_HISTORY,
            max_media_size: MAX_MEDIA_SIZE,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Ok(path) = std::env::var("MEDIA_STORAGE_PATH") {
            config.media_storage_path = PathBuf::from(path);
        }

        if let Ok(hex_seed) = std::env::var("TOKEN_SIGNING_KEY") {
            match parse_hex_seed(&hex_seed) {
                Ok(seed) => config.token_signing_seed = Some(seed),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "Invalid TOKEN_SIGNING_KEY, generating an ephemeral key (dev-only)"
                    );
                }
            }
        }

        if let Ok(val) = std::env::var("TOKEN_TTL_HOURS") {
            if let Ok(hours) = val.parse::<i64>() {
                if hours > 0 {
                    config.token_ttl_hours = hours;
                }
            }
        }

        if let Ok(name) = std::env::var("INSTANCE_NAME") {
            config.instance_name = name;
        }

        if let Ok(name) = std::env::var("BOOTSTRAP_ADMIN") {
            if !name.is_empty() {
                config.bootstrap_admin = name;
            }
        }

        if let Ok(password) = std::env::var("BOOTSTRAP_ADMIN_PASSWORD") {
            if !password.is_empty() {
                config.bootstrap_admin_password = password;
            }
        }

        if let Ok(name) = std::env::var("DEFAULT_GROUP_NAME") {
            if !name.is_empty() {
                config.default_group_name = name;
            }
        }

        if let Ok(val) = std::env::var("MAX_HISTORY") {
            if let Ok(n) = val.parse::<usize>() {
                if n > 0 {
                    config.max_history = n;
                }
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

/// Parse a 64-character hex string into a 32-byte seed.
fn parse_hex_seed(hex_str: &str) -> Result<[u8; 32], String> {
    let hex_str = hex_str.trim();
    if hex_str.len() != 64 {
        return Err(format!("expected 64 hex chars, got {}", hex_str.len()));
    }
    let bytes = hex::decode(hex_str).map_err(|e| e.to_string())?;
    let mut seed = [0u8; 32];
    seed.copy_from_slice(&bytes);
    Ok(seed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.max_history, MAX_HISTORY);
        assert!(config.token_signing_seed.is_none());
    }

    #[test]
    fn test_parse_hex_seed() {
        let hex_str = "ab".repeat(32);
        assert_eq!(parse_hex_seed(&hex_str).unwrap(), [0xab; 32]);
    }

    #[test]
    fn test_parse_hex_seed_wrong_length() {
        assert!(parse_hex_seed("abcd").is_err());
    }
}
