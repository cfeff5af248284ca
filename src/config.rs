//! Server configuration. A [`ServerConfig`] can be built in code or read from a JSON file such as
//!
//! ```json
//! {
//!     "username": "admin",
//!     "password": "secret",
//!     "key_bits": 2048,
//!     "workers": 4,
//!     "addr": "0.0.0.0:9090",
//!     "auth_timeout_secs": 1
//! }
//! ```
//!
//! Only `username` and `password` are required.
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{RamDbError, Result};

/// smallest key size that leaves room for OAEP padding
pub const MIN_KEY_BITS: usize = 1024;

/// The single username/password pair a server accepts
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    /// user name
    pub username: String,
    /// password
    pub password: String,
}

impl Credentials {
    /// creates a credentials pair, rejecting values the wire format can't carry
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Result<Self> {
        let credentials = Credentials {
            username: username.into(),
            password: password.into(),
        };
        credentials.validate()?;
        Ok(credentials)
    }

    /// usernames and passwords travel as `<argument>`s so they can't contain `<` or `>`
    pub fn validate(&self) -> Result<()> {
        let delimited = |s: &str| s.contains('<') || s.contains('>');
        if delimited(&self.username) || delimited(&self.password) {
            return Err(RamDbError::InvalidCredentials(
                "user name and password can't contain '<' or '>'".to_string(),
            ));
        }
        Ok(())
    }

    /// exact comparison against a presented pair
    pub fn matches(&self, username: &str, password: &str) -> bool {
        self.username == username && self.password == password
    }
}

// keep passwords out of logs
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Everything a [`RamDbServer`](crate::RamDbServer) needs at start-up
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// the accepted user name and password
    #[serde(flatten)]
    pub credentials: Credentials,

    /// RSA modulus size of the server key
    #[serde(default = "default_key_bits")]
    pub key_bits: usize,

    /// number of sessions processed at the same time
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// address the listener binds to
    #[serde(default = "default_addr")]
    pub addr: SocketAddr,

    /// seconds a client gets for each handshake step
    #[serde(default = "default_auth_timeout_secs")]
    pub auth_timeout_secs: u64,

    /// seconds between sweeps of expired entries, 0 disables sweeping
    #[serde(default)]
    pub purge_interval_secs: u64,
}

fn default_key_bits() -> usize {
    2048
}

fn default_workers() -> u32 {
    4
}

fn default_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9090))
}

fn default_auth_timeout_secs() -> u64 {
    1
}

impl ServerConfig {
    /// a configuration with the given credentials and every other setting at its default
    pub fn new(credentials: Credentials) -> Self {
        ServerConfig {
            credentials,
            key_bits: default_key_bits(),
            workers: default_workers(),
            addr: default_addr(),
            auth_timeout_secs: default_auth_timeout_secs(),
            purge_interval_secs: 0,
        }
    }

    /// reads and validates a JSON configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: ServerConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// checks every setting is usable
    pub fn validate(&self) -> Result<()> {
        self.credentials.validate()?;
        if self.key_bits < MIN_KEY_BITS {
            return Err(RamDbError::Config(format!(
                "key_bits must be at least {}, got {}",
                MIN_KEY_BITS, self.key_bits
            )));
        }
        if self.workers == 0 {
            return Err(RamDbError::Config("workers must be at least 1".to_string()));
        }
        if self.auth_timeout_secs == 0 {
            return Err(RamDbError::Config("auth_timeout_secs must be at least 1".to_string()));
        }
        Ok(())
    }

    /// the handshake timeout as a [`Duration`]
    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs)
    }

    /// the purge interval, `None` when sweeping is disabled
    pub fn purge_interval(&self) -> Option<Duration> {
        match self.purge_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_credentials_are_required() {
        let config: ServerConfig =
            serde_json::from_str(r#"{"username": "admin", "password": "pw"}"#).unwrap();
        assert_eq!(config.credentials.username, "admin");
        assert_eq!(config.key_bits, 2048);
        assert_eq!(config.workers, 4);
        assert_eq!(config.addr.port(), 9090);
        assert_eq!(config.auth_timeout(), Duration::from_secs(1));
        assert_eq!(config.purge_interval(), None);
        config.validate().unwrap();
    }

    #[test]
    fn rejects_delimiters_in_credentials() {
        assert!(Credentials::new("ad<min", "pw").is_err());
        assert!(Credentials::new("admin", "p>w").is_err());
        assert!(Credentials::new("admin", "pw").is_ok());
    }

    #[test]
    fn rejects_unusable_settings() {
        let mut config = ServerConfig::new(Credentials::new("a", "b").unwrap());
        config.workers = 0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::new(Credentials::new("a", "b").unwrap());
        config.key_bits = 512;
        assert!(config.validate().is_err());
    }

    #[test]
    fn debug_output_hides_the_password() {
        let credentials = Credentials::new("admin", "hunter2").unwrap();
        assert!(!format!("{:?}", credentials).contains("hunter2"));
    }
}
