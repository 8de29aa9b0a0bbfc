//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [redis]
//! url = "redis://127.0.0.1:6379/0"
//!
//! [session]
//! default_timeout_secs = 1800
//! key_prefix = ""
//! deployment_name = "SESSION_MANAGER"
//! id_length = 16
//! cookie_name = "session"
//! ```

use std::time::Duration;

use ember_session::{
    CookieSessionConfig, DEFAULT_COOKIE_NAME, DEFAULT_DEPLOYMENT_NAME, DEFAULT_ID_BYTES,
    DEFAULT_SESSION_TIMEOUT_SECS, MAX_TIMEOUT_SECS, RegistrySettings,
};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Default Redis URL.
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379/0";

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmberConfig {
    /// Backing store connection.
    pub redis: Option<RedisConfig>,

    /// Session registry settings.
    pub session: Option<SessionSection>,
}

impl EmberConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    pub fn merge(&mut self, other: EmberConfig) {
        if other.redis.is_some() {
            self.redis = other.redis;
        }

        if other.session.is_some() {
            self.session = other.session;
        }
    }

    /// Redis section, or defaults.
    pub fn redis(&self) -> RedisConfig {
        self.redis.clone().unwrap_or_default()
    }

    /// Session section, or defaults.
    pub fn session(&self) -> SessionSection {
        self.session.clone().unwrap_or_default()
    }

    /// Check every section for out-of-range values.
    pub fn validate(&self) -> Result<()> {
        if let Some(ref redis) = self.redis {
            redis.validate()?;
        }
        if let Some(ref session) = self.session {
            session.validate()?;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Redis Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Backing store connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Connection URL, e.g. `redis://localhost:6379/0`.
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_REDIS_URL.to_string(),
        }
    }
}

impl RedisConfig {
    fn validate(&self) -> Result<()> {
        let scheme_ok = ["redis://", "rediss://", "redis+unix://", "unix://"]
            .iter()
            .any(|scheme| self.url.starts_with(scheme));
        if !scheme_ok {
            return Err(ConfigError::Invalid {
                field: "redis.url".to_string(),
                reason: format!("'{}' is not a redis:// or rediss:// URL", self.url),
            });
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Session registry settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// Max-inactive interval for new sessions, in seconds.
    pub default_timeout_secs: u64,
    /// Namespace prepended to every store key.
    pub key_prefix: String,
    /// Deployment name attached to log events.
    pub deployment_name: String,
    /// Random bytes per generated session id.
    pub id_length: usize,
    /// Cookie carrying the session id.
    pub cookie_name: String,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            default_timeout_secs: DEFAULT_SESSION_TIMEOUT_SECS,
            key_prefix: String::new(),
            deployment_name: DEFAULT_DEPLOYMENT_NAME.to_string(),
            id_length: DEFAULT_ID_BYTES,
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
        }
    }
}

impl SessionSection {
    fn validate(&self) -> Result<()> {
        if self.default_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "session.default_timeout_secs".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.default_timeout_secs > MAX_TIMEOUT_SECS {
            return Err(ConfigError::Invalid {
                field: "session.default_timeout_secs".to_string(),
                reason: format!("must be at most {MAX_TIMEOUT_SECS}"),
            });
        }
        if self.id_length < DEFAULT_ID_BYTES {
            return Err(ConfigError::Invalid {
                field: "session.id_length".to_string(),
                reason: format!("must be at least {DEFAULT_ID_BYTES} bytes"),
            });
        }
        if self.cookie_name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "session.cookie_name".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Registry settings described by this section.
    pub fn to_settings(&self) -> RegistrySettings {
        RegistrySettings::new()
            .with_deployment_name(self.deployment_name.clone())
            .with_default_timeout(Duration::from_secs(self.default_timeout_secs))
            .with_key_prefix(self.key_prefix.clone())
    }

    /// Cookie transport carrying the session id under `cookie_name`.
    pub fn cookie_config(&self) -> CookieSessionConfig {
        CookieSessionConfig::new(self.cookie_name.clone())
    }
}
