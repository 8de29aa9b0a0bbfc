//! Settings for the session registry.

use std::time::Duration;

use crate::error::{Error, Result};

/// Default session timeout in seconds (30 minutes).
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 30 * 60;

/// Default deployment name, used as a log field.
pub const DEFAULT_DEPLOYMENT_NAME: &str = "SESSION_MANAGER";

/// Suffix appended to a session key to address its metadata record.
pub const CREATED_SUFFIX: &str = ":created";

/// Maximum number of generated ids tried before giving up.
pub const MAX_ID_ATTEMPTS: usize = 100;

/// Longest accepted max-inactive interval in seconds (about 68 years).
pub const MAX_TIMEOUT_SECS: u64 = i32::MAX as u64;

/// Reject timeouts the store cannot represent.
pub(crate) fn check_timeout(seconds: u64) -> Result<u64> {
    if seconds > MAX_TIMEOUT_SECS {
        return Err(Error::InvalidTimeout {
            seconds,
            max: MAX_TIMEOUT_SECS,
        });
    }
    Ok(seconds)
}

/// Settings for a [`SessionRegistry`](crate::SessionRegistry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrySettings {
    /// Name of this deployment, attached to log events.
    pub deployment_name: String,

    /// Max-inactive interval given to newly created sessions, in seconds.
    pub default_timeout_secs: u64,

    /// Namespace prepended to every store key.
    /// Empty by default, so keys are exactly `<id>` and `<id>:created`.
    pub key_prefix: String,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            deployment_name: DEFAULT_DEPLOYMENT_NAME.to_string(),
            default_timeout_secs: DEFAULT_SESSION_TIMEOUT_SECS,
            key_prefix: String::new(),
        }
    }
}

impl RegistrySettings {
    /// Create settings with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the deployment name.
    pub fn with_deployment_name(mut self, name: impl Into<String>) -> Self {
        self.deployment_name = name.into();
        self
    }

    /// Set the default session timeout.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout_secs = timeout.as_secs();
        self
    }

    /// Set the key namespace.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Store key of the primary attribute record for `id`.
    pub fn session_key(&self, id: &str) -> String {
        format!("{}{}", self.key_prefix, id)
    }

    /// Store key of the metadata record for `id`.
    pub fn created_key(&self, id: &str) -> String {
        format!("{}{}{}", self.key_prefix, id, CREATED_SUFFIX)
    }

    /// Pattern matching every key in this registry's namespace.
    pub fn key_pattern(&self) -> String {
        format!("{}*", self.key_prefix)
    }

    /// Map a store key back to a session id.
    ///
    /// The attribute key and the metadata key of a session both map to its
    /// id. Returns `None` for keys outside the namespace.
    pub fn session_id_from_key<'a>(&self, key: &'a str) -> Option<&'a str> {
        let rest = key.strip_prefix(self.key_prefix.as_str())?;
        let id = rest.strip_suffix(CREATED_SUFFIX).unwrap_or(rest);
        (!id.is_empty()).then_some(id)
    }
}
