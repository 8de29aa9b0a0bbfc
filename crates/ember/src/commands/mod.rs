//! CLI command handlers.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use ember_config::EmberConfig;
use ember_redis::RedisStore;
use ember_session::{SecureRandomIdGenerator, SessionRegistry};

pub mod config;
pub mod sessions;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Redis URL to connect to.
    pub redis_url: String,
    /// Effective configuration.
    pub config: EmberConfig,
    /// Config files merged into `config`.
    pub config_sources: Vec<PathBuf>,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Connect to the store and build a registry from the session settings.
    pub async fn registry(&self) -> Result<SessionRegistry> {
        let store = RedisStore::connect(&self.redis_url)
            .await
            .with_context(|| format!("failed to connect to {}", self.redis_url))?;

        let session = self.config.session();
        Ok(SessionRegistry::builder(Arc::new(store))
            .with_settings(session.to_settings())
            .with_session_config(Arc::new(session.cookie_config()))
            .with_generator(Arc::new(
                SecureRandomIdGenerator::new().with_length(session.id_length),
            ))
            .build())
    }
}
