//! Redis-style session store with TTL-based expiration.
//!
//! This crate manages server-side sessions kept in an external key-value
//! store:
//! - Collision-checked session id allocation
//! - Attributes in a hash plus a creation-time key, always sharing one TTL
//! - TTL refresh on every attribute read and write
//! - Atomic invalidation and id rotation
//! - Synchronous lifecycle listeners
//!
//! # Example
//!
//! ```rust,ignore
//! use ember_session::{CookieSessionConfig, MemoryStore, RequestContext, SessionRegistry};
//!
//! let registry = SessionRegistry::builder(Arc::new(MemoryStore::new()))
//!     .with_session_config(Arc::new(CookieSessionConfig::default()))
//!     .build();
//!
//! let mut ctx = RequestContext::new();
//! let session = registry.create_session(&mut ctx, None).await?;
//! session.set_attribute("user", "alice").await?;
//! ```

mod config;
mod error;
mod id;
mod listener;
mod memory;
mod record;
mod registry;
mod store;
mod transport;

#[cfg(test)]
mod test_support;

pub use config::{
    CREATED_SUFFIX, DEFAULT_DEPLOYMENT_NAME, DEFAULT_SESSION_TIMEOUT_SECS, MAX_ID_ATTEMPTS,
    MAX_TIMEOUT_SECS, RegistrySettings,
};
pub use error::{Error, Result, StoreError, StoreResult};
pub use id::{DEFAULT_ID_BYTES, SecureRandomIdGenerator, SessionIdGenerator};
pub use listener::{ListenerBus, SessionListener};
pub use memory::MemoryStore;
pub use record::SessionRecord;
pub use registry::{RegistryBuilder, SessionRegistry};
pub use store::{SessionStore, StoreCommand};
pub use transport::{
    CookieSessionConfig, DEFAULT_COOKIE_NAME, OutboundCookie, RequestContext, SessionConfig,
};
