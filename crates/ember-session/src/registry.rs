//! Session registry: creation, lookup and enumeration of sessions.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tracing::{debug, trace, warn};

use crate::config::{MAX_ID_ATTEMPTS, RegistrySettings, check_timeout};
use crate::error::{Error, Result};
use crate::id::{SecureRandomIdGenerator, SessionIdGenerator};
use crate::listener::{ListenerBus, SessionListener};
use crate::record::SessionRecord;
use crate::store::{SessionStore, StoreCommand};
use crate::transport::{RequestContext, SessionConfig};

struct RegistryInner {
    store: Arc<dyn SessionStore>,
    generator: Arc<dyn SessionIdGenerator>,
    listeners: Arc<ListenerBus>,
    settings: RegistrySettings,
    default_timeout_secs: AtomicU64,
    default_config: Option<Arc<dyn SessionConfig>>,
}

/// Creates and looks up sessions held in a [`SessionStore`].
///
/// The registry keeps no session content in memory. Every record it returns
/// is a thin view over two store keys:
/// - `<prefix><id>`: hash of attribute name to value
/// - `<prefix><id>:created`: creation time in epoch milliseconds
///
/// Both keys always carry the same TTL; every refresh or delete touches them
/// in one atomic batch.
///
/// Cloning is cheap and clones share listeners and the default timeout.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

/// Builder for [`SessionRegistry`].
pub struct RegistryBuilder {
    store: Arc<dyn SessionStore>,
    generator: Arc<dyn SessionIdGenerator>,
    settings: RegistrySettings,
    default_config: Option<Arc<dyn SessionConfig>>,
}

impl RegistryBuilder {
    /// Use a custom id generator.
    pub fn with_generator(mut self, generator: Arc<dyn SessionIdGenerator>) -> Self {
        self.generator = generator;
        self
    }

    /// Use custom settings.
    pub fn with_settings(mut self, settings: RegistrySettings) -> Self {
        self.settings = settings;
        self
    }

    /// Session config used when a caller does not pass one.
    pub fn with_session_config(mut self, config: Arc<dyn SessionConfig>) -> Self {
        self.default_config = Some(config);
        self
    }

    /// Build the registry.
    pub fn build(self) -> SessionRegistry {
        let default_timeout_secs = AtomicU64::new(self.settings.default_timeout_secs);
        SessionRegistry {
            inner: Arc::new(RegistryInner {
                store: self.store,
                generator: self.generator,
                listeners: Arc::new(ListenerBus::new()),
                settings: self.settings,
                default_timeout_secs,
                default_config: self.default_config,
            }),
        }
    }
}

impl SessionRegistry {
    /// Create a registry with default settings and the secure random generator.
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self::builder(store).build()
    }

    /// Start building a registry over `store`.
    pub fn builder(store: Arc<dyn SessionStore>) -> RegistryBuilder {
        RegistryBuilder {
            store,
            generator: Arc::new(SecureRandomIdGenerator::new()),
            settings: RegistrySettings::default(),
            default_config: None,
        }
    }

    /// Settings this registry was built with.
    pub fn settings(&self) -> &RegistrySettings {
        &self.inner.settings
    }

    /// Name of this deployment.
    pub fn deployment_name(&self) -> &str {
        &self.inner.settings.deployment_name
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.inner.store
    }

    /// The listener bus shared by every record of this registry.
    pub fn listeners(&self) -> Arc<ListenerBus> {
        Arc::clone(&self.inner.listeners)
    }

    /// Timeout in seconds given to sessions created from now on.
    pub fn default_session_timeout(&self) -> u64 {
        self.inner.default_timeout_secs.load(Ordering::Relaxed)
    }

    /// Change the timeout for future sessions. Existing sessions keep theirs.
    ///
    /// Values above [`MAX_TIMEOUT_SECS`](crate::MAX_TIMEOUT_SECS) are rejected.
    pub fn set_default_session_timeout(&self, seconds: u64) -> Result<()> {
        let seconds = check_timeout(seconds)?;
        self.inner
            .default_timeout_secs
            .store(seconds, Ordering::Relaxed);
        Ok(())
    }

    /// Register a lifecycle listener.
    pub fn register_listener(&self, listener: Arc<dyn SessionListener>) {
        self.inner.listeners.register(listener);
    }

    /// Remove a lifecycle listener by identity.
    pub fn remove_listener(&self, listener: &Arc<dyn SessionListener>) -> bool {
        self.inner.listeners.remove(listener)
    }

    fn resolve_config(
        &self,
        config: Option<Arc<dyn SessionConfig>>,
    ) -> Result<Arc<dyn SessionConfig>> {
        config
            .or_else(|| self.inner.default_config.clone())
            .ok_or_else(|| {
                Error::Configuration("no session config to carry the session id".to_string())
            })
    }

    /// Generate an id that no live session holds.
    ///
    /// Gives up after [`MAX_ID_ATTEMPTS`] collisions, which only happens with
    /// a broken generator or an exhausted id space.
    pub(crate) async fn allocate_id(&self) -> Result<String> {
        let settings = &self.inner.settings;
        for attempt in 1..=MAX_ID_ATTEMPTS {
            let candidate = self.inner.generator.generate();
            let taken = self
                .inner
                .store
                .exists(&settings.session_key(&candidate))
                .await?
                || self
                    .inner
                    .store
                    .exists(&settings.created_key(&candidate))
                    .await?;
            if !taken {
                return Ok(candidate);
            }
            debug!(
                deployment = %settings.deployment_name,
                attempt,
                "Generated session id collides with a live session, retrying"
            );
        }
        Err(Error::IdAllocationExhausted {
            attempts: MAX_ID_ATTEMPTS,
        })
    }

    /// Create a session for this request.
    ///
    /// If `config` finds an id on the request it is used as-is; otherwise a
    /// fresh id is allocated. The new session is attached to `ctx`, so later
    /// [`get_session`](Self::get_session) calls in the same request return it.
    pub async fn create_session(
        &self,
        ctx: &mut RequestContext,
        config: Option<Arc<dyn SessionConfig>>,
    ) -> Result<SessionRecord> {
        let config = self.resolve_config(config)?;

        let id = match config.find_session_id(ctx) {
            Some(id) => id,
            None => self.allocate_id().await?,
        };

        let settings = &self.inner.settings;
        let timeout = check_timeout(self.default_session_timeout())?;
        let created = Utc::now();

        self.inner
            .store
            .run_atomic(&[
                StoreCommand::set(
                    settings.created_key(&id),
                    created.timestamp_millis().to_string(),
                ),
                StoreCommand::expire(settings.created_key(&id), timeout),
                StoreCommand::expire(settings.session_key(&id), timeout),
            ])
            .await?;

        let session = SessionRecord::new(
            self.clone(),
            id.clone(),
            created,
            timeout,
            Some(Arc::clone(&config)),
        );

        config.set_session_id(ctx, &id);
        self.inner.listeners.session_created(&session);
        ctx.attach_new_session(session.clone());

        debug!(
            deployment = %settings.deployment_name,
            session_id = %id,
            timeout_secs = timeout,
            "Session created"
        );

        Ok(session)
    }

    /// Session for this request: one created earlier in the request, or the
    /// one whose id `config` finds on it.
    pub async fn get_session(
        &self,
        ctx: &RequestContext,
        config: Option<Arc<dyn SessionConfig>>,
    ) -> Result<Option<SessionRecord>> {
        if let Some(session) = ctx.new_session() {
            return Ok(Some(session.clone()));
        }

        let config = self.resolve_config(config)?;
        let id = config.find_session_id(ctx);
        self.load(id.as_deref(), Some(config)).await
    }

    /// Look up a session by id.
    ///
    /// The record's max-inactive interval is seeded from the live TTL of the
    /// session key, so it reflects whatever interval was last applied.
    pub async fn get_session_by_id(&self, id: Option<&str>) -> Result<Option<SessionRecord>> {
        self.load(id, self.inner.default_config.clone()).await
    }

    async fn load(
        &self,
        id: Option<&str>,
        config: Option<Arc<dyn SessionConfig>>,
    ) -> Result<Option<SessionRecord>> {
        let Some(id) = id else {
            return Ok(None);
        };

        let settings = &self.inner.settings;
        let store = &self.inner.store;

        if !store.exists(&settings.session_key(id)).await? {
            trace!(session_id = %id, "Session not found");
            return Ok(None);
        }

        let created = match store.get(&settings.created_key(id)).await? {
            Some(raw) => parse_millis(&raw),
            None => None,
        };
        let created = created.unwrap_or_else(|| {
            warn!(
                deployment = %settings.deployment_name,
                session_id = %id,
                "Session has no readable creation time, using now"
            );
            Utc::now()
        });

        let timeout = store
            .ttl(&settings.session_key(id))
            .await?
            .unwrap_or_else(|| self.default_session_timeout());

        trace!(session_id = %id, ttl_secs = timeout, "Session loaded");

        Ok(Some(SessionRecord::new(
            self.clone(),
            id.to_string(),
            created,
            timeout,
            config,
        )))
    }

    /// Delete both keys of session `id` without loading it.
    ///
    /// Also removes sessions that have no attributes yet, which
    /// [`get_session_by_id`](Self::get_session_by_id) cannot load. No listener
    /// is notified. Returns whether anything was deleted.
    pub async fn remove_session(&self, id: &str) -> Result<bool> {
        let settings = &self.inner.settings;
        let store = &self.inner.store;
        let primary = settings.session_key(id);
        let created = settings.created_key(id);

        if !store.exists(&primary).await? && !store.exists(&created).await? {
            return Ok(false);
        }
        store
            .run_atomic(&[StoreCommand::delete(primary), StoreCommand::delete(created)])
            .await?;

        debug!(
            deployment = %settings.deployment_name,
            session_id = %id,
            "Session removed"
        );
        Ok(true)
    }

    /// Ids of every session in the store.
    ///
    /// Scans the whole key namespace. A session's attribute key and metadata
    /// key map to the same id, so the result holds exactly one entry per
    /// session, including sessions with no attributes yet. Meant for
    /// administration and diagnostics, not the request path.
    pub async fn all_sessions(&self) -> Result<HashSet<String>> {
        let settings = &self.inner.settings;
        let keys = self
            .inner
            .store
            .keys_matching(&settings.key_pattern())
            .await?;
        Ok(keys
            .iter()
            .filter_map(|key| settings.session_id_from_key(key))
            .map(str::to_string)
            .collect())
    }

    /// Same as [`all_sessions`](Self::all_sessions); expiry is left to the store.
    pub async fn active_sessions(&self) -> Result<HashSet<String>> {
        self.all_sessions().await
    }

    /// Always empty: every session is durable in the store as soon as it exists.
    pub fn transient_sessions(&self) -> HashSet<String> {
        HashSet::new()
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("settings", &self.inner.settings)
            .field("default_timeout_secs", &self.default_session_timeout())
            .field("listeners", &self.inner.listeners)
            .finish()
    }
}

fn parse_millis(raw: &str) -> Option<DateTime<Utc>> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(DateTime::from_timestamp_millis)
}
