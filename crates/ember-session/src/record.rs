//! Per-session handle.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::config::check_timeout;
use crate::error::Result;
use crate::registry::SessionRegistry;
use crate::store::StoreCommand;
use crate::transport::{RequestContext, SessionConfig};

struct RecordInner {
    id: RwLock<String>,
    creation_time: DateTime<Utc>,
    max_inactive_secs: AtomicU64,
    config: RwLock<Option<Arc<dyn SessionConfig>>>,
    registry: SessionRegistry,
}

/// Handle to one session.
///
/// Holds only the id, the creation time and the max-inactive interval;
/// attributes are read from and written to the store on every call. Every
/// attribute operation counts as activity and refreshes the TTL of both
/// session keys.
///
/// Clones share state: an id rotated through one clone is seen by all.
#[derive(Clone)]
pub struct SessionRecord {
    inner: Arc<RecordInner>,
}

impl SessionRecord {
    pub(crate) fn new(
        registry: SessionRegistry,
        id: String,
        creation_time: DateTime<Utc>,
        max_inactive_secs: u64,
        config: Option<Arc<dyn SessionConfig>>,
    ) -> Self {
        Self {
            inner: Arc::new(RecordInner {
                id: RwLock::new(id),
                creation_time,
                max_inactive_secs: AtomicU64::new(max_inactive_secs),
                config: RwLock::new(config),
                registry,
            }),
        }
    }

    /// Current session id.
    pub fn id(&self) -> String {
        self.inner.id.read().clone()
    }

    /// When the session was created.
    pub fn creation_time(&self) -> DateTime<Utc> {
        self.inner.creation_time
    }

    /// Seconds of inactivity after which the store expires the session.
    pub fn max_inactive_interval(&self) -> u64 {
        self.inner.max_inactive_secs.load(Ordering::Relaxed)
    }

    /// The registry this session belongs to.
    pub fn registry(&self) -> &SessionRegistry {
        &self.inner.registry
    }

    /// Whether two handles refer to the same in-memory record.
    pub fn ptr_eq(&self, other: &SessionRecord) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Approximate time of the last access.
    ///
    /// Not stored anywhere: derived as
    /// `now - (max_inactive_interval - remaining_ttl)`. The store's countdown
    /// restarts at every TTL refresh, so this is only accurate while every
    /// access goes through this crate. A session whose key is gone reports
    /// `now - max_inactive_interval`, saturating at the earliest representable
    /// time.
    pub async fn last_accessed_time(&self) -> Result<DateTime<Utc>> {
        let key = self.registry().settings().session_key(&self.id());
        let remaining = self
            .registry()
            .store()
            .remaining_millis(&key)
            .await?
            .unwrap_or(0);
        let interval_millis = self.max_inactive_interval().saturating_mul(1000);
        let idle = interval_millis.saturating_sub(remaining);
        let idle = i64::try_from(idle)
            .ok()
            .and_then(TimeDelta::try_milliseconds);
        Ok(idle
            .and_then(|idle| Utc::now().checked_sub_signed(idle))
            .unwrap_or(DateTime::<Utc>::MIN_UTC))
    }

    /// Change the max-inactive interval and apply it immediately.
    ///
    /// Zero expires the session at once, as `EXPIRE key 0` does in Redis.
    /// Values above [`MAX_TIMEOUT_SECS`](crate::MAX_TIMEOUT_SECS) are rejected
    /// and leave the interval unchanged.
    pub async fn set_max_inactive_interval(&self, seconds: u64) -> Result<()> {
        let seconds = check_timeout(seconds)?;
        self.inner
            .max_inactive_secs
            .store(seconds, Ordering::Relaxed);
        self.bump_timeout().await
    }

    /// Read an attribute.
    pub async fn get_attribute(&self, name: &str) -> Result<Option<String>> {
        let key = self.registry().settings().session_key(&self.id());
        let value = self.registry().store().hash_get(&key, name).await?;
        self.bump_timeout().await?;
        Ok(value)
    }

    /// Names of all attributes.
    pub async fn get_attribute_names(&self) -> Result<HashSet<String>> {
        let key = self.registry().settings().session_key(&self.id());
        let names = self.registry().store().hash_field_names(&key).await?;
        self.bump_timeout().await?;
        Ok(names)
    }

    /// Write an attribute and return the written value.
    ///
    /// Listeners hear `attribute_added` or `attribute_updated` depending on
    /// the value read just before the write. That read is not atomic with the
    /// write, so a concurrent writer can make the classification wrong.
    pub async fn set_attribute(&self, name: &str, value: impl Into<String>) -> Result<String> {
        let value = value.into();
        let key = self.registry().settings().session_key(&self.id());
        let store = self.registry().store();

        let existing = store.hash_get(&key, name).await?;
        store.hash_set(&key, name, &value).await?;

        let listeners = self.registry().listeners();
        match existing.as_deref() {
            None => listeners.attribute_added(self, name, &value),
            Some(old) => listeners.attribute_updated(self, name, &value, old),
        }
        trace!(session_id = %self.id(), attribute = %name, "Attribute set");

        self.bump_timeout().await?;
        Ok(value)
    }

    /// Remove an attribute and return its previous value.
    ///
    /// Listeners hear `attribute_removed` even when there was nothing to remove.
    pub async fn remove_attribute(&self, name: &str) -> Result<Option<String>> {
        let key = self.registry().settings().session_key(&self.id());
        let store = self.registry().store();

        let existing = store.hash_get(&key, name).await?;
        store.hash_delete(&key, name).await?;

        self.registry()
            .listeners()
            .attribute_removed(self, name, existing.as_deref());
        trace!(session_id = %self.id(), attribute = %name, "Attribute removed");

        self.bump_timeout().await?;
        Ok(existing)
    }

    /// Write an attribute as JSON.
    pub async fn set_attribute_json<T: Serialize + ?Sized>(
        &self,
        name: &str,
        value: &T,
    ) -> Result<()> {
        let encoded = serde_json::to_string(value)?;
        self.set_attribute(name, encoded).await?;
        Ok(())
    }

    /// Read an attribute written with [`set_attribute_json`](Self::set_attribute_json).
    pub async fn get_attribute_json<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        match self.get_attribute(name).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Delete the session from the store.
    ///
    /// Both keys go in one atomic batch. With a request context, the id is
    /// also cleared from the outbound response.
    pub async fn invalidate(&self, ctx: Option<&mut RequestContext>) -> Result<()> {
        let id = self.id();
        let settings = self.registry().settings();

        self.registry()
            .store()
            .run_atomic(&[
                StoreCommand::delete(settings.session_key(&id)),
                StoreCommand::delete(settings.created_key(&id)),
            ])
            .await?;

        if let Some(ctx) = ctx {
            ctx.detach_new_session(&id);
            let config = self.inner.config.read().clone();
            if let Some(config) = config {
                config.clear_session(ctx, &id);
            }
        }

        self.registry().listeners().session_destroyed(self);
        debug!(
            deployment = %settings.deployment_name,
            session_id = %id,
            "Session invalidated"
        );
        Ok(())
    }

    /// Move the session to a freshly allocated id and return it.
    ///
    /// The attribute hash and the metadata key are renamed together in one
    /// atomic batch, so both keep their shared TTL under the new id. `config`
    /// carries the new id to the client and is used by later
    /// [`invalidate`](Self::invalidate) calls on this record.
    ///
    /// Which keys to rename is decided by existence checks made before the
    /// batch. A key that expires in between makes its `RENAME` fail inside the
    /// batch; Redis does not roll back the other rename.
    pub async fn change_id(
        &self,
        ctx: &mut RequestContext,
        config: Arc<dyn SessionConfig>,
    ) -> Result<String> {
        let old_id = self.id();
        let new_id = self.registry().allocate_id().await?;
        let settings = self.registry().settings();
        let store = self.registry().store();

        let mut renames = Vec::with_capacity(2);
        for (from, to) in [
            (settings.session_key(&old_id), settings.session_key(&new_id)),
            (settings.created_key(&old_id), settings.created_key(&new_id)),
        ] {
            // An attribute-less session has no hash to move.
            if store.exists(&from).await? {
                renames.push(StoreCommand::rename(from, to));
            }
        }
        if !renames.is_empty() {
            store.run_atomic(&renames).await?;
        }

        *self.inner.id.write() = new_id.clone();
        config.set_session_id(ctx, &new_id);
        *self.inner.config.write() = Some(config);
        self.registry()
            .listeners()
            .session_id_changed(self, &old_id);

        debug!(
            deployment = %settings.deployment_name,
            old_id = %old_id,
            session_id = %new_id,
            "Session id changed"
        );
        Ok(new_id)
    }

    /// Refresh the TTL of both session keys in one atomic batch.
    async fn bump_timeout(&self) -> Result<()> {
        let id = self.id();
        let settings = self.registry().settings();
        let seconds = self.max_inactive_interval();
        self.registry()
            .store()
            .run_atomic(&[
                StoreCommand::expire(settings.session_key(&id), seconds),
                StoreCommand::expire(settings.created_key(&id), seconds),
            ])
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for SessionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRecord")
            .field("id", &self.id())
            .field("creation_time", &self.inner.creation_time)
            .field("max_inactive_secs", &self.max_inactive_interval())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SessionStore;
    use crate::test_support::{RecordingListener, registry_with_memory};
    use crate::transport::{CookieSessionConfig, OutboundCookie};
    use serde::Deserialize;

    async fn new_session() -> (SessionRecord, crate::MemoryStore) {
        let (registry, store) = registry_with_memory();
        let mut ctx = RequestContext::new();
        let session = registry.create_session(&mut ctx, None).await.unwrap();
        (session, store)
    }

    #[tokio::test]
    async fn test_set_then_get_round_trip() {
        let (session, _store) = new_session().await;

        let written = session.set_attribute("shape", "triangle").await.unwrap();
        assert_eq!(written, "triangle");
        assert_eq!(
            session.get_attribute("shape").await.unwrap(),
            Some("triangle".to_string())
        );
        assert_eq!(session.get_attribute("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_added_then_updated() {
        let (session, _store) = new_session().await;
        let listener = Arc::new(RecordingListener::default());
        session.registry().register_listener(listener.clone());

        session.set_attribute("k", "a").await.unwrap();
        session.set_attribute("k", "b").await.unwrap();

        assert_eq!(listener.events(), vec!["added:k=a", "updated:k=b<-a"]);
    }

    #[tokio::test]
    async fn test_remove_returns_prior_value() {
        let (session, _store) = new_session().await;
        let listener = Arc::new(RecordingListener::default());
        session.registry().register_listener(listener.clone());

        session.set_attribute("shape", "square").await.unwrap();
        let removed = session.remove_attribute("shape").await.unwrap();

        assert_eq!(removed, Some("square".to_string()));
        assert_eq!(session.get_attribute("shape").await.unwrap(), None);
        assert_eq!(
            listener.events(),
            vec!["added:shape=square", "removed:shape=square"]
        );
    }

    #[tokio::test]
    async fn test_remove_missing_still_notifies() {
        let (session, _store) = new_session().await;
        let listener = Arc::new(RecordingListener::default());
        session.registry().register_listener(listener.clone());

        assert_eq!(session.remove_attribute("ghost").await.unwrap(), None);
        assert_eq!(listener.events(), vec!["removed:ghost=<none>"]);
    }

    #[tokio::test]
    async fn test_last_attribute_removed_keeps_metadata() {
        let (session, store) = new_session().await;
        let settings = session.registry().settings().clone();

        session.set_attribute("shape", "square").await.unwrap();
        session.remove_attribute("shape").await.unwrap();

        assert!(!store.exists(&settings.session_key(&session.id())).await.unwrap());
        assert!(store.exists(&settings.created_key(&session.id())).await.unwrap());
    }

    #[tokio::test]
    async fn test_attribute_names() {
        let (session, _store) = new_session().await;
        session.set_attribute("a", "1").await.unwrap();
        session.set_attribute("b", "2").await.unwrap();

        let names = session.get_attribute_names().await.unwrap();
        assert_eq!(names, HashSet::from(["a".to_string(), "b".to_string()]));
    }

    #[tokio::test]
    async fn test_ttl_coupling_after_every_operation() {
        let (session, store) = new_session().await;
        session.set_max_inactive_interval(300).await.unwrap();
        let settings = session.registry().settings().clone();
        let primary = settings.session_key(&session.id());
        let created = settings.created_key(&session.id());

        session.set_attribute("k", "v").await.unwrap();
        assert_eq!(store.ttl(&primary).await.unwrap(), Some(300));
        assert_eq!(store.ttl(&created).await.unwrap(), Some(300));

        session.get_attribute("k").await.unwrap();
        assert_eq!(store.ttl(&primary).await.unwrap(), Some(300));
        assert_eq!(store.ttl(&created).await.unwrap(), Some(300));

        session.get_attribute_names().await.unwrap();
        assert_eq!(store.ttl(&primary).await.unwrap(), Some(300));
        assert_eq!(store.ttl(&created).await.unwrap(), Some(300));
    }

    #[tokio::test]
    async fn test_set_max_inactive_interval_applies_immediately() {
        let (session, store) = new_session().await;
        session.set_attribute("k", "v").await.unwrap();

        session.set_max_inactive_interval(42).await.unwrap();

        let settings = session.registry().settings();
        assert_eq!(session.max_inactive_interval(), 42);
        assert_eq!(
            store.ttl(&settings.session_key(&session.id())).await.unwrap(),
            Some(42)
        );
        assert_eq!(
            store.ttl(&settings.created_key(&session.id())).await.unwrap(),
            Some(42)
        );
    }

    #[tokio::test]
    async fn test_last_accessed_time_is_recent_after_access() {
        let (session, _store) = new_session().await;
        session.set_attribute("k", "v").await.unwrap();

        let last = session.last_accessed_time().await.unwrap();
        let drift = (Utc::now() - last).num_milliseconds().abs();
        assert!(drift < 2_000, "drift was {drift}ms");
    }

    #[tokio::test]
    async fn test_last_accessed_time_without_key() {
        let (session, _store) = new_session().await;
        session.set_max_inactive_interval(60).await.unwrap();

        // No attributes, so there is no hash and no remaining TTL.
        let last = session.last_accessed_time().await.unwrap();
        let idle = (Utc::now() - last).num_seconds();
        assert!((59..=61).contains(&idle), "idle was {idle}s");
    }

    #[tokio::test]
    async fn test_invalidate_deletes_both_keys() {
        let (registry, store) = registry_with_memory();
        let listener = Arc::new(RecordingListener::default());
        registry.register_listener(listener.clone());
        let mut ctx = RequestContext::new();
        let session = registry.create_session(&mut ctx, None).await.unwrap();
        session.set_attribute("k", "v").await.unwrap();
        let id = session.id();

        session.invalidate(Some(&mut ctx)).await.unwrap();

        let settings = registry.settings();
        assert!(!store.exists(&settings.session_key(&id)).await.unwrap());
        assert!(!store.exists(&settings.created_key(&id)).await.unwrap());
        assert!(ctx.new_session().is_none());
        assert_eq!(
            CookieSessionConfig::default().find_session_id(&ctx),
            None
        );
        assert_eq!(listener.events().last().map(String::as_str), Some("destroyed"));
        assert!(registry.get_session(&ctx, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalidate_without_context() {
        let (session, store) = new_session().await;
        session.set_attribute("k", "v").await.unwrap();

        session.invalidate(None).await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_change_id_moves_both_keys() {
        let (registry, store) = registry_with_memory();
        let listener = Arc::new(RecordingListener::default());
        registry.register_listener(listener.clone());
        let mut ctx = RequestContext::new();
        let session = registry.create_session(&mut ctx, None).await.unwrap();
        session.set_attribute("user", "alice").await.unwrap();
        session.set_attribute("role", "admin").await.unwrap();
        let old_id = session.id();

        let config = Arc::new(CookieSessionConfig::default());
        let new_id = session.change_id(&mut ctx, config.clone()).await.unwrap();

        assert_ne!(new_id, old_id);
        assert_eq!(session.id(), new_id);

        let settings = registry.settings();
        assert!(!store.exists(&settings.session_key(&old_id)).await.unwrap());
        assert!(!store.exists(&settings.created_key(&old_id)).await.unwrap());
        assert!(store.exists(&settings.created_key(&new_id)).await.unwrap());
        assert_eq!(
            store.ttl(&settings.session_key(&new_id)).await.unwrap(),
            store.ttl(&settings.created_key(&new_id)).await.unwrap()
        );

        let reloaded = registry
            .get_session_by_id(Some(new_id.as_str()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            reloaded.get_attribute("user").await.unwrap(),
            Some("alice".to_string())
        );
        assert_eq!(
            reloaded.get_attribute("role").await.unwrap(),
            Some("admin".to_string())
        );
        assert_eq!(
            reloaded.creation_time().timestamp_millis(),
            session.creation_time().timestamp_millis()
        );

        assert_eq!(config.find_session_id(&ctx), Some(new_id.clone()));
        assert_eq!(
            listener.events().last().cloned(),
            Some(format!("id_changed:{old_id}"))
        );
    }

    #[tokio::test]
    async fn test_change_id_visible_through_request_attachment() {
        let (registry, _store) = registry_with_memory();
        let mut ctx = RequestContext::new();
        let session = registry.create_session(&mut ctx, None).await.unwrap();

        let new_id = session
            .change_id(&mut ctx, Arc::new(CookieSessionConfig::default()))
            .await
            .unwrap();

        let attached = registry.get_session(&ctx, None).await.unwrap().unwrap();
        assert_eq!(attached.id(), new_id);
    }

    #[tokio::test]
    async fn test_change_id_without_attributes_moves_metadata() {
        let (registry, store) = registry_with_memory();
        let mut ctx = RequestContext::new();
        let session = registry.create_session(&mut ctx, None).await.unwrap();
        session.set_max_inactive_interval(300).await.unwrap();
        let old_id = session.id();

        let new_id = session
            .change_id(&mut ctx, Arc::new(CookieSessionConfig::default()))
            .await
            .unwrap();

        let settings = registry.settings();
        assert!(!store.exists(&settings.created_key(&old_id)).await.unwrap());
        assert!(!store.exists(&settings.session_key(&new_id)).await.unwrap());
        assert_eq!(
            store.get(&settings.created_key(&new_id)).await.unwrap(),
            Some(session.creation_time().timestamp_millis().to_string())
        );
        assert_eq!(
            store.ttl(&settings.created_key(&new_id)).await.unwrap(),
            Some(300)
        );
        assert_eq!(
            registry.all_sessions().await.unwrap(),
            HashSet::from([new_id.clone()])
        );

        // The first attribute lands under the new id and shares the TTL.
        session.set_attribute("k", "v").await.unwrap();
        let reloaded = registry
            .get_session_by_id(Some(new_id.as_str()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reloaded.get_attribute("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(reloaded.max_inactive_interval(), 300);
    }

    #[tokio::test]
    async fn test_invalidate_uses_config_from_last_rotation() {
        let (registry, _store) = registry_with_memory();
        let mut ctx = RequestContext::new();
        let session = registry.create_session(&mut ctx, None).await.unwrap();

        let sid = Arc::new(CookieSessionConfig::new("sid"));
        session.change_id(&mut ctx, sid.clone()).await.unwrap();
        session.invalidate(Some(&mut ctx)).await.unwrap();

        assert_eq!(ctx.response_cookie("sid"), Some(&OutboundCookie::Clear));
        assert_eq!(sid.find_session_id(&ctx), None);
    }

    #[tokio::test]
    async fn test_invalidate_without_attributes() {
        let (registry, store) = registry_with_memory();
        let mut ctx = RequestContext::new();
        let session = registry.create_session(&mut ctx, None).await.unwrap();
        assert_eq!(store.len(), 1);

        session.invalidate(Some(&mut ctx)).await.unwrap();

        assert!(store.is_empty());
        assert!(registry.all_sessions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_interval_is_rejected() {
        let (session, store) = new_session().await;
        let created = session.registry().settings().created_key(&session.id());

        let result = session.set_max_inactive_interval(u64::MAX).await;

        assert!(matches!(
            result,
            Err(crate::Error::InvalidTimeout { seconds: u64::MAX, .. })
        ));
        assert_eq!(session.max_inactive_interval(), 30 * 60);
        assert_eq!(store.ttl(&created).await.unwrap(), Some(30 * 60));
    }

    #[tokio::test]
    async fn test_last_accessed_time_with_longest_interval() {
        let (session, _store) = new_session().await;
        session
            .set_max_inactive_interval(crate::MAX_TIMEOUT_SECS)
            .await
            .unwrap();

        // No hash, so the whole interval counts as idle.
        let last = session.last_accessed_time().await.unwrap();
        let idle = (Utc::now() - last).num_seconds();
        let expected = i64::try_from(crate::MAX_TIMEOUT_SECS).unwrap();
        assert!((expected - 1..=expected + 1).contains(&idle), "idle was {idle}s");
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Bean {
        id: u64,
        name: String,
    }

    #[tokio::test]
    async fn test_json_attributes() {
        let (session, _store) = new_session().await;
        let bean = Bean {
            id: 1,
            name: "name".to_string(),
        };

        session.set_attribute_json("object", &bean).await.unwrap();
        let loaded: Option<Bean> = session.get_attribute_json("object").await.unwrap();
        assert_eq!(loaded, Some(bean));

        session.set_attribute("broken", "not json").await.unwrap();
        let result = session.get_attribute_json::<Bean>("broken").await;
        assert!(matches!(result, Err(crate::Error::Serialization(_))));
    }
}
