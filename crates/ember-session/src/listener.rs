//! Session lifecycle observers.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::record::SessionRecord;

/// Observer of session lifecycle events.
///
/// Callbacks run synchronously on the calling task, in registration order.
/// Notifications are advisory: attribute classification reads the prior
/// value without a store-side lock, so concurrent writers to the same
/// attribute can see an "added" where an "updated" was due.
pub trait SessionListener: Send + Sync {
    /// A session was created.
    fn session_created(&self, _session: &SessionRecord) {}

    /// A session was invalidated.
    fn session_destroyed(&self, _session: &SessionRecord) {}

    /// An attribute was set that had no prior value.
    fn attribute_added(&self, _session: &SessionRecord, _name: &str, _value: &str) {}

    /// An attribute was overwritten.
    fn attribute_updated(
        &self,
        _session: &SessionRecord,
        _name: &str,
        _new_value: &str,
        _old_value: &str,
    ) {
    }

    /// An attribute was removed. `old_value` is `None` if it was never set.
    fn attribute_removed(&self, _session: &SessionRecord, _name: &str, _old_value: Option<&str>) {}

    /// The session id was rotated. `session.id()` already returns the new id.
    fn session_id_changed(&self, _session: &SessionRecord, _old_id: &str) {}
}

/// Registry of [`SessionListener`]s.
///
/// Mutation is serialized by a single lock. Dispatch takes a snapshot of the
/// list and runs callbacks without holding it, so a listener may register or
/// remove listeners from inside a callback.
#[derive(Default)]
pub struct ListenerBus {
    listeners: Mutex<Arc<Vec<Arc<dyn SessionListener>>>>,
}

impl ListenerBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener.
    pub fn register(&self, listener: Arc<dyn SessionListener>) {
        let mut guard = self.listeners.lock();
        let mut next = Vec::clone(&guard);
        next.push(listener);
        *guard = Arc::new(next);
    }

    /// Remove a listener by identity. Returns whether it was registered.
    pub fn remove(&self, listener: &Arc<dyn SessionListener>) -> bool {
        let mut guard = self.listeners.lock();
        let before = guard.len();
        let next: Vec<_> = guard
            .iter()
            .filter(|existing| !Arc::ptr_eq(existing, listener))
            .cloned()
            .collect();
        let removed = next.len() != before;
        *guard = Arc::new(next);
        removed
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Whether no listeners are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Arc<Vec<Arc<dyn SessionListener>>> {
        Arc::clone(&self.listeners.lock())
    }

    pub(crate) fn session_created(&self, session: &SessionRecord) {
        for listener in self.snapshot().iter() {
            listener.session_created(session);
        }
    }

    pub(crate) fn session_destroyed(&self, session: &SessionRecord) {
        for listener in self.snapshot().iter() {
            listener.session_destroyed(session);
        }
    }

    pub(crate) fn attribute_added(&self, session: &SessionRecord, name: &str, value: &str) {
        for listener in self.snapshot().iter() {
            listener.attribute_added(session, name, value);
        }
    }

    pub(crate) fn attribute_updated(
        &self,
        session: &SessionRecord,
        name: &str,
        new_value: &str,
        old_value: &str,
    ) {
        for listener in self.snapshot().iter() {
            listener.attribute_updated(session, name, new_value, old_value);
        }
    }

    pub(crate) fn attribute_removed(
        &self,
        session: &SessionRecord,
        name: &str,
        old_value: Option<&str>,
    ) {
        for listener in self.snapshot().iter() {
            listener.attribute_removed(session, name, old_value);
        }
    }

    pub(crate) fn session_id_changed(&self, session: &SessionRecord, old_id: &str) {
        for listener in self.snapshot().iter() {
            listener.session_id_changed(session, old_id);
        }
    }
}

impl std::fmt::Debug for ListenerBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerBus")
            .field("listeners", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{RecordingListener, registry_with_memory};
    use crate::transport::RequestContext;

    #[test]
    fn test_register_and_remove_by_identity() {
        let bus = ListenerBus::new();
        let a: Arc<dyn SessionListener> = Arc::new(RecordingListener::default());
        let b: Arc<dyn SessionListener> = Arc::new(RecordingListener::default());

        bus.register(Arc::clone(&a));
        bus.register(Arc::clone(&b));
        assert_eq!(bus.len(), 2);

        assert!(bus.remove(&a));
        assert_eq!(bus.len(), 1);
        assert!(!bus.remove(&a));
    }

    #[tokio::test]
    async fn test_dispatch_in_registration_order() {
        let (registry, _store) = registry_with_memory();
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.register_listener(Arc::new(RecordingListener::with_log(
            "first",
            Arc::clone(&log),
        )));
        registry.register_listener(Arc::new(RecordingListener::with_log(
            "second",
            Arc::clone(&log),
        )));

        let mut ctx = RequestContext::new();
        registry.create_session(&mut ctx, None).await.unwrap();

        assert_eq!(*log.lock(), vec!["first:created", "second:created"]);
    }

    struct Unregistering {
        bus: Arc<ListenerBus>,
        me: Mutex<Option<Arc<dyn SessionListener>>>,
    }

    impl SessionListener for Unregistering {
        fn session_created(&self, _session: &SessionRecord) {
            if let Some(me) = self.me.lock().take() {
                self.bus.remove(&me);
            }
        }
    }

    #[tokio::test]
    async fn test_listener_may_mutate_bus_during_dispatch() {
        let (registry, _store) = registry_with_memory();
        let bus = registry.listeners();
        let listener = Arc::new(Unregistering {
            bus: Arc::clone(&bus),
            me: Mutex::new(None),
        });
        let as_dyn: Arc<dyn SessionListener> = listener.clone();
        *listener.me.lock() = Some(Arc::clone(&as_dyn));
        bus.register(as_dyn);

        let mut ctx = RequestContext::new();
        registry.create_session(&mut ctx, None).await.unwrap();

        assert!(bus.is_empty());
    }
}
