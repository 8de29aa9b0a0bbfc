//! Shared helpers for unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::id::SessionIdGenerator;
use crate::listener::SessionListener;
use crate::memory::MemoryStore;
use crate::record::SessionRecord;
use crate::registry::SessionRegistry;
use crate::transport::CookieSessionConfig;

/// Registry over a fresh [`MemoryStore`] with a default cookie config.
pub(crate) fn registry_with_memory() -> (SessionRegistry, MemoryStore) {
    let store = MemoryStore::new();
    let registry = SessionRegistry::builder(Arc::new(store.clone()))
        .with_session_config(Arc::new(CookieSessionConfig::default()))
        .build();
    (registry, store)
}

/// Hands out the given ids in order, repeating the last one forever.
pub(crate) struct FixedIdGenerator {
    ids: Vec<String>,
    calls: AtomicUsize,
}

impl FixedIdGenerator {
    pub(crate) fn new(ids: Vec<&str>) -> Self {
        Self {
            ids: ids.into_iter().map(str::to_string).collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SessionIdGenerator for FixedIdGenerator {
    fn generate(&self) -> String {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.ids[call.min(self.ids.len() - 1)].clone()
    }
}

/// Records every event as a short string.
#[derive(Default)]
pub(crate) struct RecordingListener {
    tag: Option<String>,
    log: Arc<Mutex<Vec<String>>>,
}

impl RecordingListener {
    pub(crate) fn with_log(tag: &str, log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            tag: Some(tag.to_string()),
            log,
        }
    }

    pub(crate) fn events(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    fn push(&self, event: String) {
        let event = match &self.tag {
            Some(tag) => format!("{tag}:{event}"),
            None => event,
        };
        self.log.lock().push(event);
    }
}

impl SessionListener for RecordingListener {
    fn session_created(&self, _session: &SessionRecord) {
        self.push("created".to_string());
    }

    fn session_destroyed(&self, _session: &SessionRecord) {
        self.push("destroyed".to_string());
    }

    fn attribute_added(&self, _session: &SessionRecord, name: &str, value: &str) {
        self.push(format!("added:{name}={value}"));
    }

    fn attribute_updated(
        &self,
        _session: &SessionRecord,
        name: &str,
        new_value: &str,
        old_value: &str,
    ) {
        self.push(format!("updated:{name}={new_value}<-{old_value}"));
    }

    fn attribute_removed(&self, _session: &SessionRecord, name: &str, old_value: Option<&str>) {
        self.push(format!("removed:{name}={}", old_value.unwrap_or("<none>")));
    }

    fn session_id_changed(&self, _session: &SessionRecord, old_id: &str) {
        self.push(format!("id_changed:{old_id}"));
    }
}
