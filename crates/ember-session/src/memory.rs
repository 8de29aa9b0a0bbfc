//! In-process store for development and testing.
//!
//! Mirrors the Redis semantics the session model relies on: hashes vanish
//! with their last field, `SET` clears a TTL, `RENAME` carries the TTL over,
//! and expired keys behave as missing.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{StoreError, StoreResult};
use crate::store::{SessionStore, StoreCommand};

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    Hash(HashMap<String, String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    fn remaining(&self, now: Instant) -> Option<Duration> {
        self.expires_at.map(|at| at.saturating_duration_since(now))
    }
}

type Keyspace = HashMap<String, Entry>;

/// In-memory [`SessionStore`].
///
/// Not suitable for production: content is lost on restart and not shared
/// across processes. Clones share the same keyspace.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    keys: Arc<Mutex<Keyspace>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.keys
            .lock()
            .values()
            .filter(|entry| !entry.is_expired(now))
            .count()
    }

    /// Whether the store holds no live keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every key.
    pub fn flush(&self) {
        self.keys.lock().clear();
    }
}

/// Drop `key` if it has expired, then return its live entry.
fn live<'a>(keys: &'a mut Keyspace, key: &str, now: Instant) -> Option<&'a mut Entry> {
    if keys.get(key).is_some_and(|entry| entry.is_expired(now)) {
        keys.remove(key);
    }
    keys.get_mut(key)
}

fn apply(keys: &mut Keyspace, command: &StoreCommand, now: Instant) -> StoreResult<()> {
    match command {
        StoreCommand::Set { key, value } => {
            keys.insert(key.clone(), Entry::new(Value::Text(value.clone())));
        }
        StoreCommand::Expire { key, seconds } => {
            if *seconds == 0 {
                keys.remove(key);
            } else if let Some(entry) = live(keys, key, now) {
                let at = now
                    .checked_add(Duration::from_secs(*seconds))
                    .ok_or_else(|| StoreError::InvalidExpire {
                        key: key.clone(),
                        seconds: *seconds,
                    })?;
                entry.expires_at = Some(at);
            }
        }
        StoreCommand::Delete { key } => {
            keys.remove(key);
        }
        StoreCommand::Rename { from, to } => {
            if live(keys, from, now).is_none() {
                return Err(StoreError::NoSuchKey(from.clone()));
            }
            if let Some(entry) = keys.remove(from) {
                keys.insert(to.clone(), entry);
            }
        }
    }
    Ok(())
}

/// Glob match supporting `*` (any run) and `?` (any single character).
fn glob_match(pattern: &str, candidate: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let candidate: Vec<char> = candidate.chars().collect();

    let (mut p, mut c) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while c < candidate.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == candidate[c]) {
            p += 1;
            c += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some((p, c));
            p += 1;
        } else if let Some((star_p, star_c)) = star {
            p = star_p + 1;
            c = star_c + 1;
            star = Some((star_p, star_c + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&ch| ch == '*')
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut keys = self.keys.lock();
        Ok(live(&mut keys, key, Instant::now()).is_some())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut keys = self.keys.lock();
        match live(&mut keys, key, Instant::now()) {
            None => Ok(None),
            Some(Entry {
                value: Value::Text(text),
                ..
            }) => Ok(Some(text.clone())),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut keys = self.keys.lock();
        apply(&mut keys, &StoreCommand::set(key, value), Instant::now())
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<u64>> {
        Ok(self
            .remaining_millis(key)
            .await?
            .map(|millis| (millis + 500) / 1000))
    }

    async fn remaining_millis(&self, key: &str) -> StoreResult<Option<u64>> {
        let now = Instant::now();
        let mut keys = self.keys.lock();
        Ok(live(&mut keys, key, now)
            .and_then(|entry| entry.remaining(now))
            .map(|remaining| remaining.as_millis() as u64))
    }

    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        let mut keys = self.keys.lock();
        match live(&mut keys, key, Instant::now()) {
            None => Ok(None),
            Some(Entry {
                value: Value::Hash(fields),
                ..
            }) => Ok(fields.get(field).cloned()),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> StoreResult<()> {
        let mut keys = self.keys.lock();
        match live(&mut keys, key, Instant::now()) {
            None => {
                let fields = HashMap::from([(field.to_string(), value.to_string())]);
                keys.insert(key.to_string(), Entry::new(Value::Hash(fields)));
                Ok(())
            }
            Some(Entry {
                value: Value::Hash(fields),
                ..
            }) => {
                fields.insert(field.to_string(), value.to_string());
                Ok(())
            }
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    async fn hash_delete(&self, key: &str, field: &str) -> StoreResult<()> {
        let mut keys = self.keys.lock();
        let now_empty = match live(&mut keys, key, Instant::now()) {
            None => false,
            Some(Entry {
                value: Value::Hash(fields),
                ..
            }) => {
                fields.remove(field);
                fields.is_empty()
            }
            Some(_) => return Err(StoreError::WrongType(key.to_string())),
        };
        if now_empty {
            keys.remove(key);
        }
        Ok(())
    }

    async fn hash_field_names(&self, key: &str) -> StoreResult<HashSet<String>> {
        let mut keys = self.keys.lock();
        match live(&mut keys, key, Instant::now()) {
            None => Ok(HashSet::new()),
            Some(Entry {
                value: Value::Hash(fields),
                ..
            }) => Ok(fields.keys().cloned().collect()),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    async fn delete_key(&self, key: &str) -> StoreResult<()> {
        self.keys.lock().remove(key);
        Ok(())
    }

    async fn rename_key(&self, from: &str, to: &str) -> StoreResult<()> {
        let mut keys = self.keys.lock();
        apply(&mut keys, &StoreCommand::rename(from, to), Instant::now())
    }

    async fn keys_matching(&self, pattern: &str) -> StoreResult<HashSet<String>> {
        let now = Instant::now();
        let keys = self.keys.lock();
        Ok(keys
            .iter()
            .filter(|(key, entry)| !entry.is_expired(now) && glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn run_atomic(&self, commands: &[StoreCommand]) -> StoreResult<()> {
        let now = Instant::now();
        let mut keys = self.keys.lock();

        // Apply to a scratch copy so a failing command leaves nothing behind.
        let mut staged = keys.clone();
        for command in commands {
            apply(&mut staged, command, now)?;
        }
        *keys = staged;
        Ok(())
    }
}
