//! Client-side cache of contacts and turn pages.
//!
//! Entries are keyed by actor scope plus conversation (turn pages) or by
//! actor scope alone (contact lists). There is no expiry: an entry lives
//! until it is overwritten or an explicit clear drops it. Every mutation is
//! written through to the configured [`CacheStorage`].

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use chatline_common::{ActorId, Contact, ConversationId, Cursor, Turn, TurnId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::persistence::{CacheSnapshot, CacheStorage};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub actor: ActorId,
    pub conversation: Option<ConversationId>,
}

impl CacheKey {
    pub fn turns(actor: ActorId, conversation: ConversationId) -> Self {
        Self {
            actor,
            conversation: Some(conversation),
        }
    }

    pub fn contacts(actor: ActorId) -> Self {
        Self {
            actor,
            conversation: None,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.conversation {
            Some(conversation) => write!(f, "{}_{}", self.actor, conversation),
            None => write!(f, "{}", self.actor),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub items: Vec<T>,
    pub has_more: bool,
    pub captured_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    fn new(items: Vec<T>, has_more: bool) -> Self {
        Self {
            items,
            has_more,
            captured_at: Utc::now(),
        }
    }
}

impl CacheEntry<Turn> {
    /// Cursor for the next older page: the oldest turn held.
    pub fn cursor(&self) -> Option<Cursor> {
        self.items.first().map(Turn::cursor)
    }
}

pub struct ClientCache {
    namespace: String,
    turns: RwLock<HashMap<CacheKey, CacheEntry<Turn>>>,
    contacts: RwLock<HashMap<CacheKey, CacheEntry<Contact>>>,
    storage: Arc<dyn CacheStorage>,
    persist_lock: Mutex<()>,
}

impl ClientCache {
    pub fn new(namespace: impl Into<String>, storage: Arc<dyn CacheStorage>) -> Self {
        Self {
            namespace: namespace.into(),
            turns: RwLock::new(HashMap::new()),
            contacts: RwLock::new(HashMap::new()),
            storage,
            persist_lock: Mutex::new(()),
        }
    }

    /// Rebuild the cache from its last persisted snapshot. An unreadable
    /// snapshot is discarded and the cache starts empty.
    pub fn restore(namespace: impl Into<String>, storage: Arc<dyn CacheStorage>) -> Self {
        let cache = Self::new(namespace, storage);
        match cache.storage.load(&cache.namespace) {
            Ok(Some(snapshot)) => {
                debug!(
                    namespace = %cache.namespace,
                    turn_keys = snapshot.turns.len(),
                    contact_keys = snapshot.contacts.len(),
                    "cache restored"
                );
                *cache.turns.write().unwrap_or_else(|e| e.into_inner()) =
                    snapshot.turns.into_iter().collect();
                *cache.contacts.write().unwrap_or_else(|e| e.into_inner()) =
                    snapshot.contacts.into_iter().collect();
            }
            Ok(None) => {}
            Err(e) => {
                warn!(namespace = %cache.namespace, "discarding unreadable cache snapshot: {e}");
                if let Err(e) = cache.storage.remove(&cache.namespace) {
                    warn!(namespace = %cache.namespace, "failed to remove cache snapshot: {e}");
                }
            }
        }
        cache
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry<Turn>> {
        self.turns
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    /// Replace the entry for `key` with a freshly fetched page.
    pub fn put(&self, key: CacheKey, mut turns: Vec<Turn>, has_more: bool) {
        sort_and_dedup(&mut turns);
        self.turns
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, CacheEntry::new(turns, has_more));
        self.persist();
    }

    /// Merge an older page into the entry, keeping the newer turns already
    /// held. A turn that arrives twice is stored once.
    pub fn append(&self, key: CacheKey, older: Vec<Turn>, has_more: bool) {
        {
            let mut turns = self.turns.write().unwrap_or_else(|e| e.into_inner());
            match turns.get_mut(&key) {
                Some(entry) => {
                    let mut merged = older;
                    merged.append(&mut entry.items);
                    sort_and_dedup(&mut merged);
                    entry.items = merged;
                    entry.has_more = has_more;
                    entry.captured_at = Utc::now();
                }
                None => {
                    let mut items = older;
                    sort_and_dedup(&mut items);
                    turns.insert(key, CacheEntry::new(items, has_more));
                }
            }
        }
        self.persist();
    }

    /// Insert a single turn at its chronological position, ignoring it if
    /// the id is already present. `has_more` is left as it was; an entry
    /// created here has not seen the store yet and reports `has_more`.
    pub fn push_latest(&self, key: CacheKey, turn: Turn) {
        {
            let mut turns = self.turns.write().unwrap_or_else(|e| e.into_inner());
            let entry = turns
                .entry(key)
                .or_insert_with(|| CacheEntry::new(Vec::new(), true));
            if entry.items.iter().any(|t| t.id == turn.id) {
                return;
            }
            let position = entry
                .items
                .partition_point(|t| t.sort_key() <= turn.sort_key());
            entry.items.insert(position, turn);
            entry.captured_at = Utc::now();
        }
        self.persist();
    }

    /// Drop one turn from an entry. Returns whether it was present.
    pub fn remove(&self, key: &CacheKey, turn_id: &TurnId) -> bool {
        let removed = {
            let mut turns = self.turns.write().unwrap_or_else(|e| e.into_inner());
            match turns.get_mut(key) {
                Some(entry) => {
                    let before = entry.items.len();
                    entry.items.retain(|t| &t.id != turn_id);
                    entry.items.len() != before
                }
                None => false,
            }
        };
        if removed {
            self.persist();
        }
        removed
    }

    pub fn get_contacts(&self, actor: &ActorId) -> Option<CacheEntry<Contact>> {
        self.contacts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&CacheKey::contacts(actor.clone()))
            .cloned()
    }

    pub fn put_contacts(&self, actor: ActorId, contacts: Vec<Contact>) {
        self.contacts
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(CacheKey::contacts(actor), CacheEntry::new(contacts, false));
        self.persist();
    }

    /// Evict every entry belonging to `actor`, e.g. on sign-out.
    pub fn clear_actor(&self, actor: &ActorId) {
        self.turns
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|key, _| &key.actor != actor);
        self.contacts
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|key, _| &key.actor != actor);
        debug!(namespace = %self.namespace, %actor, "actor cache cleared");
        self.persist();
    }

    pub fn clear(&self) {
        self.turns.write().unwrap_or_else(|e| e.into_inner()).clear();
        self.contacts
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        let _guard = self.persist_lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = self.storage.remove(&self.namespace) {
            warn!(namespace = %self.namespace, "failed to remove cache snapshot: {e}");
        }
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        let turns = self.turns.read().unwrap_or_else(|e| e.into_inner());
        let contacts = self.contacts.read().unwrap_or_else(|e| e.into_inner());
        CacheSnapshot {
            turns: turns
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            contacts: contacts
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    // The snapshot is taken under the persist lock so the last writer always
    // saves the latest state.
    fn persist(&self) {
        let _guard = self.persist_lock.lock().unwrap_or_else(|e| e.into_inner());
        let snapshot = self.snapshot();
        if let Err(e) = self.storage.save(&self.namespace, &snapshot) {
            warn!(namespace = %self.namespace, "failed to persist cache: {e}");
        }
    }
}

fn sort_and_dedup(turns: &mut Vec<Turn>) {
    turns.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    turns.dedup_by(|a, b| a.id == b.id);
}
