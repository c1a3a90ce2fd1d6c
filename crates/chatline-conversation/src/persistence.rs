use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use chatline_common::{Contact, Result, Turn};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::{CacheEntry, CacheKey};

/// Everything one cache namespace holds, in a serializable shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    #[serde(default)]
    pub turns: Vec<(CacheKey, CacheEntry<Turn>)>,
    #[serde(default)]
    pub contacts: Vec<(CacheKey, CacheEntry<Contact>)>,
}

/// Client-local backing for [`crate::ClientCache`], so cached state
/// survives a reload.
pub trait CacheStorage: Send + Sync {
    fn load(&self, namespace: &str) -> Result<Option<CacheSnapshot>>;
    fn save(&self, namespace: &str, snapshot: &CacheSnapshot) -> Result<()>;
    fn remove(&self, namespace: &str) -> Result<()>;
}

/// One `<namespace>.json` file per cache namespace.
pub struct JsonFileStorage {
    dir: PathBuf,
}

impl JsonFileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, namespace: &str) -> PathBuf {
        self.dir.join(format!("{namespace}.json"))
    }
}

impl CacheStorage for JsonFileStorage {
    fn load(&self, namespace: &str) -> Result<Option<CacheSnapshot>> {
        let path = self.path_for(namespace);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)?;
        let snapshot = serde_json::from_str(&contents)?;
        debug!("loaded cache snapshot from {}", path.display());
        Ok(Some(snapshot))
    }

    fn save(&self, namespace: &str, snapshot: &CacheSnapshot) -> Result<()> {
        let path = self.path_for(namespace);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(snapshot)?)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, namespace: &str) -> Result<()> {
        match std::fs::remove_file(self.path_for(namespace)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Keeps serialized snapshots in memory. Used when the cache is ephemeral
/// and in tests.
#[derive(Default)]
pub struct MemoryStorage {
    snapshots: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStorage for MemoryStorage {
    fn load(&self, namespace: &str) -> Result<Option<CacheSnapshot>> {
        let snapshots = self.snapshots.lock().unwrap_or_else(|e| e.into_inner());
        snapshots
            .get(namespace)
            .map(|raw| serde_json::from_str(raw).map_err(Into::into))
            .transpose()
    }

    fn save(&self, namespace: &str, snapshot: &CacheSnapshot) -> Result<()> {
        let raw = serde_json::to_string(snapshot)?;
        self.snapshots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(namespace.to_string(), raw);
        Ok(())
    }

    fn remove(&self, namespace: &str) -> Result<()> {
        self.snapshots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(namespace);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatline_common::{ActorId, ConversationId, CounterpartKind, TurnRole};
    use chrono::Utc;

    fn snapshot() -> CacheSnapshot {
        let actor = ActorId::new("u1");
        let conv = ConversationId::new("c1");
        CacheSnapshot {
            turns: vec![(
                CacheKey::turns(actor.clone(), conv.clone()),
                CacheEntry {
                    items: vec![Turn::new(conv, TurnRole::Actor, "hello")],
                    has_more: true,
                    captured_at: Utc::now(),
                },
            )],
            contacts: vec![(
                CacheKey::contacts(actor),
                CacheEntry {
                    items: vec![Contact::new("c1", "Ana", CounterpartKind::Scripted)],
                    has_more: false,
                    captured_at: Utc::now(),
                },
            )],
        }
    }

    #[test]
    fn json_file_storage_persists_per_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::new(dir.path().join("cache")).unwrap();

        assert!(storage.load("dm").unwrap().is_none());

        let snap = snapshot();
        storage.save("dm", &snap).unwrap();
        assert_eq!(storage.load("dm").unwrap(), Some(snap));
        assert!(storage.load("im").unwrap().is_none());

        storage.remove("dm").unwrap();
        assert!(storage.load("dm").unwrap().is_none());
        storage.remove("dm").unwrap();
    }

    #[test]
    fn corrupt_snapshot_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::new(dir.path()).unwrap();
        std::fs::write(dir.path().join("dm.json"), "{not json").unwrap();
        assert!(storage.load("dm").is_err());
    }

    #[test]
    fn memory_storage_round_trips() {
        let storage = MemoryStorage::new();
        let snap = snapshot();
        storage.save("im", &snap).unwrap();
        assert_eq!(storage.load("im").unwrap(), Some(snap));
        storage.remove("im").unwrap();
        assert!(storage.load("im").unwrap().is_none());
    }
}
