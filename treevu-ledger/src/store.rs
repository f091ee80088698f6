//! Key/value persistence for per-user slices.
//!
//! Every slice is one JSON document stored under `treevu:<user_id>:<slice>`.
//! A missing key loads as the slice's default; there are no migrations.

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Minimal string key/value store
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
}

/// Named per-user slices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slice {
    Expenses,
    Diverted,
    Goals,
    Budget,
    User,
    Tribes,
    Notifications,
}

impl Slice {
    pub const ALL: [Slice; 7] = [
        Slice::Expenses,
        Slice::Diverted,
        Slice::Goals,
        Slice::Budget,
        Slice::User,
        Slice::Tribes,
        Slice::Notifications,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Slice::Expenses => "expenses",
            Slice::Diverted => "diverted",
            Slice::Goals => "goals",
            Slice::Budget => "budget",
            Slice::User => "user",
            Slice::Tribes => "tribes",
            Slice::Notifications => "notifications",
        }
    }

    pub fn key(&self, user_id: &str) -> String {
        format!("treevu:{}:{}", user_id, self.name())
    }
}

/// In-process store, used by tests and dry runs
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// One JSON file per key inside a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File names are the URL-safe base64 of the key, so distinct keys never collide.
    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", URL_SAFE_NO_PAD.encode(key)))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let p = self.path_for(key);
        if !p.exists() {
            return Ok(None);
        }
        let s = fs::read_to_string(&p).with_context(|| format!("read {}", p.display()))?;
        Ok(Some(s))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let p = self.path_for(key);
        // Write-then-rename so a crash never leaves half a slice behind
        let tmp = p.with_extension("json.tmp");
        fs::write(&tmp, value).with_context(|| format!("write {}", tmp.display()))?;
        fs::rename(&tmp, &p).with_context(|| format!("rename {} -> {}", tmp.display(), p.display()))?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        let p = self.path_for(key);
        if p.exists() {
            fs::remove_file(&p).with_context(|| format!("remove {}", p.display()))?;
        }
        Ok(())
    }
}

/// Typed access to one user's slices
#[derive(Debug, Clone)]
pub struct SliceStore<S> {
    user_id: String,
    inner: S,
}

impl<S: KeyValueStore> SliceStore<S> {
    pub fn new(user_id: impl Into<String>, inner: S) -> Self {
        Self { user_id: user_id.into(), inner }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Load a slice. Missing keys and unreadable JSON both yield the default;
    /// the latter is logged.
    pub fn load<T: DeserializeOwned + Default>(&self, slice: Slice) -> Result<T> {
        let key = slice.key(&self.user_id);
        let Some(raw) = self.inner.get(&key)? else {
            debug!(%key, "slice missing, using default");
            return Ok(T::default());
        };
        match serde_json::from_str(&raw) {
            Ok(v) => Ok(v),
            Err(e) => {
                warn!(%key, error = %e, "slice unreadable, using default");
                Ok(T::default())
            }
        }
    }

    pub fn save<T: Serialize + ?Sized>(&mut self, slice: Slice, value: &T) -> Result<()> {
        let key = slice.key(&self.user_id);
        let json = serde_json::to_string(value).with_context(|| format!("serialize {key}"))?;
        self.inner.set(&key, &json)?;
        debug!(%key, bytes = json.len(), "slice saved");
        Ok(())
    }

    /// Remove every slice for this user.
    pub fn clear(&mut self) -> Result<()> {
        for slice in Slice::ALL {
            self.inner.remove(&slice.key(&self.user_id))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
    struct Counter {
        n: u32,
    }

    #[test]
    fn test_missing_key_is_default() {
        let store = SliceStore::new("u1", MemoryStore::new());
        let c: Counter = store.load(Slice::User).unwrap();
        assert_eq!(c, Counter::default());
        let list: Vec<String> = store.load(Slice::Expenses).unwrap();
        assert!(list.is_empty());
    }

    #[test]
    fn test_round_trip_is_per_user() {
        let mut mem = MemoryStore::new();
        mem.set("treevu:u2:user", r#"{"n": 9}"#).unwrap();
        let mut store = SliceStore::new("u1", mem);
        store.save(Slice::User, &Counter { n: 3 }).unwrap();
        assert_eq!(store.load::<Counter>(Slice::User).unwrap(), Counter { n: 3 });
        assert_eq!(store.inner().get("treevu:u2:user").unwrap().as_deref(), Some(r#"{"n": 9}"#));
    }

    #[test]
    fn test_corrupt_slice_falls_back() {
        let mut mem = MemoryStore::new();
        mem.set(&Slice::User.key("u1"), "{not json").unwrap();
        let store = SliceStore::new("u1", mem);
        assert_eq!(store.load::<Counter>(Slice::User).unwrap(), Counter::default());
    }

    #[test]
    fn test_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut fs_store = FileStore::open(dir.path().join("data")).unwrap();
        assert_eq!(fs_store.get("treevu:u1:goals").unwrap(), None);
        fs_store.set("treevu:u1:goals", "[]").unwrap();
        assert_eq!(std::fs::read_dir(dir.path().join("data")).unwrap().count(), 1);
        assert_eq!(fs_store.get("treevu:u1:goals").unwrap().as_deref(), Some("[]"));
        fs_store.remove("treevu:u1:goals").unwrap();
        assert_eq!(fs_store.get("treevu:u1:goals").unwrap(), None);
    }

    #[test]
    fn test_file_store_keys_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let mut dotted = SliceStore::new("a.b", FileStore::open(dir.path()).unwrap());
        let mut underscored = SliceStore::new("a_b", FileStore::open(dir.path()).unwrap());
        dotted.save(Slice::User, &Counter { n: 1 }).unwrap();
        underscored.save(Slice::User, &Counter { n: 2 }).unwrap();

        assert_eq!(dotted.load::<Counter>(Slice::User).unwrap(), Counter { n: 1 });
        assert_eq!(underscored.load::<Counter>(Slice::User).unwrap(), Counter { n: 2 });
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_clear() {
        let mut store = SliceStore::new("u1", MemoryStore::new());
        store.save(Slice::Goals, &Vec::<u32>::new()).unwrap();
        store.save(Slice::Budget, &Counter { n: 1 }).unwrap();
        assert_eq!(store.inner().len(), 2);
        store.clear().unwrap();
        assert!(store.inner().is_empty());
    }
}
