// src/dedup.rs
//! Durable deduplication of handled item ids, plus the resolved-handle map.
//!
//! Both stores are schema-free JSON documents rewritten wholesale on save
//! (tmp file + rename). The processed-id sets keep insertion order so the
//! 1000-entry cap evicts the oldest member, never an arbitrary one.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::poll::types::Category;

pub const DEFAULT_CAP: usize = 1000;

/// Ordered set: O(1) membership, insertion-order eviction.
#[derive(Debug, Default)]
struct SeenSet {
    order: VecDeque<String>,
    members: HashSet<String>,
}

impl SeenSet {
    fn from_ids(ids: Vec<String>, cap: usize) -> Self {
        let mut set = Self::default();
        for id in ids {
            set.insert(&id, cap);
        }
        set
    }

    fn contains(&self, id: &str) -> bool {
        self.members.contains(id)
    }

    /// Returns false when the id was already present.
    fn insert(&mut self, id: &str, cap: usize) -> bool {
        if !self.members.insert(id.to_string()) {
            return false;
        }
        self.order.push_back(id.to_string());
        while self.order.len() > cap {
            if let Some(evicted) = self.order.pop_front() {
                self.members.remove(&evicted);
            }
        }
        true
    }

    fn ids_in_order(&self) -> Vec<String> {
        self.order.iter().cloned().collect()
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedIds {
    #[serde(default)]
    news: Vec<String>,
    #[serde(default)]
    social: Vec<String>,
}

pub struct DedupStore {
    path: PathBuf,
    cap: usize,
    news: SeenSet,
    social: SeenSet,
}

impl DedupStore {
    /// Load persisted ids from `path`; a missing file yields an empty store.
    pub fn load(path: impl Into<PathBuf>, cap: usize) -> Result<Self> {
        let path = path.into();
        let cap = cap.max(1);
        let persisted = match fs::read_to_string(&path) {
            Ok(s) => serde_json::from_str::<PersistedIds>(&s)
                .with_context(|| format!("parsing processed ids from {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => PersistedIds::default(),
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", path.display()));
            }
        };
        Ok(Self {
            path,
            cap,
            news: SeenSet::from_ids(persisted.news, cap),
            social: SeenSet::from_ids(persisted.social, cap),
        })
    }

    fn set(&self, category: Category) -> &SeenSet {
        match category {
            Category::News => &self.news,
            Category::Social => &self.social,
        }
    }

    pub fn is_seen(&self, category: Category, id: &str) -> bool {
        self.set(category).contains(id)
    }

    /// Mark an id as handled. Returns false if it was already marked.
    ///
    /// Call this *before* handing the item to analysis: a crash between
    /// marking and alerting loses that one alert, but a restart can never
    /// alert twice on the same item.
    pub fn mark_seen(&mut self, category: Category, id: &str) -> bool {
        let cap = self.cap;
        match category {
            Category::News => self.news.insert(id, cap),
            Category::Social => self.social.insert(id, cap),
        }
    }

    /// Persist both sets wholesale, most recent `cap` entries per category.
    pub fn save(&self) -> Result<()> {
        let doc = PersistedIds {
            news: self.news.ids_in_order(),
            social: self.social.ids_in_order(),
        };
        write_json_atomic(&self.path, &doc)
            .with_context(|| format!("saving processed ids to {}", self.path.display()))
    }

    pub fn len(&self, category: Category) -> usize {
        self.set(category).len()
    }

    pub fn is_empty(&self) -> bool {
        self.news.len() == 0 && self.social.len() == 0
    }
}

/// Persisted `{ externalName: internalId }` map for the social feed.
///
/// Handles are resolved once through the fetcher and remembered so restarts
/// don't burn request budget on lookups.
pub struct HandleDirectory {
    path: PathBuf,
    map: BTreeMap<String, String>,
}

impl HandleDirectory {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let map = match fs::read_to_string(&path) {
            Ok(s) => serde_json::from_str(&s)
                .with_context(|| format!("parsing handle map from {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };
        Ok(Self { path, map })
    }

    pub fn get(&self, handle: &str) -> Option<&str> {
        self.map.get(handle).map(String::as_str)
    }

    pub fn insert(&mut self, handle: &str, id: &str) {
        self.map.insert(handle.to_string(), id.to_string());
    }

    pub fn save(&self) -> Result<()> {
        write_json_atomic(&self.path, &self.map)
            .with_context(|| format!("saving handle map to {}", self.path.display()))
    }
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string(value)?;
    let mut f = fs::File::create(&tmp)?;
    f.write_all(json.as_bytes())?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_then_seen_is_immediate() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DedupStore::load(dir.path().join("ids.json"), 10).unwrap();
        assert!(!store.is_seen(Category::News, "a1"));
        assert!(store.mark_seen(Category::News, "a1"));
        assert!(store.is_seen(Category::News, "a1"));
        // second mark is a no-op
        assert!(!store.mark_seen(Category::News, "a1"));
        assert_eq!(store.len(Category::News), 1);
    }

    #[test]
    fn categories_do_not_share_ids() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DedupStore::load(dir.path().join("ids.json"), 10).unwrap();
        store.mark_seen(Category::News, "same-id");
        assert!(!store.is_seen(Category::Social, "same-id"));
    }

    #[test]
    fn cap_evicts_oldest_by_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DedupStore::load(dir.path().join("ids.json"), 3).unwrap();
        for id in ["a", "b", "c", "d"] {
            store.mark_seen(Category::Social, id);
        }
        assert_eq!(store.len(Category::Social), 3);
        assert!(!store.is_seen(Category::Social, "a"));
        assert!(store.is_seen(Category::Social, "b"));
        assert!(store.is_seen(Category::Social, "d"));
    }

    #[test]
    fn handle_directory_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("handles.json");
        let mut handles = HandleDirectory::load(&path).unwrap();
        handles.insert("elonmusk", "44196397");
        handles.save().unwrap();

        let reloaded = HandleDirectory::load(&path).unwrap();
        assert_eq!(reloaded.get("elonmusk"), Some("44196397"));
        assert_eq!(reloaded.get("unknown"), None);
    }
}
