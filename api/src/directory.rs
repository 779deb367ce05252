//! In-memory case directory backing the read-only listing endpoints.
//!
//! Lives for the process lifetime only. There is no eviction; a restart empties
//! it, and the client archive remains the durable record.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use caseflow_core::cases::{DirectoryEntry, RunResult};
use caseflow_core::limits::{CASE_LIST_MAX, clamp_limit};
use chrono::{DateTime, Utc};
use uuid::Uuid;

struct Slot {
    entry: DirectoryEntry,
    /// Insertion sequence, breaks ties between identical timestamps
    seq: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Slot>,
    next_seq: u64,
}

#[derive(Default)]
pub struct DirectoryStore {
    inner: Mutex<Inner>,
}

impl DirectoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a new case under a fresh random id.
    pub fn create(&self, query: &str, result: RunResult) -> DirectoryEntry {
        self.create_at(query, result, Utc::now())
    }

    fn create_at(
        &self,
        query: &str,
        result: RunResult,
        created_at: DateTime<Utc>,
    ) -> DirectoryEntry {
        let entry = DirectoryEntry {
            id: Uuid::new_v4().to_string(),
            created_at,
            query: query.to_string(),
            result,
        };

        let mut inner = self.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.insert(
            entry.id.clone(),
            Slot {
                entry: entry.clone(),
                seq,
            },
        );
        entry
    }

    pub fn get(&self, id: &str) -> Option<DirectoryEntry> {
        self.lock().entries.get(id).map(|slot| slot.entry.clone())
    }

    /// Newest first, truncated to `clamp(limit, 1, 200)`.
    pub fn list(&self, limit: i64) -> Vec<DirectoryEntry> {
        let limit = clamp_limit(limit, CASE_LIST_MAX);
        let inner = self.lock();
        let mut slots: Vec<&Slot> = inner.entries.values().collect();
        slots.sort_by(|a, b| {
            b.entry
                .created_at
                .cmp(&a.entry.created_at)
                .then(b.seq.cmp(&a.seq))
        });
        slots
            .into_iter()
            .take(limit)
            .map(|slot| slot.entry.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn get_returns_none_when_absent() {
        let store = DirectoryStore::new();
        assert!(store.get("missing").is_none());
        let entry = store.create("open a kiosk", RunResult::default());
        assert_eq!(store.get(&entry.id).map(|e| e.query), Some("open a kiosk".to_string()));
    }

    #[test]
    fn list_is_newest_first_and_bounded() {
        let store = DirectoryStore::new();
        let base = Utc::now();
        for i in 0..250 {
            store.create_at(
                &format!("query {i}"),
                RunResult::default(),
                base + Duration::seconds(i),
            );
        }

        let listed = store.list(500);
        assert_eq!(listed.len(), 200);
        assert!(listed.windows(2).all(|w| w[0].created_at > w[1].created_at));
        assert_eq!(listed[0].query, "query 249");

        assert_eq!(store.list(0).len(), 1);
        assert_eq!(store.list(-3).len(), 1);
        assert_eq!(store.list(7).len(), 7);
    }

    #[test]
    fn identical_timestamps_fall_back_to_insertion_order() {
        let store = DirectoryStore::new();
        let at = Utc::now();
        let first = store.create_at("a", RunResult::default(), at);
        let second = store.create_at("b", RunResult::default(), at);

        let listed = store.list(10);
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);
    }

    #[test]
    fn list_on_empty_store_is_empty() {
        assert!(DirectoryStore::new().list(50).is_empty());
    }
}
