//! Durable per-case storage owned by the client.
//!
//! Layout over the key-value store:
//!
//! | key                  | value                              |
//! |----------------------|------------------------------------|
//! | `cases.index`        | case ids, most recently created first |
//! | `case.{id}.record`   | [`CaseRecord`]                      |
//! | `case.{id}.result`   | [`RunResult`], written once         |
//! | `case.{id}.events`   | `Vec<ActivityEvent>` in arrival order |
//! | `case.{id}.chat`     | `Vec<ChatMessage>` in send order    |
//! | `reminders`          | `Vec<Reminder>` for every case      |
//!
//! Reads take the archive's read lock and multi-key writes its write lock, so
//! a reader never observes half of a delete.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use serde::de::DeserializeOwned;

use caseflow_core::cases::{ActivityEvent, CaseRecord, RunResult, RunStatus};
use caseflow_core::chat::ChatMessage;
use caseflow_core::reminders::{Reminder, ReminderStatus};

use crate::store::{KeyValueStore, StoreError};

const INDEX_KEY: &str = "cases.index";
const REMINDERS_KEY: &str = "reminders";

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("stored value under '{key}' is unreadable: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode value for '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("case {case_id} already has a different stored result")]
    ResultImmutable { case_id: String },
}

/// Summary counts derived by scanning the archive. Never stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ArchiveAnalytics {
    pub total_cases: usize,
    pub by_status: BTreeMap<RunStatus, usize>,
    pub cases_with_results: usize,
    pub total_events: usize,
    pub total_messages: usize,
    pub total_steps: usize,
    /// Sum of every stored result's cost items, ignoring currency.
    pub total_estimated_cost: f64,
    pub pending_reminders: usize,
}

fn record_key(case_id: &str) -> String {
    format!("case.{case_id}.record")
}

fn result_key(case_id: &str) -> String {
    format!("case.{case_id}.result")
}

fn events_key(case_id: &str) -> String {
    format!("case.{case_id}.events")
}

fn chat_key(case_id: &str) -> String {
    format!("case.{case_id}.chat")
}

pub struct CaseArchive {
    store: Arc<dyn KeyValueStore>,
    lock: RwLock<()>,
}

impl CaseArchive {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            lock: RwLock::new(()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, ()> {
        self.lock.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, ()> {
        self.lock.write().unwrap_or_else(|e| e.into_inner())
    }

    fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ArchiveError> {
        let Some(raw) = self.store.get(key)? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| ArchiveError::Corrupt {
                key: key.to_string(),
                source,
            })
    }

    fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), ArchiveError> {
        let raw = serde_json::to_string(value).map_err(|source| ArchiveError::Encode {
            key: key.to_string(),
            source,
        })?;
        self.store.set(key, &raw)?;
        Ok(())
    }

    fn load_index(&self) -> Result<Vec<String>, ArchiveError> {
        Ok(self.load(INDEX_KEY)?.unwrap_or_default())
    }

    // ── Records ──────────────────────────────────────────

    /// Insert or replace a case record. New cases go to the front of the index.
    pub fn upsert_record(&self, record: &CaseRecord) -> Result<(), ArchiveError> {
        let _guard = self.write();
        self.save(&record_key(&record.id), record)?;

        let mut index = self.load_index()?;
        if !index.iter().any(|id| id == &record.id) {
            index.insert(0, record.id.clone());
            self.save(INDEX_KEY, &index)?;
        }
        Ok(())
    }

    /// Returns `false` when the case has no record.
    pub fn update_status(&self, case_id: &str, status: RunStatus) -> Result<bool, ArchiveError> {
        let _guard = self.write();
        let key = record_key(case_id);
        let Some(mut record) = self.load::<CaseRecord>(&key)? else {
            return Ok(false);
        };
        if record.status != status {
            record.status = status;
            self.save(&key, &record)?;
        }
        Ok(true)
    }

    /// Every archived case, most recently created first.
    pub fn list(&self) -> Result<Vec<CaseRecord>, ArchiveError> {
        let _guard = self.read();
        let mut records = Vec::new();
        for id in self.load_index()? {
            if let Some(record) = self.load(&record_key(&id))? {
                records.push(record);
            }
        }
        Ok(records)
    }

    pub fn get_record(&self, case_id: &str) -> Result<Option<CaseRecord>, ArchiveError> {
        let _guard = self.read();
        self.load(&record_key(case_id))
    }

    // ── Results ──────────────────────────────────────────

    pub fn get_result(&self, case_id: &str) -> Result<Option<RunResult>, ArchiveError> {
        let _guard = self.read();
        self.load(&result_key(case_id))
    }

    /// Store the result once. Storing an identical result again is a no-op;
    /// a different one is rejected.
    pub fn save_result(&self, case_id: &str, result: &RunResult) -> Result<(), ArchiveError> {
        let _guard = self.write();
        let key = result_key(case_id);
        match self.load::<RunResult>(&key)? {
            Some(existing) if &existing == result => Ok(()),
            Some(_) => Err(ArchiveError::ResultImmutable {
                case_id: case_id.to_string(),
            }),
            None => self.save(&key, result),
        }
    }

    // ── Activity events ──────────────────────────────────

    pub fn get_events(&self, case_id: &str) -> Result<Vec<ActivityEvent>, ArchiveError> {
        let _guard = self.read();
        Ok(self.load(&events_key(case_id))?.unwrap_or_default())
    }

    pub fn append_event(&self, case_id: &str, event: &ActivityEvent) -> Result<(), ArchiveError> {
        let _guard = self.write();
        let key = events_key(case_id);
        let mut events: Vec<ActivityEvent> = self.load(&key)?.unwrap_or_default();
        events.push(event.clone());
        self.save(&key, &events)
    }

    /// Replace the whole event log for a case.
    pub fn save_events(&self, case_id: &str, events: &[ActivityEvent]) -> Result<(), ArchiveError> {
        let _guard = self.write();
        self.save(&events_key(case_id), events)
    }

    // ── Chat transcripts ─────────────────────────────────

    pub fn get_chat(&self, case_id: &str) -> Result<Vec<ChatMessage>, ArchiveError> {
        let _guard = self.read();
        Ok(self.load(&chat_key(case_id))?.unwrap_or_default())
    }

    pub fn save_chat(&self, case_id: &str, messages: &[ChatMessage]) -> Result<(), ArchiveError> {
        let _guard = self.write();
        let key = chat_key(case_id);
        if messages.is_empty() {
            self.store.remove(&key)?;
            return Ok(());
        }
        self.save(&key, messages)
    }

    // ── Reminders ────────────────────────────────────────

    pub fn load_reminders(&self) -> Result<Vec<Reminder>, ArchiveError> {
        let _guard = self.read();
        Ok(self.load(REMINDERS_KEY)?.unwrap_or_default())
    }

    pub fn save_reminders(&self, reminders: &[Reminder]) -> Result<(), ArchiveError> {
        let _guard = self.write();
        self.save(REMINDERS_KEY, reminders)
    }

    // ── Whole-case operations ────────────────────────────

    /// Remove the record, result, events and chat of a case plus its index
    /// entry. Returns `false` when nothing was archived under the id.
    ///
    /// Reminders are left alone; they belong to the reminder book.
    pub fn delete(&self, case_id: &str) -> Result<bool, ArchiveError> {
        let _guard = self.write();

        // Per-case keys go first and the index last, so a failed removal
        // leaves the case listed and a retry can finish the job.
        let had_record = self.store.get(&record_key(case_id))?.is_some();
        for key in [
            result_key(case_id),
            events_key(case_id),
            chat_key(case_id),
            record_key(case_id),
        ] {
            self.store.remove(&key)?;
        }

        let mut index = self.load_index()?;
        let before = index.len();
        index.retain(|id| id != case_id);
        let indexed = index.len() != before;
        if indexed {
            self.save(INDEX_KEY, &index)?;
        }

        tracing::debug!(case_id, indexed, had_record, "Case deleted from archive");
        Ok(indexed || had_record)
    }

    /// Recompute summary counts from the current contents.
    pub fn analytics(&self) -> Result<ArchiveAnalytics, ArchiveError> {
        let _guard = self.read();
        let mut analytics = ArchiveAnalytics::default();

        for id in self.load_index()? {
            let Some(record) = self.load::<CaseRecord>(&record_key(&id))? else {
                continue;
            };
            analytics.total_cases += 1;
            *analytics.by_status.entry(record.status).or_default() += 1;

            if let Some(result) = self.load::<RunResult>(&result_key(&id))? {
                analytics.cases_with_results += 1;
                analytics.total_steps += result.steps.len();
                analytics.total_estimated_cost += result.total_cost();
            }
            analytics.total_events += self
                .load::<Vec<ActivityEvent>>(&events_key(&id))?
                .map_or(0, |events| events.len());
            analytics.total_messages += self
                .load::<Vec<ChatMessage>>(&chat_key(&id))?
                .map_or(0, |messages| messages.len());
        }

        analytics.pending_reminders = self
            .load::<Vec<Reminder>>(REMINDERS_KEY)?
            .unwrap_or_default()
            .iter()
            .filter(|r| r.status == ReminderStatus::Pending)
            .count();

        Ok(analytics)
    }
}
