//! Reminder book and the polling scheduler that fires due reminders.
//!
//! A reminder fires when it is pending and its `reminder_time` has passed.
//! Firing persists `sent` before notifying, so a reminder is never announced
//! twice, across scans or across restarts. If that write fails nothing is
//! announced and the reminder is picked up again on the next scan.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use caseflow_core::reminders::{NewReminder, Reminder, ReminderStatus};

use crate::archive::{ArchiveError, CaseArchive};

pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum ReminderError {
    #[error("{field} is required and must not be empty")]
    Validation { field: &'static str },
    #[error("reminder {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: &'static str,
        to: &'static str,
    },
    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

/// Receives reminders the scheduler has just marked as sent.
pub trait Notifier: Send + Sync {
    fn notify(&self, reminder: &Reminder);
}

impl<N: Notifier + ?Sized> Notifier for Arc<N> {
    fn notify(&self, reminder: &Reminder) {
        (**self).notify(reminder);
    }
}

/// Emits each fired reminder as a structured log record.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, reminder: &Reminder) {
        tracing::info!(
            reminder_id = %reminder.id,
            case_id = %reminder.case_id,
            due_date = %reminder.due_date,
            "Reminder: {}",
            reminder.title
        );
    }
}

pub struct ReminderBook {
    archive: Arc<CaseArchive>,
    // Serializes read-modify-write of the reminder list.
    write_lock: Mutex<()>,
}

impl ReminderBook {
    pub fn new(archive: Arc<CaseArchive>) -> Self {
        Self {
            archive,
            write_lock: Mutex::new(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create a pending reminder. The reminder time defaults to one day
    /// before the due date.
    pub fn create(&self, new: NewReminder, now: DateTime<Utc>) -> Result<Reminder, ReminderError> {
        if new.case_id.trim().is_empty() {
            return Err(ReminderError::Validation { field: "case_id" });
        }
        if new.title.trim().is_empty() {
            return Err(ReminderError::Validation { field: "title" });
        }

        let reminder = new.into_reminder(now);
        let _guard = self.lock();
        let mut all = self.archive.load_reminders()?;
        all.push(reminder.clone());
        self.archive.save_reminders(&all)?;

        tracing::debug!(
            reminder_id = %reminder.id,
            case_id = %reminder.case_id,
            reminder_time = %reminder.reminder_time,
            "Reminder created"
        );
        Ok(reminder)
    }

    pub fn all(&self) -> Result<Vec<Reminder>, ReminderError> {
        Ok(self.archive.load_reminders()?)
    }

    /// Reminders of one case, earliest due first.
    pub fn for_case(&self, case_id: &str) -> Result<Vec<Reminder>, ReminderError> {
        let mut reminders: Vec<Reminder> = self
            .archive
            .load_reminders()?
            .into_iter()
            .filter(|r| r.case_id == case_id)
            .collect();
        reminders.sort_by_key(|r| r.due_date);
        Ok(reminders)
    }

    /// Pending reminders whose time has come, without changing them.
    pub fn due(&self, now: DateTime<Utc>) -> Result<Vec<Reminder>, ReminderError> {
        Ok(self
            .archive
            .load_reminders()?
            .into_iter()
            .filter(|r| r.is_due(now))
            .collect())
    }

    pub fn dismiss(&self, id: &str) -> Result<Option<Reminder>, ReminderError> {
        self.transition(id, ReminderStatus::Dismissed)
    }

    pub fn complete(&self, id: &str) -> Result<Option<Reminder>, ReminderError> {
        self.transition(id, ReminderStatus::Completed)
    }

    fn transition(
        &self,
        id: &str,
        next: ReminderStatus,
    ) -> Result<Option<Reminder>, ReminderError> {
        let _guard = self.lock();
        let mut all = self.archive.load_reminders()?;
        let Some(reminder) = all.iter_mut().find(|r| r.id == id) else {
            return Ok(None);
        };
        if reminder.status == next {
            return Ok(Some(reminder.clone()));
        }
        if !reminder.status.can_transition_to(next) {
            return Err(ReminderError::InvalidTransition {
                id: id.to_string(),
                from: reminder.status.as_str(),
                to: next.as_str(),
            });
        }
        reminder.status = next;
        let updated = reminder.clone();
        self.archive.save_reminders(&all)?;
        Ok(Some(updated))
    }

    /// Returns `false` when no reminder has the id.
    pub fn delete(&self, id: &str) -> Result<bool, ReminderError> {
        let _guard = self.lock();
        let mut all = self.archive.load_reminders()?;
        let before = all.len();
        all.retain(|r| r.id != id);
        if all.len() == before {
            return Ok(false);
        }
        self.archive.save_reminders(&all)?;
        Ok(true)
    }

    /// Mark every due reminder as sent, persist once, then notify.
    ///
    /// Returns the reminders that fired. On a persistence error nothing is
    /// notified and the reminders stay pending.
    pub fn fire_due<N: Notifier + ?Sized>(
        &self,
        now: DateTime<Utc>,
        notifier: &N,
    ) -> Result<Vec<Reminder>, ReminderError> {
        let fired = {
            let _guard = self.lock();
            let mut all = self.archive.load_reminders()?;
            let mut fired = Vec::new();
            for reminder in all.iter_mut().filter(|r| r.is_due(now)) {
                reminder.status = ReminderStatus::Sent;
                fired.push(reminder.clone());
            }
            if fired.is_empty() {
                return Ok(fired);
            }
            self.archive.save_reminders(&all)?;
            fired
        };

        for reminder in &fired {
            notifier.notify(reminder);
        }
        Ok(fired)
    }
}

/// Handle to a running scheduler task.
///
/// [`shutdown`](Self::shutdown) stops the loop and waits for it; dropping the
/// handle aborts the task instead.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

pub struct ReminderScheduler;

impl ReminderScheduler {
    /// Scan the book every `interval`. The first scan runs immediately, so
    /// reminders that fell due while the process was down fire at startup.
    pub fn spawn<N>(book: Arc<ReminderBook>, notifier: N, interval: Duration) -> SchedulerHandle
    where
        N: Notifier + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        match book.fire_due(Utc::now(), &notifier) {
                            Ok(fired) if !fired.is_empty() => {
                                tracing::info!(count = fired.len(), "Reminders fired");
                            }
                            Ok(_) => {}
                            Err(e) => {
                                tracing::warn!(
                                    error = %e,
                                    "Reminder scan failed; retrying next tick"
                                );
                            }
                        }
                    }
                }
            }
            tracing::debug!("Reminder scheduler stopped");
        });

        SchedulerHandle {
            shutdown: shutdown_tx,
            task: Some(task),
        }
    }
}
