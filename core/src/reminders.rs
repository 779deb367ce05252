use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

pub const DEFAULT_REMINDER_CATEGORY: &str = "general";

/// How far ahead of the due date a reminder fires when no time is given.
pub fn default_lead_time() -> Duration {
    Duration::days(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReminderPriority {
    High,
    #[default]
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReminderStatus {
    Pending,
    Sent,
    Dismissed,
    Completed,
}

impl ReminderStatus {
    /// `pending -> sent` is scheduler-driven; dismiss/complete are user-driven
    /// and allowed from pending or sent. Nothing returns to pending.
    pub fn can_transition_to(self, next: ReminderStatus) -> bool {
        use ReminderStatus::*;
        matches!(
            (self, next),
            (Pending, Sent)
                | (Pending, Dismissed)
                | (Pending, Completed)
                | (Sent, Dismissed)
                | (Sent, Completed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReminderStatus::Pending => "pending",
            ReminderStatus::Sent => "sent",
            ReminderStatus::Dismissed => "dismissed",
            ReminderStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Reminder {
    pub id: String,
    pub case_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub due_date: DateTime<Utc>,
    pub reminder_time: DateTime<Utc>,
    pub priority: ReminderPriority,
    pub category: String,
    pub status: ReminderStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_id: Option<String>,
}

impl Reminder {
    /// Selection predicate for the scheduler: still pending and its time has come.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == ReminderStatus::Pending && self.reminder_time <= now
    }
}

/// Caller input for a new reminder; unset fields take defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct NewReminder {
    pub case_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub due_date: DateTime<Utc>,
    #[serde(default)]
    pub reminder_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub priority: Option<ReminderPriority>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub step_id: Option<String>,
    #[serde(default)]
    pub license_id: Option<String>,
}

impl NewReminder {
    pub fn into_reminder(self, now: DateTime<Utc>) -> Reminder {
        let reminder_time = self
            .reminder_time
            .unwrap_or(self.due_date - default_lead_time());
        let category = self
            .category
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_REMINDER_CATEGORY.to_string());

        Reminder {
            id: Uuid::now_v7().to_string(),
            case_id: self.case_id,
            title: self.title,
            description: self.description,
            due_date: self.due_date,
            reminder_time,
            priority: self.priority.unwrap_or_default(),
            category,
            status: ReminderStatus::Pending,
            created_at: now,
            step_id: self.step_id,
            license_id: self.license_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(due_in_days: i64) -> NewReminder {
        NewReminder {
            case_id: "case-1".to_string(),
            title: "Renew permit".to_string(),
            due_date: Utc::now() + Duration::days(due_in_days),
            ..Default::default()
        }
    }

    #[test]
    fn reminder_time_defaults_to_one_day_before_due() {
        let new = input(2);
        let due = new.due_date;
        let reminder = new.into_reminder(Utc::now());
        assert_eq!(reminder.reminder_time, due - Duration::days(1));
        assert_eq!(reminder.priority, ReminderPriority::Medium);
        assert_eq!(reminder.category, DEFAULT_REMINDER_CATEGORY);
        assert_eq!(reminder.status, ReminderStatus::Pending);
    }

    #[test]
    fn explicit_fields_are_kept() {
        let at = Utc::now() + Duration::hours(3);
        let mut new = input(5);
        new.reminder_time = Some(at);
        new.priority = Some(ReminderPriority::High);
        new.category = Some("  deadline ".to_string());
        let reminder = new.into_reminder(Utc::now());
        assert_eq!(reminder.reminder_time, at);
        assert_eq!(reminder.priority, ReminderPriority::High);
        assert_eq!(reminder.category, "deadline");
    }

    #[test]
    fn transitions_never_return_to_pending_or_refire() {
        use ReminderStatus::*;
        assert!(Pending.can_transition_to(Sent));
        assert!(Sent.can_transition_to(Completed));
        assert!(!Sent.can_transition_to(Sent));
        assert!(!Sent.can_transition_to(Pending));
        assert!(!Dismissed.can_transition_to(Sent));
        assert!(!Completed.can_transition_to(Dismissed));
    }

    #[test]
    fn only_pending_reminders_are_due() {
        let now = Utc::now();
        let mut reminder = input(0).into_reminder(now);
        assert!(reminder.is_due(now));
        reminder.status = ReminderStatus::Sent;
        assert!(!reminder.is_due(now));
    }
}
