use chrono::{DateTime, FixedOffset, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Delivery channel a task can request reminders on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderChannel {
    Push,
    Email,
}

/// A user task as stored in the remote document store.
///
/// Field names follow the stored document layout (`isCompleted`,
/// `reminderTypes`, ...); the engine only ever reads these for the
/// duration of one evaluation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub details: String,
    pub deadline: DateTime<Utc>,
    pub is_completed: bool,
    /// Reminder intensity, 1 (gentle) through 10 (relentless).
    pub intensity: u8,
    pub reminder_types: Vec<ReminderChannel>,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Signed hours until the deadline; negative once overdue.
    pub fn hours_remaining(&self, now: DateTime<Utc>) -> f64 {
        (self.deadline - now).num_seconds() as f64 / 3600.0
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.is_completed && self.deadline < now
    }

    pub fn wants_channel(&self, channel: ReminderChannel) -> bool {
        self.reminder_types.contains(&channel)
    }
}

/// Per-user delivery settings.
///
/// A profile without an FCM token disables the push channel for that
/// user; a user without any profile document is skipped entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub user_id: String,
    pub email: String,
    #[serde(default)]
    pub fcm_token: Option<String>,
    /// Quiet window start hour (0-23). A window with start > end wraps
    /// past midnight.
    pub quiet_hours_start: u32,
    pub quiet_hours_end: u32,
    #[serde(default = "default_intensity")]
    pub default_intensity: u8,
    #[serde(default = "default_reminder_types")]
    pub default_reminder_types: Vec<ReminderChannel>,
    /// Recipient UTC offset in minutes; quiet hours are evaluated in the
    /// recipient's local time.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

fn default_intensity() -> u8 {
    5
}

fn default_reminder_types() -> Vec<ReminderChannel> {
    vec![ReminderChannel::Push]
}

impl Profile {
    pub fn default_profile(user_id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: email.into(),
            fcm_token: None,
            quiet_hours_start: 22,
            quiet_hours_end: 8,
            default_intensity: default_intensity(),
            default_reminder_types: default_reminder_types(),
            utc_offset_minutes: 0,
        }
    }

    /// Hour of day (0-23) at the recipient's location for the given
    /// instant. Falls back to UTC when the stored offset is out of range.
    pub fn local_hour(&self, now: DateTime<Utc>) -> u32 {
        match FixedOffset::east_opt(self.utc_offset_minutes * 60) {
            Some(offset) => now.with_timezone(&offset).hour(),
            None => {
                warn!(
                    "invalid utc offset {} minutes for user {}; using UTC",
                    self.utc_offset_minutes, self.user_id
                );
                now.hour()
            }
        }
    }
}

/// A rendered reminder, produced fresh for every firing. Never persisted
/// and never deduplicated across evaluation windows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderMessage {
    pub title: String,
    pub body: String,
}
