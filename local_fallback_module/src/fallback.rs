use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use tracing::warn;

use reminder_core_module::{generate_reminder, Task};

use crate::notification_store::LocalNotificationStore;

/// Most local notifications ever scheduled for one task.
pub const MAX_SLOTS_PER_TASK: u8 = 3;

/// Fixed slot range scanned when canceling one task's notifications.
/// Wider than MAX_SLOTS_PER_TASK so ids from older app versions are
/// swept up too.
const SLOT_CANCEL_SCAN: usize = 10;

/// Stable identifier for one task's scheduled slot, so individual
/// notifications can be canceled later.
pub fn slot_identifier(task_id: &str, slot: usize) -> String {
    format!("{}-local-{}", task_id, slot)
}

/// Pre-schedules a bounded set of device-local notifications per task as
/// a fallback for periods when server-side delivery cannot reach the
/// device. Runs whenever the task list changes; uncoordinated with the
/// server engine, so both may notify for the same task in one window.
pub struct LocalFallbackScheduler<S: LocalNotificationStore> {
    store: S,
}

impl<S: LocalNotificationStore> LocalFallbackScheduler<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Rebuild the scheduled set from the current task list. The
    /// previous set is always cleared first, so a resync can never leave
    /// stale or duplicate notifications behind. Returns the number of
    /// notifications scheduled.
    pub fn resync(&self, tasks: &[Task], now: DateTime<Utc>) -> usize {
        if let Err(err) = self.store.cancel_all() {
            warn!("failed to clear scheduled notifications: {}", err);
            return 0;
        }

        let mut scheduled = 0;
        for task in tasks {
            if task.is_completed {
                continue;
            }
            let remaining_secs = (task.deadline - now).num_seconds();
            if remaining_secs <= 0 {
                continue;
            }
            scheduled += self.schedule_task(task, now, remaining_secs);
        }
        scheduled
    }

    fn schedule_task(&self, task: &Task, now: DateTime<Utc>, remaining_secs: i64) -> usize {
        let slots = usize::from((task.intensity / 3).clamp(1, MAX_SLOTS_PER_TASK));
        let hours_remaining = remaining_secs as f64 / 3600.0;
        let mut rng = rand::thread_rng();
        let mut scheduled = 0;

        for slot in 0..slots {
            let fraction: f64 = rng.gen_range(0.1..=0.9);
            let fire_at = now + Duration::seconds((remaining_secs as f64 * fraction) as i64);
            let message = generate_reminder(&task.title, hours_remaining);
            let id = slot_identifier(&task.id, slot);
            // Fire-and-forget: a slot that fails to schedule only costs
            // one fallback reminder.
            if let Err(err) = self.store.schedule_at(&id, fire_at, &message.title, &message.body) {
                warn!("failed to schedule fallback slot {}: {}", id, err);
                continue;
            }
            scheduled += 1;
        }
        scheduled
    }

    /// Cancel every slot belonging to one task, e.g. after completion or
    /// deletion. Scans the fixed slot range rather than tracking which
    /// slots were actually used.
    pub fn cancel_task(&self, task_id: &str) {
        for slot in 0..SLOT_CANCEL_SCAN {
            let id = slot_identifier(task_id, slot);
            if let Err(err) = self.store.cancel(&id) {
                warn!("failed to cancel fallback slot {}: {}", id, err);
            }
        }
    }
}
