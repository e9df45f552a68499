//! Device-resident fallback scheduling: when the server cannot reach the
//! device, a small set of pre-scheduled local notifications still nags.

pub mod fallback;
pub mod notification_store;

pub use fallback::{slot_identifier, LocalFallbackScheduler, MAX_SLOTS_PER_TASK};
pub use notification_store::{
    LocalNotificationStore, NotificationStoreError, PendingNotification, SqliteNotificationStore,
};
