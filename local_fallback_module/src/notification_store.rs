use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

#[derive(Debug, thiserror::Error)]
pub enum NotificationStoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("datetime parse error: {0}")]
    DateTimeParse(#[from] chrono::ParseError),
}

/// The device's pending-notification registry. Scheduling the same id
/// twice replaces the earlier entry.
pub trait LocalNotificationStore {
    fn schedule_at(
        &self,
        id: &str,
        fire_at: DateTime<Utc>,
        title: &str,
        body: &str,
    ) -> Result<(), NotificationStoreError>;
    fn cancel(&self, id: &str) -> Result<(), NotificationStoreError>;
    fn cancel_all(&self) -> Result<(), NotificationStoreError>;
}

#[derive(Debug, Clone)]
pub struct PendingNotification {
    pub id: String,
    pub fire_at: DateTime<Utc>,
    pub title: String,
    pub body: String,
}

#[derive(Debug)]
pub struct SqliteNotificationStore {
    path: PathBuf,
}

impl SqliteNotificationStore {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, NotificationStoreError> {
        let store = Self { path: path.into() };
        let _ = store.open()?;
        Ok(store)
    }

    /// Every pending notification, soonest first.
    pub fn pending(&self) -> Result<Vec<PendingNotification>, NotificationStoreError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT id, fire_at, title, body FROM pending_notifications ORDER BY fire_at",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut notifications = Vec::new();
        for row in rows {
            let (id, fire_at, title, body) = row?;
            notifications.push(PendingNotification {
                id,
                fire_at: parse_datetime(&fire_at)?,
                title,
                body,
            });
        }
        Ok(notifications)
    }

    /// Notifications due at or before `now`. The device shell drains
    /// these and presents them.
    pub fn due_before(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<PendingNotification>, NotificationStoreError> {
        Ok(self
            .pending()?
            .into_iter()
            .filter(|notification| notification.fire_at <= now)
            .collect())
    }

    fn open(&self) -> Result<Connection, NotificationStoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&self.path)?;
        conn.execute_batch(NOTIFICATIONS_SCHEMA)?;
        Ok(conn)
    }
}

impl LocalNotificationStore for SqliteNotificationStore {
    fn schedule_at(
        &self,
        id: &str,
        fire_at: DateTime<Utc>,
        title: &str,
        body: &str,
    ) -> Result<(), NotificationStoreError> {
        let conn = self.open()?;
        conn.execute(
            "INSERT OR REPLACE INTO pending_notifications (id, fire_at, title, body, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id,
                format_datetime(fire_at),
                title,
                body,
                format_datetime(Utc::now())
            ],
        )?;
        Ok(())
    }

    fn cancel(&self, id: &str) -> Result<(), NotificationStoreError> {
        let conn = self.open()?;
        conn.execute("DELETE FROM pending_notifications WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn cancel_all(&self) -> Result<(), NotificationStoreError> {
        let conn = self.open()?;
        conn.execute("DELETE FROM pending_notifications", [])?;
        Ok(())
    }
}

const NOTIFICATIONS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS pending_notifications (
    id TEXT PRIMARY KEY,
    fire_at TEXT NOT NULL,
    title TEXT NOT NULL,
    body TEXT NOT NULL,
    created_at TEXT NOT NULL
);
"#;

fn format_datetime(value: DateTime<Utc>) -> String {
    value.to_rfc3339()
}

fn parse_datetime(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}
