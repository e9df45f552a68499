use std::env;

use postgres_native_tls::MakeTlsConnector;
use r2d2::{Pool, PooledConnection};
use r2d2_postgres::PostgresConnectionManager;
use tracing::error;
use uuid::Uuid;

/// Custom error handler that logs the actual connection error
#[derive(Debug)]
struct LoggingErrorHandler;

impl r2d2::HandleError<postgres::Error> for LoggingErrorHandler {
    fn handle_error(&self, err: postgres::Error) {
        error!("postgres connection pool error: {:?}", err);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MailQueueError {
    #[error("postgres error: {0}")]
    Postgres(#[from] postgres::Error),
    #[error("pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("missing MAIL_QUEUE_DB_URL/DATABASE_URL")]
    MissingDbUrl,
    #[error("invalid mail queue table name: {0}")]
    InvalidTableName(String),
    #[error("mail queue config error: {0}")]
    Config(String),
}

/// A transactional email waiting for the out-of-band sender to pick it
/// up. The engine only ever produces these; sending is someone else's
/// job.
#[derive(Debug, Clone)]
pub struct MailIntent {
    pub id: Uuid,
    pub recipient: String,
    pub subject: String,
    pub html_body: String,
}

impl MailIntent {
    pub fn new(
        recipient: impl Into<String>,
        subject: impl Into<String>,
        html_body: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            recipient: recipient.into(),
            subject: subject.into(),
            html_body: html_body.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnqueueResult {
    pub accepted: bool,
}

pub trait MailIntentQueue: Send + Sync {
    fn enqueue(&self, intent: &MailIntent) -> Result<EnqueueResult, MailQueueError>;
    fn claim_next(&self) -> Result<Option<MailIntent>, MailQueueError>;
    fn mark_done(&self, id: &Uuid) -> Result<(), MailQueueError>;
    fn mark_failed(&self, id: &Uuid, error: &str) -> Result<(), MailQueueError>;
}

/// Durable mail-intent queue on Postgres.
///
/// Rows are leased with `FOR UPDATE SKIP LOCKED`, so several sender
/// workers can drain the same table; a crashed worker's lease expires
/// after `lease_secs` and the row becomes claimable again.
#[derive(Clone)]
pub struct PostgresMailQueue {
    pool: Option<Pool<PostgresConnectionManager<MakeTlsConnector>>>,
    table: String,
    lease_secs: i64,
    max_attempts: i32,
}

impl PostgresMailQueue {
    pub fn from_env() -> Result<Self, MailQueueError> {
        dotenvy::dotenv().ok();
        let db_url = resolve_db_url()?;
        let table = resolve_table_name()?;
        let lease_secs = resolve_i64_env("MAIL_QUEUE_LEASE_SECS", 60);
        let max_attempts = resolve_i32_env("MAIL_QUEUE_MAX_ATTEMPTS", 5);
        Self::new(&db_url, &table, lease_secs, max_attempts)
    }

    pub fn new(
        db_url: &str,
        table: &str,
        lease_secs: i64,
        max_attempts: i32,
    ) -> Result<Self, MailQueueError> {
        let table = sanitize_table_name(table)?;

        let config: postgres::Config = db_url.parse().map_err(MailQueueError::Postgres)?;
        let mut tls_builder = native_tls::TlsConnector::builder();
        if resolve_bool_env("MAIL_QUEUE_TLS_ALLOW_INVALID_CERTS") {
            tls_builder.danger_accept_invalid_certs(true);
            tls_builder.danger_accept_invalid_hostnames(true);
        }
        let tls_connector = tls_builder
            .build()
            .map_err(|err| MailQueueError::Config(err.to_string()))?;
        let tls = MakeTlsConnector::new(tls_connector);

        let manager = PostgresConnectionManager::new(config, tls);
        let pool = Pool::builder()
            .max_size(4)
            .idle_timeout(Some(std::time::Duration::from_secs(300)))
            .error_handler(Box::new(LoggingErrorHandler))
            .build(manager)?;
        let queue = Self {
            pool: Some(pool),
            table,
            lease_secs,
            max_attempts,
        };
        queue.ensure_schema()?;
        Ok(queue)
    }

    fn connection(
        &self,
    ) -> Result<PooledConnection<PostgresConnectionManager<MakeTlsConnector>>, MailQueueError> {
        let pool = self.pool.as_ref().expect("mail queue pool unavailable");
        Ok(pool.get()?)
    }

    fn ensure_schema(&self) -> Result<(), MailQueueError> {
        let mut conn = self.connection()?;
        let statement = format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id UUID PRIMARY KEY,
                recipient TEXT NOT NULL,
                subject TEXT NOT NULL,
                html_body TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                locked_at TIMESTAMPTZ,
                locked_by TEXT,
                processed_at TIMESTAMPTZ,
                attempts INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                available_at TIMESTAMPTZ
            );
            CREATE INDEX IF NOT EXISTS {table}_pending_idx
                ON {table}(status, created_at);",
            table = self.table
        );
        conn.batch_execute(&statement)?;
        Ok(())
    }
}

impl MailIntentQueue for PostgresMailQueue {
    fn enqueue(&self, intent: &MailIntent) -> Result<EnqueueResult, MailQueueError> {
        let mut conn = self.connection()?;
        let rows = conn.execute(
            &format!(
                "INSERT INTO {table}
                    (id, recipient, subject, html_body, status, created_at, attempts)
                 VALUES ($1, $2, $3, $4, 'pending', now(), 0)
                 ON CONFLICT (id) DO NOTHING",
                table = self.table
            ),
            &[
                &intent.id,
                &intent.recipient,
                &intent.subject,
                &intent.html_body,
            ],
        )?;
        Ok(EnqueueResult { accepted: rows > 0 })
    }

    fn claim_next(&self) -> Result<Option<MailIntent>, MailQueueError> {
        let mut conn = self.connection()?;
        let instance_id = resolve_worker_instance_id();
        let lease_secs = self.lease_secs;

        let mut tx = conn.transaction()?;
        let row = tx.query_opt(
            &format!(
                "SELECT id, recipient, subject, html_body
                 FROM {table}
                 WHERE (
                     status = 'pending'
                     OR (status = 'processing' AND locked_at < now() - ($1::bigint * interval '1 second'))
                   )
                   AND (available_at IS NULL OR available_at <= now())
                   AND attempts < $2
                 ORDER BY created_at
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED",
                table = self.table
            ),
            &[&lease_secs, &self.max_attempts],
        )?;

        let Some(row) = row else {
            tx.commit()?;
            return Ok(None);
        };

        let id: Uuid = row.get(0);
        let intent = MailIntent {
            id,
            recipient: row.get(1),
            subject: row.get(2),
            html_body: row.get(3),
        };

        tx.execute(
            &format!(
                "UPDATE {table}
                 SET status = 'processing',
                     locked_at = now(),
                     locked_by = $2,
                     attempts = attempts + 1
                 WHERE id = $1",
                table = self.table
            ),
            &[&id, &instance_id],
        )?;
        tx.commit()?;

        Ok(Some(intent))
    }

    fn mark_done(&self, id: &Uuid) -> Result<(), MailQueueError> {
        let mut conn = self.connection()?;
        conn.execute(
            &format!(
                "UPDATE {table}
                 SET status = 'done',
                     processed_at = now(),
                     locked_at = NULL,
                     locked_by = NULL
                 WHERE id = $1",
                table = self.table
            ),
            &[id],
        )?;
        Ok(())
    }

    fn mark_failed(&self, id: &Uuid, error: &str) -> Result<(), MailQueueError> {
        let mut conn = self.connection()?;
        let attempts: i32 = conn
            .query_one(
                &format!("SELECT attempts FROM {table} WHERE id = $1", table = self.table),
                &[id],
            )?
            .get(0);

        if attempts >= self.max_attempts {
            conn.execute(
                &format!(
                    "UPDATE {table}
                     SET status = 'failed',
                         processed_at = now(),
                         locked_at = NULL,
                         locked_by = NULL,
                         available_at = NULL,
                         last_error = $2
                     WHERE id = $1",
                    table = self.table
                ),
                &[id, &error],
            )?;
        } else {
            let backoff_secs = i64::from(attempts.max(1)).saturating_mul(5);
            conn.execute(
                &format!(
                    "UPDATE {table}
                     SET status = 'pending',
                         processed_at = now(),
                         locked_at = NULL,
                         locked_by = NULL,
                         available_at = now() + ($2::bigint * interval '1 second'),
                         last_error = $3
                     WHERE id = $1",
                    table = self.table
                ),
                &[id, &backoff_secs, &error],
            )?;
        }
        Ok(())
    }
}

impl Drop for PostgresMailQueue {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            std::thread::spawn(move || drop(pool));
        }
    }
}

fn resolve_db_url() -> Result<String, MailQueueError> {
    env::var("MAIL_QUEUE_DB_URL")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .or_else(|| {
            env::var("DATABASE_URL")
                .ok()
                .filter(|value| !value.trim().is_empty())
        })
        .ok_or(MailQueueError::MissingDbUrl)
}

fn resolve_table_name() -> Result<String, MailQueueError> {
    let raw = env::var("MAIL_QUEUE_TABLE")
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "mail_intents".to_string());
    sanitize_table_name(&raw)
}

fn sanitize_table_name(raw: &str) -> Result<String, MailQueueError> {
    let parts: Vec<&str> = raw.split('.').collect();
    if parts.is_empty() || parts.len() > 2 {
        return Err(MailQueueError::InvalidTableName(raw.to_string()));
    }
    for part in &parts {
        if part.is_empty()
            || !part
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
        {
            return Err(MailQueueError::InvalidTableName(raw.to_string()));
        }
    }
    Ok(raw.to_string())
}

fn resolve_i64_env(key: &str, default_value: i64) -> i64 {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<i64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default_value)
}

fn resolve_i32_env(key: &str, default_value: i32) -> i32 {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<i32>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default_value)
}

fn resolve_bool_env(key: &str) -> bool {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_ascii_lowercase())
        .map(|value| matches!(value.as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

fn resolve_worker_instance_id() -> String {
    if let Ok(value) = env::var("WORKER_INSTANCE_ID") {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    env::var("HOSTNAME")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| format!("pid-{}", std::process::id()))
}
