//! `SQLite`-backed durable tier.
//!
//! Context documents are stored as JSON rows keyed by `(user_id,
//! session_id)`, with a secondary `device_index` table so the proactive
//! path can find the most recent context for a device without scanning
//! documents. Writes run inside a single transaction — callers never
//! observe partial state.

use std::time::Duration;

use async_trait::async_trait;
use maru_core::context::ConversationContext;
use maru_core::ids::{DeviceId, SessionKey};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::instrument;

use crate::errors::{Result, StoreError};
use crate::tiers::DurableTier;

const BUSY_MAX_RETRIES: u32 = 32;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS contexts (
    user_id             TEXT NOT NULL,
    session_id          TEXT NOT NULL,
    document            TEXT NOT NULL,
    last_interaction_at TEXT NOT NULL,
    PRIMARY KEY (user_id, session_id)
);
CREATE TABLE IF NOT EXISTS device_index (
    device_id           TEXT NOT NULL,
    user_id             TEXT NOT NULL,
    session_id          TEXT NOT NULL,
    last_interaction_at TEXT NOT NULL,
    PRIMARY KEY (device_id, user_id, session_id)
);
CREATE INDEX IF NOT EXISTS idx_device_recent
    ON device_index (device_id, last_interaction_at DESC);
";

/// Durable tier on a pooled `SQLite` database.
#[derive(Clone)]
pub struct SqliteDurable {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteDurable {
    /// Open (or create) a database file and run migrations.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            Ok(())
        });
        let pool = Pool::builder().max_size(8).build(manager)?;
        {
            let conn = pool.get()?;
            conn.execute_batch(SCHEMA)?;
        }
        Ok(Self { pool })
    }

    fn store_blocking(conn: &mut Connection, context: &ConversationContext) -> Result<()> {
        let document = serde_json::to_string(context)?;
        let stamp = context.last_interaction_at.to_rfc3339();
        let tx = conn.transaction()?;
        let _ = tx.execute(
            "INSERT INTO contexts (user_id, session_id, document, last_interaction_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (user_id, session_id)
             DO UPDATE SET document = ?3, last_interaction_at = ?4",
            params![
                context.user_id.as_str(),
                context.session_id.as_str(),
                document,
                stamp
            ],
        )?;
        let _ = tx.execute(
            "DELETE FROM device_index WHERE user_id = ?1 AND session_id = ?2",
            params![context.user_id.as_str(), context.session_id.as_str()],
        )?;
        for device in &context.device_state.active_devices {
            let _ = tx.execute(
                "INSERT INTO device_index (device_id, user_id, session_id, last_interaction_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    device.as_str(),
                    context.user_id.as_str(),
                    context.session_id.as_str(),
                    stamp
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn load_blocking(conn: &Connection, key: &SessionKey) -> Result<Option<ConversationContext>> {
        let document: Option<String> = conn
            .query_row(
                "SELECT document FROM contexts WHERE user_id = ?1 AND session_id = ?2",
                params![key.user_id.as_str(), key.session_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        document
            .map(|doc| serde_json::from_str(&doc).map_err(StoreError::from))
            .transpose()
    }

    fn find_by_device_blocking(
        conn: &Connection,
        device: &DeviceId,
    ) -> Result<Option<ConversationContext>> {
        let document: Option<String> = conn
            .query_row(
                "SELECT c.document FROM device_index d
                 JOIN contexts c ON c.user_id = d.user_id AND c.session_id = d.session_id
                 WHERE d.device_id = ?1
                 ORDER BY d.last_interaction_at DESC
                 LIMIT 1",
                params![device.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        document
            .map(|doc| serde_json::from_str(&doc).map_err(StoreError::from))
            .transpose()
    }

    /// Retry an operation on `SQLite` BUSY/LOCKED with linear backoff and
    /// jitter to avoid a thundering herd on a contended database.
    fn retry_on_busy<T>(mut f: impl FnMut() -> Result<T>) -> Result<T> {
        let mut attempts = 0;
        loop {
            match f() {
                Ok(value) => return Ok(value),
                Err(err) if Self::is_busy_or_locked(&err) && attempts < BUSY_MAX_RETRIES => {
                    attempts += 1;
                    let base_ms = u64::from(attempts).saturating_mul(10).min(500);
                    let jitter_range = base_ms / 4;
                    let jitter = if jitter_range > 0 {
                        rand::random::<u64>() % (jitter_range * 2 + 1)
                    } else {
                        0
                    };
                    let backoff_ms = base_ms.saturating_sub(jitter_range) + jitter;
                    std::thread::sleep(Duration::from_millis(backoff_ms));
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn is_busy_or_locked(err: &StoreError) -> bool {
        match err {
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(code, _)) => matches!(
                code.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }

    async fn run_blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Pool<SqliteConnectionManager>) -> Result<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || f(pool))
            .await
            .map_err(|e| StoreError::Internal(format!("blocking task panicked: {e}")))?
    }
}

#[async_trait]
impl DurableTier for SqliteDurable {
    #[instrument(skip(self), fields(key = %key))]
    async fn load(&self, key: &SessionKey) -> Result<Option<ConversationContext>> {
        let key = key.clone();
        self.run_blocking(move |pool| {
            let conn = pool.get()?;
            Self::retry_on_busy(|| Self::load_blocking(&conn, &key))
        })
        .await
    }

    #[instrument(skip_all, fields(key = %context.key()))]
    async fn store(&self, context: &ConversationContext) -> Result<()> {
        let context = context.clone();
        self.run_blocking(move |pool| {
            let mut conn = pool.get()?;
            Self::retry_on_busy(|| Self::store_blocking(&mut conn, &context))
        })
        .await
    }

    #[instrument(skip(self), fields(device = %device))]
    async fn find_by_device(&self, device: &DeviceId) -> Result<Option<ConversationContext>> {
        let device = device.clone();
        self.run_blocking(move |pool| {
            let conn = pool.get()?;
            Self::retry_on_busy(|| Self::find_by_device_blocking(&conn, &device))
        })
        .await
    }
}
