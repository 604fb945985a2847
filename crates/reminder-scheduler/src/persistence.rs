//! SQLite-backed record store, activity oracle and credential source.
//! Timestamps are stored as unix seconds.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reminder_core::error::{ReminderError, Result};
use reminder_core::traits::{ActivityOracle, CredentialSource, RecordStore};
use reminder_core::types::{AccountIdentity, Observation, RecordPatch, StaminaRecord};
use rusqlite::{Connection, OptionalExtension, Row, params};

const RECORD_COLUMNS: &str = "owner_user_id, bot_channel_id, bot_instance_id, account_uid,
    observed_at, observed_value, notification_enabled, notify_email, threshold,
    credential_valid, last_send_attempt_at, last_send_ok, last_send_success_at,
    consecutive_failures";

/// SQLite persistence for everything the scheduler reads and writes.
pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
}

fn db_err(context: &'static str) -> impl Fn(rusqlite::Error) -> ReminderError {
    move |e| ReminderError::Storage(format!("{context}: {e}"))
}

fn to_ts(t: DateTime<Utc>) -> i64 {
    t.timestamp()
}

fn from_ts(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.and_then(|s| DateTime::from_timestamp(s, 0))
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<StaminaRecord> {
    let identity = AccountIdentity::new(
        row.get::<_, String>(0)?,
        row.get::<_, String>(1)?,
        row.get::<_, String>(2)?,
        row.get::<_, String>(3)?,
    );
    let observed_at = from_ts(row.get(4)?);
    let observed_value: Option<u32> = row.get(5)?;
    let last_observation = match (observed_at, observed_value) {
        (Some(at), Some(value)) => Some(Observation::new(at, value)),
        _ => None,
    };

    Ok(StaminaRecord {
        identity,
        last_observation,
        notification_enabled: row.get::<_, i64>(6)? != 0,
        notify_email: row.get(7)?,
        threshold: row.get(8)?,
        credential_valid: row.get(9)?,
        last_send_attempt_at: from_ts(row.get(10)?),
        last_send_ok: row.get(11)?,
        last_send_success_at: from_ts(row.get(12)?),
        consecutive_failures: row.get(13)?,
    })
}

impl SqliteRecordStore {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(db_err("DB open"))?;
        Self::migrate(&conn)?;
        tracing::debug!("🗄️ Record store opened at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn migrate(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            -- One row per tracked account
            CREATE TABLE IF NOT EXISTS stamina_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_user_id TEXT NOT NULL,
                bot_channel_id TEXT NOT NULL,
                bot_instance_id TEXT NOT NULL DEFAULT '',
                account_uid TEXT NOT NULL,
                observed_at INTEGER,
                observed_value INTEGER,
                notification_enabled INTEGER NOT NULL DEFAULT 0,
                notify_email TEXT,
                threshold INTEGER,
                credential_valid INTEGER,
                last_send_attempt_at INTEGER,
                last_send_ok INTEGER,
                last_send_success_at INTEGER,
                consecutive_failures INTEGER NOT NULL DEFAULT 0,
                UNIQUE (owner_user_id, bot_channel_id, bot_instance_id, account_uid)
            );

            -- Last time a chat user talked to the bot
            CREATE TABLE IF NOT EXISTS user_activity (
                user_id TEXT NOT NULL,
                bot_id TEXT NOT NULL,
                bot_self_id TEXT NOT NULL DEFAULT '',
                last_active_at INTEGER NOT NULL,
                PRIMARY KEY (user_id, bot_id, bot_self_id)
            );

            -- Remote session tokens
            CREATE TABLE IF NOT EXISTS account_credentials (
                user_id TEXT NOT NULL,
                bot_id TEXT NOT NULL,
                bot_self_id TEXT NOT NULL DEFAULT '',
                uid TEXT NOT NULL,
                token TEXT NOT NULL,
                device_id TEXT NOT NULL DEFAULT '',
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (user_id, bot_id, bot_self_id, uid)
            );
            ",
        )
        .map_err(db_err("Migration"))?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ReminderError::Storage(format!("DB lock poisoned: {e}")))
    }

    fn select_one(conn: &Connection, id: &AccountIdentity) -> Result<Option<StaminaRecord>> {
        conn.query_row(
            &format!(
                "SELECT {RECORD_COLUMNS} FROM stamina_records
                 WHERE owner_user_id = ?1 AND bot_channel_id = ?2
                   AND bot_instance_id = ?3 AND account_uid = ?4"
            ),
            params![
                id.owner_user_id,
                id.bot_channel_id,
                id.bot_instance_id,
                id.account_uid
            ],
            row_to_record,
        )
        .optional()
        .map_err(db_err("Load record"))
    }

    fn write(conn: &Connection, r: &StaminaRecord) -> Result<()> {
        let id = &r.identity;
        conn.execute(
            &format!(
                "INSERT INTO stamina_records ({RECORD_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                 ON CONFLICT (owner_user_id, bot_channel_id, bot_instance_id, account_uid)
                 DO UPDATE SET
                    observed_at = excluded.observed_at,
                    observed_value = excluded.observed_value,
                    notification_enabled = excluded.notification_enabled,
                    notify_email = excluded.notify_email,
                    threshold = excluded.threshold,
                    credential_valid = excluded.credential_valid,
                    last_send_attempt_at = excluded.last_send_attempt_at,
                    last_send_ok = excluded.last_send_ok,
                    last_send_success_at = excluded.last_send_success_at,
                    consecutive_failures = excluded.consecutive_failures"
            ),
            params![
                id.owner_user_id,
                id.bot_channel_id,
                id.bot_instance_id,
                id.account_uid,
                r.last_observation.map(|o| to_ts(o.observed_at)),
                r.last_observation.map(|o| o.value),
                r.notification_enabled as i64,
                r.notify_email,
                r.threshold,
                r.credential_valid,
                r.last_send_attempt_at.map(to_ts),
                r.last_send_ok,
                r.last_send_success_at.map(to_ts),
                r.consecutive_failures,
            ],
        )
        .map_err(db_err("Save record"))?;
        Ok(())
    }

    // ─── Activity ─────────────────────────────────────────────

    /// Mark a chat user as active at `at`.
    pub fn record_activity(
        &self,
        user_id: &str,
        bot_id: &str,
        bot_self_id: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO user_activity (user_id, bot_id, bot_self_id, last_active_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (user_id, bot_id, bot_self_id)
             DO UPDATE SET last_active_at = MAX(last_active_at, excluded.last_active_at)",
            params![user_id, bot_id, bot_self_id, to_ts(at)],
        )
        .map_err(db_err("Record activity"))?;
        Ok(())
    }

    /// Last activity of a user. Falls back to legacy rows keyed by instance id
    /// with an empty instance column.
    pub fn last_active_at(
        &self,
        user_id: &str,
        bot_id: &str,
        bot_self_id: &str,
    ) -> Result<Option<DateTime<Utc>>> {
        let conn = self.lock()?;
        let exact: Option<i64> = conn
            .query_row(
                "SELECT last_active_at FROM user_activity
                 WHERE user_id = ?1 AND bot_id = ?2 AND bot_self_id = ?3",
                params![user_id, bot_id, bot_self_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err("Load activity"))?;
        if exact.is_some() {
            return Ok(from_ts(exact));
        }

        let legacy: Option<i64> = conn
            .query_row(
                "SELECT last_active_at FROM user_activity
                 WHERE user_id = ?1 AND bot_id = ?2 AND bot_self_id = ''",
                params![user_id, bot_self_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err("Load activity"))?;
        Ok(from_ts(legacy))
    }

    // ─── Credentials ──────────────────────────────────────────

    /// Store the remote token for an account, replacing any previous one.
    pub fn save_credential(
        &self,
        identity: &AccountIdentity,
        token: &str,
        device_id: &str,
    ) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO account_credentials
             (user_id, bot_id, bot_self_id, uid, token, device_id, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                identity.owner_user_id,
                identity.bot_channel_id,
                identity.bot_instance_id,
                identity.account_uid,
                token,
                device_id,
                to_ts(Utc::now()),
            ],
        )
        .map_err(db_err("Save credential"))?;
        Ok(())
    }

    pub fn remove_credential(&self, identity: &AccountIdentity) -> Result<bool> {
        let conn = self.lock()?;
        let n = conn
            .execute(
                "DELETE FROM account_credentials
                 WHERE user_id = ?1 AND bot_id = ?2 AND bot_self_id = ?3 AND uid = ?4",
                params![
                    identity.owner_user_id,
                    identity.bot_channel_id,
                    identity.bot_instance_id,
                    identity.account_uid
                ],
            )
            .map_err(db_err("Remove credential"))?;
        Ok(n > 0)
    }

    /// Drop every token a user bound on one bot channel.
    pub fn remove_credentials_by_user(&self, user_id: &str, bot_id: &str) -> Result<usize> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM account_credentials WHERE user_id = ?1 AND bot_id = ?2",
            params![user_id, bot_id],
        )
        .map_err(db_err("Remove credentials"))
    }

    /// Bind a fresh token. This is the re-authentication point: a record
    /// whose previous token was rejected becomes eligible for remote checks again.
    pub async fn bind_credential(
        &self,
        identity: &AccountIdentity,
        token: &str,
        device_id: &str,
    ) -> Result<()> {
        self.save_credential(identity, token, device_id)?;
        self.upsert(identity, RecordPatch::new().credential_valid(true))
            .await
    }

    /// Forget every account of a user on one bot channel, tokens included.
    /// Returns the number of records removed.
    pub async fn unbind_user(&self, user_id: &str, bot_id: &str) -> Result<usize> {
        let removed = self.delete_by_user(user_id, bot_id).await?;
        let tokens = self.remove_credentials_by_user(user_id, bot_id)?;
        tracing::info!("🗑️ Unbound {user_id} on {bot_id}: {removed} records, {tokens} tokens");
        Ok(removed)
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn get(&self, identity: &AccountIdentity) -> Result<Option<StaminaRecord>> {
        let conn = self.lock()?;
        Self::select_one(&conn, identity)
    }

    async fn get_all(&self) -> Result<Vec<StaminaRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {RECORD_COLUMNS} FROM stamina_records ORDER BY id"))
            .map_err(db_err("Load records"))?;
        let rows = stmt
            .query_map([], row_to_record)
            .map_err(db_err("Load records"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("Load records"))
    }

    async fn upsert(&self, identity: &AccountIdentity, patch: RecordPatch) -> Result<()> {
        let conn = self.lock()?;
        let mut record = Self::select_one(&conn, identity)?
            .unwrap_or_else(|| StaminaRecord::new(identity.clone()));
        patch.apply_to(&mut record);
        Self::write(&conn, &record)
    }

    async fn delete(&self, identity: &AccountIdentity) -> Result<bool> {
        let conn = self.lock()?;
        let n = conn
            .execute(
                "DELETE FROM stamina_records
                 WHERE owner_user_id = ?1 AND bot_channel_id = ?2
                   AND bot_instance_id = ?3 AND account_uid = ?4",
                params![
                    identity.owner_user_id,
                    identity.bot_channel_id,
                    identity.bot_instance_id,
                    identity.account_uid
                ],
            )
            .map_err(db_err("Delete record"))?;
        Ok(n > 0)
    }

    async fn delete_by_user(&self, owner_user_id: &str, bot_channel_id: &str) -> Result<usize> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM stamina_records WHERE owner_user_id = ?1 AND bot_channel_id = ?2",
            params![owner_user_id, bot_channel_id],
        )
        .map_err(db_err("Delete records"))
    }
}

#[async_trait]
impl ActivityOracle for SqliteRecordStore {
    async fn is_active(
        &self,
        owner_user_id: &str,
        bot_channel_id: &str,
        bot_instance_id: &str,
        window_days: u32,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let Some(last) = self.last_active_at(owner_user_id, bot_channel_id, bot_instance_id)? else {
            return Ok(false);
        };
        let cutoff = to_ts(now) - i64::from(window_days) * 86_400;
        Ok(to_ts(last) >= cutoff)
    }
}

#[async_trait]
impl CredentialSource for SqliteRecordStore {
    async fn credential(&self, identity: &AccountIdentity) -> Result<Option<String>> {
        let conn = self.lock()?;
        // Prefer the exact instance, then any instance of the same user and channel.
        let token: Option<String> = conn
            .query_row(
                "SELECT token FROM account_credentials
                 WHERE user_id = ?1 AND bot_id = ?2 AND uid = ?4 AND token != ''
                 ORDER BY (bot_self_id = ?3) DESC, updated_at DESC
                 LIMIT 1",
                params![
                    identity.owner_user_id,
                    identity.bot_channel_id,
                    identity.bot_instance_id,
                    identity.account_uid
                ],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err("Load credential"))?;
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn scratch(name: &str) -> (std::path::PathBuf, SqliteRecordStore) {
        let dir = std::env::temp_dir().join(name);
        std::fs::remove_dir_all(&dir).ok();
        let store = SqliteRecordStore::open(&dir.join("reminder.db")).unwrap();
        (dir, store)
    }

    fn ident() -> AccountIdentity {
        AccountIdentity::new("10001", "onebot", "bot-a", "100000001")
    }

    #[tokio::test]
    async fn test_open_and_migrate() {
        let (dir, store) = scratch("rover-reminder-db-test");
        assert!(store.get_all().await.unwrap().is_empty());
        assert!(store.get(&ident()).await.unwrap().is_none());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_upsert_creates_then_merges() {
        let (dir, store) = scratch("rover-reminder-db-test-merge");
        let id = ident();
        let t = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

        store
            .upsert(&id, RecordPatch::new().notify_email(Some("a@b.com".into())))
            .await
            .unwrap();
        store
            .upsert(
                &id,
                RecordPatch::new()
                    .observation(Observation::new(t, 180))
                    .notification_enabled(true),
            )
            .await
            .unwrap();

        let r = store.get(&id).await.unwrap().unwrap();
        assert_eq!(r.notify_email.as_deref(), Some("a@b.com"));
        assert!(r.notification_enabled);
        assert_eq!(r.last_observation, Some(Observation::new(t, 180)));
        assert_eq!(r.threshold, None);
        assert_eq!(r.credential_valid, None);
        assert_eq!(store.get_all().await.unwrap().len(), 1);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_success_time_survives_older_write() {
        let (dir, store) = scratch("rover-reminder-db-test-monotone");
        let id = ident();
        let newer = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let older = newer - Duration::hours(3);

        store
            .upsert(&id, RecordPatch::new().send_outcome(newer, true, 0))
            .await
            .unwrap();
        store
            .upsert(&id, RecordPatch::new().send_outcome(older, true, 0))
            .await
            .unwrap();

        let r = store.get(&id).await.unwrap().unwrap();
        assert_eq!(r.last_send_success_at, Some(newer));
        assert_eq!(r.last_send_attempt_at, Some(older));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_identity_includes_instance() {
        let (dir, store) = scratch("rover-reminder-db-test-instance");
        let a = ident();
        let b = AccountIdentity::new("10001", "onebot", "bot-b", "100000001");
        store.upsert(&a, RecordPatch::new().threshold(Some(200))).await.unwrap();
        store.upsert(&b, RecordPatch::new().threshold(Some(150))).await.unwrap();

        assert_eq!(store.get(&a).await.unwrap().unwrap().threshold, Some(200));
        assert_eq!(store.get(&b).await.unwrap().unwrap().threshold, Some(150));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_delete_and_delete_by_user() {
        let (dir, store) = scratch("rover-reminder-db-test-delete");
        let a = ident();
        let b = AccountIdentity::new("10001", "onebot", "bot-a", "100000002");
        let other = AccountIdentity::new("20002", "onebot", "bot-a", "100000003");
        for id in [&a, &b, &other] {
            store.upsert(id, RecordPatch::new().notification_enabled(true)).await.unwrap();
        }

        assert!(store.delete(&a).await.unwrap());
        assert!(!store.delete(&a).await.unwrap());
        assert_eq!(store.delete_by_user("10001", "onebot").await.unwrap(), 1);
        assert_eq!(store.get_all().await.unwrap().len(), 1);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_unbind_user_removes_records_and_tokens() {
        let (dir, store) = scratch("rover-reminder-db-test-unbind-user");
        let a = ident();
        let b = AccountIdentity::new("10001", "onebot", "bot-b", "100000002");
        let other = AccountIdentity::new("20002", "onebot", "bot-a", "100000003");
        for id in [&a, &b, &other] {
            store.bind_credential(id, "tok", "").await.unwrap();
        }

        assert_eq!(store.unbind_user("10001", "onebot").await.unwrap(), 2);
        assert_eq!(store.credential(&a).await.unwrap(), None);
        assert_eq!(store.credential(&b).await.unwrap(), None);
        assert_eq!(store.credential(&other).await.unwrap().as_deref(), Some("tok"));
        assert_eq!(store.get_all().await.unwrap().len(), 1);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_rebinding_clears_rejected_token() {
        let (dir, store) = scratch("rover-reminder-db-test-rebind");
        let id = ident();
        store
            .upsert(&id, RecordPatch::new().notification_enabled(true).credential_valid(false))
            .await
            .unwrap();

        store.bind_credential(&id, "tok-2", "dev").await.unwrap();
        let r = store.get(&id).await.unwrap().unwrap();
        assert_eq!(r.credential_valid, Some(true));
        assert!(r.notification_enabled);
        assert_eq!(store.credential(&id).await.unwrap().as_deref(), Some("tok-2"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_activity_window() {
        let (dir, store) = scratch("rover-reminder-db-test-activity");
        let now = Utc::now();
        store
            .record_activity("10001", "onebot", "bot-a", now - Duration::days(10))
            .unwrap();

        assert!(store.is_active("10001", "onebot", "bot-a", 42, now).await.unwrap());
        assert!(!store.is_active("10001", "onebot", "bot-a", 7, now).await.unwrap());
        assert!(!store.is_active("20002", "onebot", "bot-a", 42, now).await.unwrap());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_activity_legacy_fallback() {
        let (dir, store) = scratch("rover-reminder-db-test-legacy");
        let now = Utc::now();
        // Older deployments stored the instance id in bot_id with no instance column.
        store.record_activity("10001", "bot-a", "", now).unwrap();

        assert!(store.is_active("10001", "onebot", "bot-a", 42, now).await.unwrap());
        assert!(!store.is_active("10001", "onebot", "bot-z", 42, now).await.unwrap());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_activity_never_moves_backward() {
        let (dir, store) = scratch("rover-reminder-db-test-activity-max");
        let now = Utc::now();
        store.record_activity("10001", "onebot", "", now).unwrap();
        store
            .record_activity("10001", "onebot", "", now - Duration::days(100))
            .unwrap();
        assert!(store.is_active("10001", "onebot", "", 1, now).await.unwrap());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_credentials() {
        let (dir, store) = scratch("rover-reminder-db-test-cred");
        let id = ident();
        assert_eq!(store.credential(&id).await.unwrap(), None);

        store.save_credential(&id, "tok-1", "dev").unwrap();
        assert_eq!(store.credential(&id).await.unwrap().as_deref(), Some("tok-1"));

        // Another instance of the same user falls back to the bound token.
        let sibling = AccountIdentity::new("10001", "onebot", "bot-b", "100000001");
        assert_eq!(store.credential(&sibling).await.unwrap().as_deref(), Some("tok-1"));

        assert!(store.remove_credential(&id).unwrap());
        assert_eq!(store.credential(&id).await.unwrap(), None);
        std::fs::remove_dir_all(&dir).ok();
    }
}
