//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. A single connection is
//! shared behind an async mutex so that a transaction never interleaves with
//! statements issued by the timer tasks.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::onboarding::Draft;
use crate::profile::{
    Achievement, AchievementKind, ChoiceOption, Gender, Goal, Level, Profile, Subscription,
    SubscriptionSource, TrainingLocation, TrainingRecord, TrainingSchedule, TrainingStatus,
    UserRecord, UserSummary, WeightEntry,
};
use crate::store::migrations;
use crate::store::traits::Database;

/// libSQL database backend.
pub struct LibSqlBackend {
    _db: LibSqlDatabase,
    conn: Mutex<Connection>,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    DatabaseError::Pool(format!("Failed to create database directory: {e}"))
                })?;
            }
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            _db: db,
            conn: Mutex::new(conn),
        })
    }

    async fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Canonical write format. Fixed width, so string comparison in SQL orders
/// timestamps correctly.
fn fmt_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_optional_datetime(s: &Option<String>) -> Option<DateTime<Utc>> {
    s.as_ref().map(|s| parse_datetime(s))
}

const USER_COLUMNS: &str = "user_id, name, age, gender, height_cm, weight_kg, goal, \
     training_location, level, reminder_time, trial_granted, next_training_at, created_at";

/// Rebuild the profile from its nullable columns. `None` until every field
/// has been committed.
fn row_to_profile(row: &libsql::Row) -> Option<Profile> {
    let name: String = row.get(1).ok()?;
    let age: i64 = row.get(2).ok()?;
    let gender: String = row.get(3).ok()?;
    let height: i64 = row.get(4).ok()?;
    let weight: f64 = row.get(5).ok()?;
    let goal: String = row.get(6).ok()?;
    let location: String = row.get(7).ok()?;
    let level: String = row.get(8).ok()?;

    Some(Profile {
        name,
        age: u8::try_from(age).ok()?,
        gender: Gender::parse(&gender)?,
        height_cm: u16::try_from(height).ok()?,
        weight_kg: weight,
        goal: Goal::parse(&goal)?,
        training_location: TrainingLocation::parse(&location)?,
        level: Level::parse(&level)?,
    })
}

fn row_to_user(row: &libsql::Row) -> Result<UserRecord, libsql::Error> {
    let next_str: Option<String> = row.get(11).ok();
    let created_str: String = row.get(12)?;
    let trial: i64 = row.get(10)?;

    Ok(UserRecord {
        user_id: row.get(0)?,
        profile: row_to_profile(row),
        reminder_time: row.get(9)?,
        trial_granted: trial != 0,
        next_training_at: parse_optional_datetime(&next_str),
        created_at: parse_datetime(&created_str),
    })
}

fn row_to_training(row: &libsql::Row) -> Result<TrainingRecord, libsql::Error> {
    let id_str: String = row.get(0)?;
    let status_str: String = row.get(3)?;
    let created_str: String = row.get(4)?;

    Ok(TrainingRecord {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        user_id: row.get(1)?,
        content: row.get(2)?,
        status: TrainingStatus::parse(&status_str),
        created_at: parse_datetime(&created_str),
    })
}

fn usize_from(n: i64) -> usize {
    usize::try_from(n).unwrap_or(0)
}

async fn scalar_count(
    conn: &Connection,
    sql: &str,
    params: impl libsql::params::IntoParams,
    op: &str,
) -> Result<usize, DatabaseError> {
    let mut rows = conn
        .query(sql, params)
        .await
        .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;
    match rows.next().await {
        Ok(Some(row)) => {
            let n: i64 = row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("{op} row parse: {e}")))?;
            Ok(usize_from(n))
        }
        Ok(None) => Ok(0),
        Err(e) => Err(DatabaseError::Query(format!("{op}: {e}"))),
    }
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        let conn = self.conn().await;
        migrations::init_schema(&conn).await
    }

    // ── Users ───────────────────────────────────────────────────────

    async fn ensure_user(&self, user_id: &str) -> Result<bool, DatabaseError> {
        let conn = self.conn().await;
        let created = conn
            .execute(
                "INSERT OR IGNORE INTO users (user_id, created_at) VALUES (?1, ?2)",
                params![user_id, fmt_ts(Utc::now())],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("ensure_user: {e}")))?;

        if created > 0 {
            debug!(user_id = %user_id, "User record created");
        }
        Ok(created > 0)
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<UserRecord>, DatabaseError> {
        let conn = self.conn().await;
        let mut rows = conn
            .query(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = ?1"),
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_user: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let user = row_to_user(&row)
                    .map_err(|e| DatabaseError::Query(format!("get_user row parse: {e}")))?;
                Ok(Some(user))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_user: {e}"))),
        }
    }

    async fn commit_profile(&self, user_id: &str, profile: &Profile) -> Result<(), DatabaseError> {
        let conn = self.conn().await;
        let now = fmt_ts(Utc::now());
        let tx = conn
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("commit_profile begin: {e}")))?;

        let result: Result<(), libsql::Error> = async {
            tx.execute(
                "INSERT INTO users (user_id, name, age, gender, height_cm, weight_kg, goal, training_location, level, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(user_id) DO UPDATE SET
                    name = excluded.name,
                    age = excluded.age,
                    gender = excluded.gender,
                    height_cm = excluded.height_cm,
                    weight_kg = excluded.weight_kg,
                    goal = excluded.goal,
                    training_location = excluded.training_location,
                    level = excluded.level",
                params![
                    user_id,
                    profile.name.as_str(),
                    i64::from(profile.age),
                    profile.gender.as_str(),
                    i64::from(profile.height_cm),
                    profile.weight_kg,
                    profile.goal.as_str(),
                    profile.training_location.as_str(),
                    profile.level.as_str(),
                    now.clone(),
                ],
            )
            .await?;
            tx.execute("DELETE FROM drafts WHERE user_id = ?1", params![user_id])
                .await?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                tx.commit()
                    .await
                    .map_err(|e| DatabaseError::Query(format!("commit_profile commit: {e}")))?;
                info!(user_id = %user_id, "Profile committed");
                Ok(())
            }
            Err(e) => {
                let _ = tx.rollback().await;
                Err(DatabaseError::Query(format!("commit_profile: {e}")))
            }
        }
    }

    async fn set_reminder_time(&self, user_id: &str, hhmm: &str) -> Result<(), DatabaseError> {
        let conn = self.conn().await;
        conn.execute(
            "UPDATE users SET reminder_time = ?1 WHERE user_id = ?2",
            params![hhmm, user_id],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("set_reminder_time: {e}")))?;
        Ok(())
    }

    async fn set_next_training_at(
        &self,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn().await;
        conn.execute(
            "UPDATE users SET next_training_at = ?1 WHERE user_id = ?2",
            params![fmt_ts(at), user_id],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("set_next_training_at: {e}")))?;
        Ok(())
    }

    async fn count_users(&self) -> Result<usize, DatabaseError> {
        let conn = self.conn().await;
        scalar_count(&conn, "SELECT COUNT(*) FROM users", (), "count_users").await
    }

    async fn list_users(&self) -> Result<Vec<UserSummary>, DatabaseError> {
        let conn = self.conn().await;
        let mut rows = conn
            .query(
                "SELECT u.user_id, u.name, u.created_at, u.trial_granted, s.expires_at, s.source
                 FROM users u LEFT JOIN subscriptions s ON s.user_id = u.user_id
                 ORDER BY u.created_at DESC",
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_users: {e}")))?;

        let mut users = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let user_id: String = match row.get(0) {
                Ok(id) => id,
                Err(e) => {
                    tracing::warn!("Skipping user row: {e}");
                    continue;
                }
            };
            let created_str: String = row.get(2).unwrap_or_default();
            let trial: i64 = row.get(3).unwrap_or(0);
            let expires: Option<String> = row.get(4).ok();
            let source: Option<String> = row.get(5).ok();

            let subscription = expires.map(|exp| Subscription {
                user_id: user_id.clone(),
                expires_at: parse_datetime(&exp),
                source: SubscriptionSource::parse(source.as_deref().unwrap_or("paid")),
            });

            users.push(UserSummary {
                user_id,
                name: row.get(1).ok(),
                created_at: parse_datetime(&created_str),
                trial_granted: trial != 0,
                subscription,
            });
        }
        Ok(users)
    }

    async fn list_user_ids(&self) -> Result<Vec<String>, DatabaseError> {
        let conn = self.conn().await;
        let mut rows = conn
            .query("SELECT user_id FROM users ORDER BY created_at ASC", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("list_user_ids: {e}")))?;

        let mut ids = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            if let Ok(id) = row.get::<String>(0) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    async fn list_users_due_for_reminder(
        &self,
        hhmm: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>, DatabaseError> {
        let conn = self.conn().await;
        let now = fmt_ts(now);
        let mut rows = conn
            .query(
                "SELECT u.user_id FROM users u
                 JOIN subscriptions s ON s.user_id = u.user_id
                 WHERE u.name IS NOT NULL
                   AND u.reminder_time = ?1
                   AND s.expires_at > ?2
                   AND (u.next_training_at IS NULL OR u.next_training_at <= ?2)",
                params![hhmm, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_users_due_for_reminder: {e}")))?;

        let mut ids = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            if let Ok(id) = row.get::<String>(0) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    async fn delete_user(&self, user_id: &str) -> Result<bool, DatabaseError> {
        let conn = self.conn().await;
        let tx = conn
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_user begin: {e}")))?;

        let result: Result<u64, libsql::Error> = async {
            for table in [
                "weights",
                "trainings",
                "achievements",
                "training_schedule",
                "subscriptions",
                "drafts",
            ] {
                tx.execute(
                    &format!("DELETE FROM {table} WHERE user_id = ?1"),
                    params![user_id],
                )
                .await?;
            }
            tx.execute("DELETE FROM users WHERE user_id = ?1", params![user_id])
                .await
        }
        .await;

        match result {
            Ok(deleted) => {
                tx.commit()
                    .await
                    .map_err(|e| DatabaseError::Query(format!("delete_user commit: {e}")))?;
                if deleted > 0 {
                    info!(user_id = %user_id, "User deleted with all records");
                }
                Ok(deleted > 0)
            }
            Err(e) => {
                let _ = tx.rollback().await;
                Err(DatabaseError::Query(format!("delete_user: {e}")))
            }
        }
    }

    // ── Onboarding drafts ───────────────────────────────────────────

    async fn get_draft(&self, user_id: &str) -> Result<Option<Draft>, DatabaseError> {
        let conn = self.conn().await;
        let mut rows = conn
            .query(
                "SELECT draft FROM drafts WHERE user_id = ?1",
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_draft: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let json: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("get_draft row parse: {e}")))?;
                let draft = serde_json::from_str(&json)
                    .map_err(|e| DatabaseError::Serialization(format!("get_draft: {e}")))?;
                Ok(Some(draft))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_draft: {e}"))),
        }
    }

    async fn save_draft(&self, user_id: &str, draft: &Draft) -> Result<(), DatabaseError> {
        let json = serde_json::to_string(draft)
            .map_err(|e| DatabaseError::Serialization(format!("save_draft: {e}")))?;
        let conn = self.conn().await;
        conn.execute(
            "INSERT INTO drafts (user_id, draft, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET draft = excluded.draft, updated_at = excluded.updated_at",
            params![user_id, json, fmt_ts(Utc::now())],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("save_draft: {e}")))?;

        debug!(user_id = %user_id, step = %draft.step, "Draft saved");
        Ok(())
    }

    async fn delete_draft(&self, user_id: &str) -> Result<bool, DatabaseError> {
        let conn = self.conn().await;
        let deleted = conn
            .execute("DELETE FROM drafts WHERE user_id = ?1", params![user_id])
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_draft: {e}")))?;
        Ok(deleted > 0)
    }

    // ── Subscriptions ───────────────────────────────────────────────

    async fn get_subscription(
        &self,
        user_id: &str,
    ) -> Result<Option<Subscription>, DatabaseError> {
        let conn = self.conn().await;
        let mut rows = conn
            .query(
                "SELECT expires_at, source FROM subscriptions WHERE user_id = ?1",
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_subscription: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let expires: String = row.get(0).map_err(|e| {
                    DatabaseError::Query(format!("get_subscription row parse: {e}"))
                })?;
                let source: String = row.get(1).unwrap_or_default();
                Ok(Some(Subscription {
                    user_id: user_id.to_string(),
                    expires_at: parse_datetime(&expires),
                    source: SubscriptionSource::parse(&source),
                }))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_subscription: {e}"))),
        }
    }

    async fn upsert_subscription(
        &self,
        user_id: &str,
        expires_at: DateTime<Utc>,
        source: SubscriptionSource,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn().await;
        conn.execute(
            "INSERT INTO subscriptions (user_id, expires_at, source) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET expires_at = excluded.expires_at, source = excluded.source",
            params![user_id, fmt_ts(expires_at), source.as_str()],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("upsert_subscription: {e}")))?;

        debug!(
            user_id = %user_id,
            expires_at = %expires_at,
            source = source.as_str(),
            "Subscription written"
        );
        Ok(())
    }

    async fn grant_trial(
        &self,
        user_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let conn = self.conn().await;
        let tx = conn
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("grant_trial begin: {e}")))?;

        let result: Result<bool, libsql::Error> = async {
            tx.execute(
                "INSERT OR IGNORE INTO users (user_id, created_at) VALUES (?1, ?2)",
                params![user_id, fmt_ts(Utc::now())],
            )
            .await?;
            let flagged = tx
                .execute(
                    "UPDATE users SET trial_granted = 1 WHERE user_id = ?1 AND trial_granted = 0",
                    params![user_id],
                )
                .await?;
            if flagged == 0 {
                return Ok(false);
            }
            tx.execute(
                "INSERT INTO subscriptions (user_id, expires_at, source) VALUES (?1, ?2, 'trial')
                 ON CONFLICT(user_id) DO UPDATE SET expires_at = excluded.expires_at, source = excluded.source",
                params![user_id, fmt_ts(expires_at)],
            )
            .await?;
            Ok(true)
        }
        .await;

        match result {
            Ok(true) => {
                tx.commit()
                    .await
                    .map_err(|e| DatabaseError::Query(format!("grant_trial commit: {e}")))?;
                info!(user_id = %user_id, expires_at = %expires_at, "Trial granted");
                Ok(true)
            }
            Ok(false) => {
                let _ = tx.rollback().await;
                Ok(false)
            }
            Err(e) => {
                let _ = tx.rollback().await;
                Err(DatabaseError::Query(format!("grant_trial: {e}")))
            }
        }
    }

    async fn delete_subscription(&self, user_id: &str) -> Result<bool, DatabaseError> {
        let conn = self.conn().await;
        let deleted = conn
            .execute(
                "DELETE FROM subscriptions WHERE user_id = ?1",
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_subscription: {e}")))?;
        Ok(deleted > 0)
    }

    async fn count_active_subscriptions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<usize, DatabaseError> {
        let conn = self.conn().await;
        scalar_count(
            &conn,
            "SELECT COUNT(*) FROM subscriptions WHERE expires_at > ?1",
            params![fmt_ts(now)],
            "count_active_subscriptions",
        )
        .await
    }

    // ── Weights ─────────────────────────────────────────────────────

    async fn add_weight(
        &self,
        user_id: &str,
        weight_kg: f64,
        recorded_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn().await;
        conn.execute(
            "INSERT INTO weights (user_id, weight_kg, recorded_at) VALUES (?1, ?2, ?3)",
            params![user_id, weight_kg, fmt_ts(recorded_at)],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("add_weight: {e}")))?;
        Ok(())
    }

    async fn list_weights(&self, user_id: &str) -> Result<Vec<WeightEntry>, DatabaseError> {
        let conn = self.conn().await;
        let mut rows = conn
            .query(
                "SELECT weight_kg, recorded_at FROM weights WHERE user_id = ?1
                 ORDER BY recorded_at ASC, id ASC",
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_weights: {e}")))?;

        let mut entries = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let (Ok(weight_kg), Ok(at)) = (row.get::<f64>(0), row.get::<String>(1)) else {
                tracing::warn!(user_id = %user_id, "Skipping malformed weight row");
                continue;
            };
            entries.push(WeightEntry {
                user_id: user_id.to_string(),
                weight_kg,
                recorded_at: parse_datetime(&at),
            });
        }
        Ok(entries)
    }

    // ── Trainings ───────────────────────────────────────────────────

    async fn insert_training(&self, record: &TrainingRecord) -> Result<(), DatabaseError> {
        let conn = self.conn().await;
        conn.execute(
            "INSERT INTO trainings (id, user_id, content, status, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.id.to_string(),
                record.user_id.as_str(),
                record.content.as_str(),
                record.status.as_str(),
                fmt_ts(record.created_at),
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("insert_training: {e}")))?;

        debug!(training_id = %record.id, user_id = %record.user_id, "Training record inserted");
        Ok(())
    }

    async fn recent_training_statuses(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<TrainingStatus>, DatabaseError> {
        let conn = self.conn().await;
        let mut rows = conn
            .query(
                "SELECT status FROM trainings WHERE user_id = ?1 ORDER BY created_at DESC LIMIT ?2",
                params![user_id, limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("recent_training_statuses: {e}")))?;

        let mut statuses = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            if let Ok(s) = row.get::<String>(0) {
                statuses.push(TrainingStatus::parse(&s));
            }
        }
        Ok(statuses)
    }

    async fn complete_latest_pending(&self, user_id: &str) -> Result<Option<Uuid>, DatabaseError> {
        let conn = self.conn().await;
        let mut rows = conn
            .query(
                "UPDATE trainings SET status = 'completed'
                 WHERE status = 'pending' AND id = (
                    SELECT id FROM trainings
                    WHERE user_id = ?1 AND status = 'pending'
                    ORDER BY created_at DESC LIMIT 1
                 )
                 RETURNING id",
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("complete_latest_pending: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let id: String = row.get(0).map_err(|e| {
                    DatabaseError::Query(format!("complete_latest_pending row parse: {e}"))
                })?;
                let id = Uuid::parse_str(&id).map_err(|e| {
                    DatabaseError::Serialization(format!("complete_latest_pending: {e}"))
                })?;
                debug!(training_id = %id, user_id = %user_id, "Training completed");
                Ok(Some(id))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("complete_latest_pending: {e}"))),
        }
    }

    async fn count_trainings(
        &self,
        user_id: &str,
        status: TrainingStatus,
        since: Option<DateTime<Utc>>,
    ) -> Result<usize, DatabaseError> {
        let conn = self.conn().await;
        match since {
            Some(since) => {
                scalar_count(
                    &conn,
                    "SELECT COUNT(*) FROM trainings WHERE user_id = ?1 AND status = ?2 AND created_at >= ?3",
                    params![user_id, status.as_str(), fmt_ts(since)],
                    "count_trainings",
                )
                .await
            }
            None => {
                scalar_count(
                    &conn,
                    "SELECT COUNT(*) FROM trainings WHERE user_id = ?1 AND status = ?2",
                    params![user_id, status.as_str()],
                    "count_trainings",
                )
                .await
            }
        }
    }

    async fn mark_stale_missed(&self, cutoff: DateTime<Utc>) -> Result<usize, DatabaseError> {
        let conn = self.conn().await;
        let updated = conn
            .execute(
                "UPDATE trainings SET status = 'missed' WHERE status = 'pending' AND created_at < ?1",
                params![fmt_ts(cutoff)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("mark_stale_missed: {e}")))?;
        Ok(updated as usize)
    }

    async fn list_trainings(&self, user_id: &str) -> Result<Vec<TrainingRecord>, DatabaseError> {
        let conn = self.conn().await;
        let mut rows = conn
            .query(
                "SELECT id, user_id, content, status, created_at FROM trainings
                 WHERE user_id = ?1 ORDER BY created_at DESC",
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_trainings: {e}")))?;

        let mut records = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_training(&row) {
                Ok(r) => records.push(r),
                Err(e) => tracing::warn!("Skipping training row: {e}"),
            }
        }
        Ok(records)
    }

    // ── Achievements ────────────────────────────────────────────────

    async fn grant_achievement(
        &self,
        user_id: &str,
        kind: AchievementKind,
        at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let conn = self.conn().await;
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO achievements (user_id, kind, achieved_at) VALUES (?1, ?2, ?3)",
                params![user_id, kind.as_str(), fmt_ts(at)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("grant_achievement: {e}")))?;
        Ok(inserted > 0)
    }

    async fn list_achievements(&self, user_id: &str) -> Result<Vec<Achievement>, DatabaseError> {
        let conn = self.conn().await;
        let mut rows = conn
            .query(
                "SELECT kind, achieved_at FROM achievements WHERE user_id = ?1 ORDER BY achieved_at ASC",
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_achievements: {e}")))?;

        let mut achievements = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let kind = row
                .get::<String>(0)
                .ok()
                .and_then(|k| AchievementKind::parse(&k));
            let (Some(kind), Ok(at)) = (kind, row.get::<String>(1)) else {
                continue;
            };
            achievements.push(Achievement {
                user_id: user_id.to_string(),
                kind,
                achieved_at: parse_datetime(&at),
            });
        }
        Ok(achievements)
    }

    // ── Schedule ────────────────────────────────────────────────────

    async fn set_schedule(
        &self,
        user_id: &str,
        schedule: &TrainingSchedule,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn().await;
        conn.execute(
            "INSERT OR REPLACE INTO training_schedule (user_id, days_per_week, weekdays) VALUES (?1, ?2, ?3)",
            params![
                user_id,
                i64::from(schedule.days_per_week),
                schedule.weekdays.join(",")
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("set_schedule: {e}")))?;
        Ok(())
    }

    async fn get_schedule(
        &self,
        user_id: &str,
    ) -> Result<Option<TrainingSchedule>, DatabaseError> {
        let conn = self.conn().await;
        let mut rows = conn
            .query(
                "SELECT days_per_week, weekdays FROM training_schedule WHERE user_id = ?1",
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_schedule: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let days: i64 = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("get_schedule row parse: {e}")))?;
                let weekdays: String = row.get(1).unwrap_or_default();
                Ok(Some(TrainingSchedule {
                    days_per_week: u8::try_from(days).unwrap_or(0),
                    weekdays: weekdays
                        .split(',')
                        .filter(|d| !d.is_empty())
                        .map(str::to_string)
                        .collect(),
                }))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_schedule: {e}"))),
        }
    }
}
