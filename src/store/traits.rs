//! Unified `Database` trait: single async interface for all persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::onboarding::Draft;
use crate::profile::{
    Achievement, AchievementKind, Profile, Subscription, SubscriptionSource, TrainingRecord,
    TrainingSchedule, TrainingStatus, UserRecord, UserSummary, WeightEntry,
};

/// Backend-agnostic database trait covering profiles, histories and
/// entitlements.
///
/// Every method is one statement or one transaction, so callers never see a
/// half-applied write.
#[async_trait]
pub trait Database: Send + Sync {
    /// Create tables and apply pending migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    // ── Users ───────────────────────────────────────────────────────

    /// Create a bare user record if none exists. Returns `true` if created.
    async fn ensure_user(&self, user_id: &str) -> Result<bool, DatabaseError>;

    async fn get_user(&self, user_id: &str) -> Result<Option<UserRecord>, DatabaseError>;

    /// Write the full profile and drop the user's draft in one transaction.
    async fn commit_profile(&self, user_id: &str, profile: &Profile) -> Result<(), DatabaseError>;

    async fn set_reminder_time(&self, user_id: &str, hhmm: &str) -> Result<(), DatabaseError>;

    async fn set_next_training_at(
        &self,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;

    async fn count_users(&self) -> Result<usize, DatabaseError>;

    /// All users, newest first, joined with their subscription row.
    async fn list_users(&self) -> Result<Vec<UserSummary>, DatabaseError>;

    async fn list_user_ids(&self) -> Result<Vec<String>, DatabaseError>;

    /// Users with a committed profile, an active subscription, the given
    /// reminder time, and no future `next_training_at`.
    async fn list_users_due_for_reminder(
        &self,
        hhmm: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>, DatabaseError>;

    /// Delete a user and every record keyed by them. Returns `false` if the
    /// user did not exist.
    async fn delete_user(&self, user_id: &str) -> Result<bool, DatabaseError>;

    // ── Onboarding drafts ───────────────────────────────────────────

    async fn get_draft(&self, user_id: &str) -> Result<Option<Draft>, DatabaseError>;

    async fn save_draft(&self, user_id: &str, draft: &Draft) -> Result<(), DatabaseError>;

    async fn delete_draft(&self, user_id: &str) -> Result<bool, DatabaseError>;

    // ── Subscriptions ───────────────────────────────────────────────

    async fn get_subscription(&self, user_id: &str)
    -> Result<Option<Subscription>, DatabaseError>;

    /// Insert or replace the user's subscription row.
    async fn upsert_subscription(
        &self,
        user_id: &str,
        expires_at: DateTime<Utc>,
        source: SubscriptionSource,
    ) -> Result<(), DatabaseError>;

    /// Grant the one-time trial. Returns `false` without writing anything if
    /// the trial flag is already set.
    async fn grant_trial(
        &self,
        user_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError>;

    async fn delete_subscription(&self, user_id: &str) -> Result<bool, DatabaseError>;

    async fn count_active_subscriptions(&self, now: DateTime<Utc>)
    -> Result<usize, DatabaseError>;

    // ── Weights ─────────────────────────────────────────────────────

    async fn add_weight(
        &self,
        user_id: &str,
        weight_kg: f64,
        recorded_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;

    /// Weight history, oldest first.
    async fn list_weights(&self, user_id: &str) -> Result<Vec<WeightEntry>, DatabaseError>;

    // ── Trainings ───────────────────────────────────────────────────

    async fn insert_training(&self, record: &TrainingRecord) -> Result<(), DatabaseError>;

    /// Statuses of the `limit` most recent records, newest first.
    async fn recent_training_statuses(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<TrainingStatus>, DatabaseError>;

    /// Move the newest `pending` record to `completed`. Returns its id, or
    /// `None` when nothing was pending.
    async fn complete_latest_pending(&self, user_id: &str) -> Result<Option<Uuid>, DatabaseError>;

    async fn count_trainings(
        &self,
        user_id: &str,
        status: TrainingStatus,
        since: Option<DateTime<Utc>>,
    ) -> Result<usize, DatabaseError>;

    /// Mark every `pending` record created before `cutoff` as `missed`.
    async fn mark_stale_missed(&self, cutoff: DateTime<Utc>) -> Result<usize, DatabaseError>;

    async fn list_trainings(&self, user_id: &str) -> Result<Vec<TrainingRecord>, DatabaseError>;

    // ── Achievements ────────────────────────────────────────────────

    /// Insert-if-absent. Returns `true` only for a new grant.
    async fn grant_achievement(
        &self,
        user_id: &str,
        kind: AchievementKind,
        at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError>;

    async fn list_achievements(&self, user_id: &str) -> Result<Vec<Achievement>, DatabaseError>;

    // ── Schedule ────────────────────────────────────────────────────

    async fn set_schedule(
        &self,
        user_id: &str,
        schedule: &TrainingSchedule,
    ) -> Result<(), DatabaseError>;

    async fn get_schedule(&self, user_id: &str)
    -> Result<Option<TrainingSchedule>, DatabaseError>;
}
