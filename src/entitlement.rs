//! Entitlement engine: subscriptions, the one-time trial, and the access
//! guard in front of gated features.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::config::PlanConfig;
use crate::error::CoachError;
use crate::profile::{Profile, Subscription, SubscriptionSource};
use crate::store::Database;

/// Invoice payload of the paid monthly plan.
pub const PLAN_MONTHLY: &str = "subscription_1_month";
/// Invoice payload that claims the trial through the payment flow.
pub const PLAN_TRIAL: &str = "trial_7_days";

const SECONDS_PER_DAY: i64 = 86_400;

pub struct Entitlements {
    db: Arc<dyn Database>,
    plans: PlanConfig,
}

impl Entitlements {
    pub fn new(db: Arc<dyn Database>, plans: PlanConfig) -> Self {
        Self { db, plans }
    }

    pub fn plans(&self) -> PlanConfig {
        self.plans
    }

    pub async fn is_subscribed(&self, user_id: &str) -> Result<bool, CoachError> {
        let sub = self.db.get_subscription(user_id).await?;
        Ok(sub.is_some_and(|s| s.is_active_at(Utc::now())))
    }

    /// Set the subscription to expire `days` from now. Replaces any existing
    /// expiry, never extends it.
    pub async fn grant_subscription(
        &self,
        user_id: &str,
        days: i64,
        source: SubscriptionSource,
    ) -> Result<Subscription, CoachError> {
        if days <= 0 {
            return Err(CoachError::Validation(
                "Subscription length must be a positive number of days.".into(),
            ));
        }
        let expires_at = expiry_after(days)?;
        self.db.ensure_user(user_id).await?;
        self.db.upsert_subscription(user_id, expires_at, source).await?;

        tracing::info!(user_id = %user_id, days, source = source.as_str(), "Subscription granted");
        Ok(Subscription {
            user_id: user_id.to_string(),
            expires_at,
            source,
        })
    }

    pub async fn grant_trial(&self, user_id: &str) -> Result<Subscription, CoachError> {
        let expires_at = expiry_after(self.plans.trial_days)?;
        if !self.db.grant_trial(user_id, expires_at).await? {
            return Err(CoachError::AlreadyGranted);
        }
        Ok(Subscription {
            user_id: user_id.to_string(),
            expires_at,
            source: SubscriptionSource::Trial,
        })
    }

    /// Remove the subscription. The trial flag is left as is.
    pub async fn revoke(&self, user_id: &str) -> Result<bool, CoachError> {
        let revoked = self.db.delete_subscription(user_id).await?;
        if revoked {
            tracing::info!(user_id = %user_id, "Subscription revoked");
        }
        Ok(revoked)
    }

    /// Whole days left on an active trial, rounded up. Zero otherwise.
    pub async fn remaining_trial_days(&self, user_id: &str) -> Result<i64, CoachError> {
        let Some(sub) = self.db.get_subscription(user_id).await? else {
            return Ok(0);
        };
        let now = Utc::now();
        if sub.source != SubscriptionSource::Trial || !sub.is_active_at(now) {
            return Ok(0);
        }
        let secs = (sub.expires_at - now).num_seconds();
        Ok((secs + SECONDS_PER_DAY - 1) / SECONDS_PER_DAY)
    }

    /// The committed profile, or `NotOnboarded`.
    pub async fn require_profile(&self, user_id: &str) -> Result<Profile, CoachError> {
        self.db
            .get_user(user_id)
            .await?
            .and_then(|u| u.profile)
            .ok_or(CoachError::NotOnboarded)
    }

    /// Guard for gated features: profile first, then an active subscription.
    pub async fn require_access(&self, user_id: &str) -> Result<Profile, CoachError> {
        let profile = self.require_profile(user_id).await?;
        if !self.is_subscribed(user_id).await? {
            tracing::debug!(user_id = %user_id, "Gated feature refused: no subscription");
            return Err(CoachError::NotSubscribed);
        }
        Ok(profile)
    }

    /// Apply a confirmed payment for the plan named by `payload`.
    pub async fn payment_confirmed(
        &self,
        user_id: &str,
        payload: &str,
    ) -> Result<Subscription, CoachError> {
        match payload {
            PLAN_MONTHLY => {
                let days = self.plans.subscription_days;
                self.grant_subscription(user_id, days, SubscriptionSource::Paid).await
            }
            PLAN_TRIAL => self.grant_trial(user_id).await,
            other => {
                tracing::warn!(user_id = %user_id, payload = %other, "Payment for unknown plan");
                Err(CoachError::Validation(format!("Unknown plan: {other}")))
            }
        }
    }
}

/// `now + days`, or a validation error when that is not a representable time.
fn expiry_after(days: i64) -> Result<DateTime<Utc>, CoachError> {
    Duration::try_days(days)
        .and_then(|d| Utc::now().checked_add_signed(d))
        .ok_or_else(|| CoachError::Validation(format!("{days} days is too long.")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{Gender, Goal, Level, TrainingLocation};
    use crate::store::LibSqlBackend;

    async fn setup() -> (Entitlements, Arc<dyn Database>) {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        (Entitlements::new(db.clone(), PlanConfig::default()), db)
    }

    fn profile() -> Profile {
        Profile {
            name: "Al".into(),
            age: 34,
            gender: Gender::Male,
            height_cm: 180,
            weight_kg: 80.0,
            goal: Goal::Lose,
            training_location: TrainingLocation::Home,
            level: Level::Beginner,
        }
    }

    #[tokio::test]
    async fn trial_twice_is_already_granted_and_keeps_expiry() {
        let (ent, db) = setup().await;
        db.ensure_user("u1").await.unwrap();

        let first = ent.grant_trial("u1").await.unwrap();
        let second = ent.grant_trial("u1").await;
        assert!(matches!(second, Err(CoachError::AlreadyGranted)));

        let sub = db.get_subscription("u1").await.unwrap().unwrap();
        assert_eq!(
            sub.expires_at.timestamp_micros(),
            first.expires_at.timestamp_micros()
        );
        assert_eq!(ent.remaining_trial_days("u1").await.unwrap(), 7);
    }

    #[tokio::test]
    async fn subscribe_then_revoke() {
        let (ent, _db) = setup().await;
        ent.grant_subscription("u1", 30, SubscriptionSource::Operator)
            .await
            .unwrap();
        assert!(ent.is_subscribed("u1").await.unwrap());

        assert!(ent.revoke("u1").await.unwrap());
        assert!(!ent.is_subscribed("u1").await.unwrap());
        assert!(!ent.revoke("u1").await.unwrap());
    }

    #[tokio::test]
    async fn unrepresentable_length_is_validation_error() {
        let (ent, db) = setup().await;
        let err = ent
            .grant_subscription("u1", 1_000_000_000, SubscriptionSource::Operator)
            .await
            .unwrap_err();
        assert!(matches!(err, CoachError::Validation(_)));
        assert!(db.get_subscription("u1").await.unwrap().is_none());

        let ent = Entitlements::new(
            db.clone(),
            PlanConfig {
                trial_days: i64::MAX,
                ..PlanConfig::default()
            },
        );
        db.ensure_user("u2").await.unwrap();
        assert!(matches!(
            ent.grant_trial("u2").await.unwrap_err(),
            CoachError::Validation(_)
        ));
        assert!(!db.get_user("u2").await.unwrap().unwrap().trial_granted);
    }

    #[tokio::test]
    async fn regrant_replaces_expiry() {
        let (ent, db) = setup().await;
        ent.grant_subscription("u1", 30, SubscriptionSource::Paid)
            .await
            .unwrap();
        let short = ent
            .grant_subscription("u1", 2, SubscriptionSource::Operator)
            .await
            .unwrap();
        let sub = db.get_subscription("u1").await.unwrap().unwrap();
        assert_eq!(
            sub.expires_at.timestamp_micros(),
            short.expires_at.timestamp_micros()
        );
        assert_eq!(sub.source, SubscriptionSource::Operator);
    }

    #[tokio::test]
    async fn non_positive_days_rejected() {
        let (ent, _db) = setup().await;
        assert!(matches!(
            ent.grant_subscription("u1", 0, SubscriptionSource::Operator).await,
            Err(CoachError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn revoke_keeps_trial_flag() {
        let (ent, _db) = setup().await;
        ent.grant_trial("u1").await.unwrap();
        ent.revoke("u1").await.unwrap();
        assert!(matches!(ent.grant_trial("u1").await, Err(CoachError::AlreadyGranted)));
    }

    #[tokio::test]
    async fn remaining_trial_days_zero_for_paid() {
        let (ent, _db) = setup().await;
        ent.grant_subscription("u1", 30, SubscriptionSource::Paid)
            .await
            .unwrap();
        assert_eq!(ent.remaining_trial_days("u1").await.unwrap(), 0);
        assert_eq!(ent.remaining_trial_days("nobody").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn guard_checks_profile_before_subscription() {
        let (ent, db) = setup().await;
        db.ensure_user("u1").await.unwrap();
        assert!(matches!(ent.require_access("u1").await, Err(CoachError::NotOnboarded)));

        db.commit_profile("u1", &profile()).await.unwrap();
        assert!(matches!(ent.require_access("u1").await, Err(CoachError::NotSubscribed)));

        ent.grant_trial("u1").await.unwrap();
        assert_eq!(ent.require_access("u1").await.unwrap(), profile());
    }

    #[tokio::test]
    async fn payment_for_monthly_plan() {
        let (ent, db) = setup().await;
        let sub = ent.payment_confirmed("u1", PLAN_MONTHLY).await.unwrap();
        assert_eq!(sub.source, SubscriptionSource::Paid);
        let days = (sub.expires_at - Utc::now()).num_days();
        assert!((29..=30).contains(&days));
        assert!(db.get_subscription("u1").await.unwrap().is_some());

        assert!(ent.payment_confirmed("u1", "lifetime").await.is_err());
    }
}
