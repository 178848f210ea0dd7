//! Coach: runs content requests through the entitlement guard and the
//! generator, and moves training records through their lifecycle.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::achievements::AchievementEvaluator;
use crate::entitlement::Entitlements;
use crate::error::CoachError;
use crate::llm::{CompletionRequest, LlmProvider};
use crate::onboarding::validate_weight;
use crate::profile::{AchievementKind, TrainingRecord};
use crate::store::Database;

use super::prompts::{food_request, training_request};
use super::{DIFFICULTY_WINDOW, Difficulty};

/// Days until the next workout is due after one is generated.
const NEXT_TRAINING_DAYS: i64 = 2;
/// Days a postponed workout is pushed back by.
const POSTPONE_DAYS: i64 = 1;

#[derive(Debug, Clone)]
pub struct GeneratedTraining {
    pub record_id: Uuid,
    pub content: String,
    pub difficulty: Difficulty,
}

#[derive(Debug, Clone)]
pub struct CompletedTraining {
    pub record_id: Uuid,
    pub new_achievements: Vec<AchievementKind>,
}

#[derive(Debug, Clone)]
pub struct WeightLogged {
    pub weight_kg: f64,
    pub new_achievements: Vec<AchievementKind>,
}

pub struct Coach {
    db: Arc<dyn Database>,
    entitlements: Arc<Entitlements>,
    achievements: Arc<AchievementEvaluator>,
    llm: Arc<dyn LlmProvider>,
    timeout: Duration,
}

impl Coach {
    pub fn new(
        db: Arc<dyn Database>,
        entitlements: Arc<Entitlements>,
        achievements: Arc<AchievementEvaluator>,
        llm: Arc<dyn LlmProvider>,
        timeout: Duration,
    ) -> Self {
        Self {
            db,
            entitlements,
            achievements,
            llm,
            timeout,
        }
    }

    /// Call the generator once, bounded by the configured timeout. The
    /// underlying cause is logged and never returned.
    async fn generate(
        &self,
        user_id: &str,
        request: CompletionRequest,
    ) -> Result<String, CoachError> {
        match tokio::time::timeout(self.timeout, self.llm.complete(request)).await {
            Ok(Ok(response)) => Ok(response.content),
            Ok(Err(e)) => {
                tracing::warn!(
                    user_id = %user_id,
                    model = self.llm.model_name(),
                    "Generation failed: {e}"
                );
                Err(CoachError::GenerationUnavailable)
            }
            Err(_) => {
                tracing::warn!(
                    user_id = %user_id,
                    model = self.llm.model_name(),
                    timeout_secs = self.timeout.as_secs(),
                    "Generation timed out"
                );
                Err(CoachError::GenerationUnavailable)
            }
        }
    }

    pub async fn difficulty_for(&self, user_id: &str) -> Result<Difficulty, CoachError> {
        let statuses = self
            .db
            .recent_training_statuses(user_id, DIFFICULTY_WINDOW)
            .await?;
        Ok(Difficulty::from_recent(&statuses))
    }

    pub async fn request_training(&self, user_id: &str) -> Result<GeneratedTraining, CoachError> {
        let profile = self.entitlements.require_access(user_id).await?;
        let difficulty = self.difficulty_for(user_id).await?;

        let content = self
            .generate(user_id, training_request(&profile, difficulty))
            .await?;

        let record = TrainingRecord::new_pending(user_id, &content);
        self.db.insert_training(&record).await?;
        self.db
            .set_next_training_at(user_id, Utc::now() + chrono::Duration::days(NEXT_TRAINING_DAYS))
            .await?;

        tracing::info!(
            user_id = %user_id,
            training_id = %record.id,
            ?difficulty,
            "Workout generated"
        );
        Ok(GeneratedTraining {
            record_id: record.id,
            content,
            difficulty,
        })
    }

    /// Meal plans are not persisted.
    pub async fn request_food(&self, user_id: &str) -> Result<String, CoachError> {
        let profile = self.entitlements.require_access(user_id).await?;
        let content = self.generate(user_id, food_request(&profile)).await?;
        tracing::info!(user_id = %user_id, "Meal plan generated");
        Ok(content)
    }

    /// Mark the newest pending workout completed and re-check badges.
    pub async fn confirm_completed(&self, user_id: &str) -> Result<CompletedTraining, CoachError> {
        let record_id = self
            .db
            .complete_latest_pending(user_id)
            .await?
            .ok_or(CoachError::NoActiveItem)?;
        let new_achievements = self.achievements.evaluate(user_id).await?;

        Ok(CompletedTraining {
            record_id,
            new_achievements,
        })
    }

    /// Push the next workout back a day. Record statuses are untouched.
    pub async fn postpone(&self, user_id: &str) -> Result<DateTime<Utc>, CoachError> {
        let next = Utc::now() + chrono::Duration::days(POSTPONE_DAYS);
        self.db.set_next_training_at(user_id, next).await?;
        tracing::debug!(user_id = %user_id, next = %next, "Workout postponed");
        Ok(next)
    }

    /// Mark pending workouts older than `staleness` as missed.
    pub async fn sweep_missed(&self, staleness: chrono::Duration) -> Result<usize, CoachError> {
        let missed = self.db.mark_stale_missed(Utc::now() - staleness).await?;
        if missed > 0 {
            tracing::info!(count = missed, "Stale workouts marked missed");
        }
        Ok(missed)
    }

    /// Validate and append a weight entry, then re-check badges.
    pub async fn log_weight(&self, user_id: &str, raw: &str) -> Result<WeightLogged, CoachError> {
        self.entitlements.require_profile(user_id).await?;
        let weight_kg = validate_weight(raw)?;

        self.db.add_weight(user_id, weight_kg, Utc::now()).await?;
        let new_achievements = self.achievements.evaluate(user_id).await?;

        Ok(WeightLogged {
            weight_kg,
            new_achievements,
        })
    }
}
