//! Achievement evaluator: checks badge thresholds after training
//! completions and weight entries.

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::error::CoachError;
use crate::profile::{AchievementKind, Profile, TrainingStatus};
use crate::store::Database;

const PERFECT_WEEK_WORKOUTS: usize = 7;
const WEIGHT_LOSS_KG: f64 = 5.0;
const HEALTHY_BMI: std::ops::Range<f64> = 18.5..24.9;

/// Snapshot of the history the rules look at.
#[derive(Debug, Clone, Default)]
struct Facts {
    completed_total: usize,
    completed_last_week: usize,
    first_weight: Option<f64>,
    latest_weight: Option<f64>,
    profile: Option<Profile>,
}

fn qualifying(facts: &Facts) -> Vec<AchievementKind> {
    let mut kinds = Vec::new();

    if facts.completed_total >= 1 {
        kinds.push(AchievementKind::FirstWorkout);
    }
    if facts.completed_last_week >= PERFECT_WEEK_WORKOUTS {
        kinds.push(AchievementKind::PerfectWeek);
    }
    if let (Some(first), Some(latest)) = (facts.first_weight, facts.latest_weight) {
        if first - latest >= WEIGHT_LOSS_KG {
            kinds.push(AchievementKind::FiveKgLost);
        }
    }
    if let Some(profile) = &facts.profile {
        let weight = facts.latest_weight.unwrap_or(profile.weight_kg);
        if HEALTHY_BMI.contains(&profile.bmi_for(weight)) {
            kinds.push(AchievementKind::HealthyBmi);
        }
    }

    kinds
}

pub struct AchievementEvaluator {
    db: Arc<dyn Database>,
}

impl AchievementEvaluator {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    async fn facts(&self, user_id: &str) -> Result<Facts, CoachError> {
        let week_ago = Utc::now() - Duration::days(7);
        let weights = self.db.list_weights(user_id).await?;

        Ok(Facts {
            completed_total: self
                .db
                .count_trainings(user_id, TrainingStatus::Completed, None)
                .await?,
            completed_last_week: self
                .db
                .count_trainings(user_id, TrainingStatus::Completed, Some(week_ago))
                .await?,
            first_weight: weights.first().map(|w| w.weight_kg),
            latest_weight: weights.last().map(|w| w.weight_kg),
            profile: self.db.get_user(user_id).await?.and_then(|u| u.profile),
        })
    }

    /// Grant every badge whose threshold is met. Returns only the badges
    /// granted by this call.
    pub async fn evaluate(&self, user_id: &str) -> Result<Vec<AchievementKind>, CoachError> {
        let facts = self.facts(user_id).await?;
        let now = Utc::now();

        let mut granted = Vec::new();
        for kind in qualifying(&facts) {
            if self.db.grant_achievement(user_id, kind, now).await? {
                tracing::info!(
                    user_id = %user_id,
                    achievement = kind.as_str(),
                    "Achievement unlocked"
                );
                granted.push(kind);
            }
        }
        Ok(granted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{Gender, Goal, Level, TrainingLocation, TrainingRecord};
    use crate::store::LibSqlBackend;

    async fn setup() -> (AchievementEvaluator, Arc<dyn Database>) {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        (AchievementEvaluator::new(db.clone()), db)
    }

    fn profile(height_cm: u16, weight_kg: f64) -> Profile {
        Profile {
            name: "Al".into(),
            age: 34,
            gender: Gender::Male,
            height_cm,
            weight_kg,
            goal: Goal::Lose,
            training_location: TrainingLocation::Home,
            level: Level::Beginner,
        }
    }

    async fn complete_workouts(db: &Arc<dyn Database>, user: &str, n: usize) {
        for _ in 0..n {
            db.insert_training(&TrainingRecord::new_pending(user, "plan"))
                .await
                .unwrap();
            db.complete_latest_pending(user).await.unwrap();
        }
    }

    #[tokio::test]
    async fn first_workout_granted_once() {
        let (eval, db) = setup().await;
        complete_workouts(&db, "u1", 1).await;

        assert_eq!(eval.evaluate("u1").await.unwrap(), vec![AchievementKind::FirstWorkout]);
        assert!(eval.evaluate("u1").await.unwrap().is_empty());
        assert_eq!(db.list_achievements("u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn five_kg_lost_threshold() {
        let (eval, db) = setup().await;
        let t0 = Utc::now() - Duration::days(30);
        db.add_weight("u1", 90.0, t0).await.unwrap();
        db.add_weight("u1", 86.0, t0 + Duration::days(10)).await.unwrap();
        assert!(eval.evaluate("u1").await.unwrap().is_empty());

        db.add_weight("u1", 84.0, t0 + Duration::days(20)).await.unwrap();
        assert_eq!(eval.evaluate("u1").await.unwrap(), vec![AchievementKind::FiveKgLost]);
    }

    #[tokio::test]
    async fn questionnaire_weight_does_not_count_as_history() {
        let (eval, db) = setup().await;
        db.ensure_user("u1").await.unwrap();
        db.commit_profile("u1", &profile(180, 90.0)).await.unwrap();
        db.add_weight("u1", 85.0, Utc::now()).await.unwrap();

        let granted = eval.evaluate("u1").await.unwrap();
        assert!(!granted.contains(&AchievementKind::FiveKgLost));
    }

    #[tokio::test]
    async fn perfect_week_needs_seven() {
        let (eval, db) = setup().await;
        complete_workouts(&db, "u1", 6).await;
        let granted = eval.evaluate("u1").await.unwrap();
        assert!(!granted.contains(&AchievementKind::PerfectWeek));

        complete_workouts(&db, "u1", 1).await;
        assert_eq!(eval.evaluate("u1").await.unwrap(), vec![AchievementKind::PerfectWeek]);
    }

    #[test]
    fn healthy_bmi_uses_latest_weight_then_profile() {
        // 180 cm: BMI 18.5 at 59.94 kg, 24.9 at 80.68 kg
        let facts = Facts {
            profile: Some(profile(180, 95.0)),
            latest_weight: Some(75.0),
            ..Facts::default()
        };
        assert!(qualifying(&facts).contains(&AchievementKind::HealthyBmi));

        let facts = Facts {
            profile: Some(profile(180, 75.0)),
            ..Facts::default()
        };
        assert!(qualifying(&facts).contains(&AchievementKind::HealthyBmi));

        let facts = Facts {
            profile: Some(profile(180, 81.0)),
            ..Facts::default()
        };
        assert!(!qualifying(&facts).contains(&AchievementKind::HealthyBmi));
    }

    #[test]
    fn nothing_without_history() {
        assert!(qualifying(&Facts::default()).is_empty());
    }
}
