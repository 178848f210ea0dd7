//! Domain records shared by the store, the coaching core and the console.

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default reminder time for new users.
pub const DEFAULT_REMINDER_TIME: &str = "08:00";

/// An enumerated answer offered as a fixed menu during onboarding.
pub trait ChoiceOption: Sized + Copy + 'static {
    /// Every option, in menu order.
    const ALL: &'static [Self];

    /// Stable identifier used in storage and callback data.
    fn as_str(&self) -> &'static str;

    /// Button label shown to the user.
    fn label(&self) -> &'static str;

    fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|o| o.as_str() == s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

impl ChoiceOption for Gender {
    const ALL: &'static [Self] = &[Self::Male, Self::Female];

    fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Male => "Male",
            Self::Female => "Female",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Goal {
    Lose,
    Gain,
    Maintain,
}

impl ChoiceOption for Goal {
    const ALL: &'static [Self] = &[Self::Lose, Self::Gain, Self::Maintain];

    fn as_str(&self) -> &'static str {
        match self {
            Self::Lose => "lose",
            Self::Gain => "gain",
            Self::Maintain => "maintain",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Lose => "Lose weight",
            Self::Gain => "Gain muscle",
            Self::Maintain => "Maintain",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingLocation {
    Home,
    HomeWeights,
    Gym,
    Outdoor,
}

impl ChoiceOption for TrainingLocation {
    const ALL: &'static [Self] = &[Self::Home, Self::HomeWeights, Self::Gym, Self::Outdoor];

    fn as_str(&self) -> &'static str {
        match self {
            Self::Home => "home",
            Self::HomeWeights => "home_weights",
            Self::Gym => "gym",
            Self::Outdoor => "outdoor",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Home => "🏠 Home (no equipment)",
            Self::HomeWeights => "🏋️ Home + dumbbells",
            Self::Gym => "🏋️‍♂️ Gym",
            Self::Outdoor => "🌿 Outdoors",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Beginner,
    Intermediate,
    Advanced,
}

impl ChoiceOption for Level {
    const ALL: &'static [Self] = &[Self::Beginner, Self::Intermediate, Self::Advanced];

    fn as_str(&self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Beginner => "🌱 Beginner",
            Self::Intermediate => "⚡ Intermediate",
            Self::Advanced => "🔥 Advanced",
        }
    }
}

/// Completed onboarding answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub age: u8,
    pub gender: Gender,
    pub height_cm: u16,
    pub weight_kg: f64,
    pub goal: Goal,
    pub training_location: TrainingLocation,
    pub level: Level,
}

impl Profile {
    /// Body mass index for the given weight and this profile's height.
    pub fn bmi_for(&self, weight_kg: f64) -> f64 {
        let meters = f64::from(self.height_cm) / 100.0;
        weight_kg / (meters * meters)
    }
}

/// A user row. `profile` is `None` until onboarding commits.
#[derive(Debug, Clone, Serialize)]
pub struct UserRecord {
    pub user_id: String,
    pub profile: Option<Profile>,
    pub reminder_time: String,
    pub trial_granted: bool,
    pub next_training_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightEntry {
    pub user_id: String,
    pub weight_kg: f64,
    pub recorded_at: DateTime<Utc>,
}

/// Lifecycle of a generated workout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingStatus {
    Pending,
    Completed,
    Missed,
    Skipped,
}

impl TrainingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Missed => "missed",
            Self::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "completed" => Self::Completed,
            "missed" => Self::Missed,
            "skipped" => Self::Skipped,
            _ => Self::Pending,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainingRecord {
    pub id: Uuid,
    pub user_id: String,
    pub content: String,
    pub status: TrainingStatus,
    pub created_at: DateTime<Utc>,
}

impl TrainingRecord {
    pub fn new_pending(user_id: &str, content: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            content: content.to_string(),
            status: TrainingStatus::Pending,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AchievementKind {
    FirstWorkout,
    PerfectWeek,
    FiveKgLost,
    HealthyBmi,
}

impl AchievementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FirstWorkout => "first_workout",
            Self::PerfectWeek => "perfect_week",
            Self::FiveKgLost => "five_kg_lost",
            Self::HealthyBmi => "healthy_bmi",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "first_workout" => Some(Self::FirstWorkout),
            "perfect_week" => Some(Self::PerfectWeek),
            "five_kg_lost" => Some(Self::FiveKgLost),
            "healthy_bmi" => Some(Self::HealthyBmi),
            _ => None,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::FirstWorkout => "First workout",
            Self::PerfectWeek => "Perfect week",
            Self::FiveKgLost => "5 kg lost",
            Self::HealthyBmi => "Healthy BMI",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Achievement {
    pub user_id: String,
    pub kind: AchievementKind,
    pub achieved_at: DateTime<Utc>,
}

/// Why a subscription row exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionSource {
    Paid,
    Trial,
    Operator,
}

impl SubscriptionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paid => "paid",
            Self::Trial => "trial",
            Self::Operator => "operator",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "trial" => Self::Trial,
            "operator" => Self::Operator,
            _ => Self::Paid,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Subscription {
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
    pub source: SubscriptionSource,
}

impl Subscription {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Weekly training plan chosen via `/schedule`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingSchedule {
    pub days_per_week: u8,
    pub weekdays: Vec<String>,
}

impl TrainingSchedule {
    /// The preset offered for `days_per_week`, if any.
    pub fn preset(days_per_week: u8) -> Option<Self> {
        let weekdays: &[&str] = match days_per_week {
            3 => &["Mon", "Wed", "Fri"],
            4 => &["Mon", "Tue", "Thu", "Sat"],
            5 => &["Mon", "Tue", "Wed", "Thu", "Fri"],
            _ => return None,
        };
        Some(Self {
            days_per_week,
            weekdays: weekdays.iter().map(|d| d.to_string()).collect(),
        })
    }

    pub const PRESETS: [u8; 3] = [3, 4, 5];
}

impl std::fmt::Display for TrainingSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} days/week ({})", self.days_per_week, self.weekdays.join(", "))
    }
}

/// Parse and normalize a `HH:MM` reminder time.
pub fn parse_reminder_time(raw: &str) -> Option<String> {
    let time = NaiveTime::parse_from_str(raw.trim(), "%H:%M").ok()?;
    Some(time.format("%H:%M").to_string())
}

/// Row in the operator's user listing.
#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub user_id: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub trial_granted: bool,
    pub subscription: Option<Subscription>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn choice_parse_matches_as_str() {
        for g in Gender::ALL {
            assert_eq!(Gender::parse(g.as_str()), Some(*g));
        }
        for l in TrainingLocation::ALL {
            assert_eq!(TrainingLocation::parse(l.as_str()), Some(*l));
        }
        assert_eq!(Goal::parse("bulk"), None);
    }

    #[test]
    fn choice_serde_matches_as_str() {
        for level in Level::ALL {
            let json = serde_json::to_string(level).unwrap();
            assert_eq!(json, format!("\"{}\"", level.as_str()));
        }
    }

    #[test]
    fn bmi_uses_height_in_meters() {
        let profile = Profile {
            name: "Al".into(),
            age: 34,
            gender: Gender::Male,
            height_cm: 180,
            weight_kg: 81.0,
            goal: Goal::Maintain,
            training_location: TrainingLocation::Gym,
            level: Level::Beginner,
        };
        assert!((profile.bmi_for(81.0) - 25.0).abs() < 0.01);
    }

    #[test]
    fn schedule_presets() {
        assert_eq!(TrainingSchedule::preset(3).unwrap().weekdays, ["Mon", "Wed", "Fri"]);
        assert_eq!(TrainingSchedule::preset(5).unwrap().weekdays.len(), 5);
        assert!(TrainingSchedule::preset(6).is_none());
    }

    #[test]
    fn reminder_time_parsing() {
        assert_eq!(parse_reminder_time("7:05").as_deref(), Some("07:05"));
        assert_eq!(parse_reminder_time(" 21:30 ").as_deref(), Some("21:30"));
        assert!(parse_reminder_time("25:00").is_none());
        assert!(parse_reminder_time("noon").is_none());
    }

    #[test]
    fn training_status_terminal() {
        assert!(!TrainingStatus::Pending.is_terminal());
        assert!(TrainingStatus::Completed.is_terminal());
        assert_eq!(TrainingStatus::parse("missed"), TrainingStatus::Missed);
    }
}
