//! User profile and history records.

pub mod model;

pub use model::{
    Achievement, AchievementKind, ChoiceOption, Gender, Goal, Level, Profile, Subscription,
    SubscriptionSource, TrainingLocation, TrainingRecord, TrainingSchedule, TrainingStatus,
    UserRecord, UserSummary, WeightEntry,
};
