//! User-facing texts and menus.

use chrono::{DateTime, Utc};

use crate::channels::{Button, Invoice, OutgoingResponse};
use crate::entitlement::PLAN_MONTHLY;
use crate::error::CoachError;
use crate::profile::{
    Achievement, AchievementKind, ChoiceOption, Subscription, TrainingSchedule, UserRecord,
    WeightEntry,
};

pub const TRIAL_CLAIM: &str = "trial:claim";
pub const TRAINING_DONE: &str = "training:done";
pub const TRAINING_POSTPONE: &str = "training:postpone";

/// Price of the monthly plan in minor currency units.
pub const MONTHLY_PRICE: i64 = 14_900;
pub const CURRENCY: &str = "RUB";

pub const HELP: &str = "Commands:\n\
    /start — fill in or redo the questionnaire\n\
    /cancel — stop the questionnaire\n\
    /training — get a workout\n\
    /food — get a meal plan\n\
    /weight <kg> — log your weight\n\
    /weight_history — your logged weights\n\
    /profile — your profile\n\
    /schedule — pick training days\n\
    /reminder HH:MM — set the reminder time\n\
    /report — the last 7 days\n\
    /achievements — your badges\n\
    /subscribe — subscription and free trial\n\
    /help — this list";

pub const UNKNOWN_COMMAND: &str = "I don't know that command. Send /help for the list.";
pub const WEIGHT_USAGE: &str = "Send your weight like this: /weight 70.5";
pub const REMINDER_USAGE: &str = "Send the time like this: /reminder 08:30";
pub const PAYMENT_UNAVAILABLE: &str = "❌ Payment is temporarily unavailable. Please contact the administrator.";
pub const NOT_ADMIN: &str = "❌ You don't have administrator rights.";
pub const NO_WEIGHTS: &str = "No weight entries yet. Log one with /weight <kg>.";
pub const NO_ACHIEVEMENTS: &str = "You have no achievements yet.";
pub const POSTPONED_PREFIX: &str = "⏰ Workout postponed. Next one is due";
pub const GENERATING: &str = "Preparing your plan...";

/// Fixed reply for each domain error. The cause is never shown.
pub fn for_error(err: &CoachError) -> String {
    match err {
        CoachError::Validation(message) => format!("⚠️ {message}"),
        CoachError::NotOnboarded => "Fill in the questionnaire first: /start".to_string(),
        CoachError::NotSubscribed => {
            "🔒 This needs an active subscription. See /subscribe to get one or claim the free trial."
                .to_string()
        }
        CoachError::AlreadyGranted => "❌ The free trial was already used.".to_string(),
        CoachError::GenerationUnavailable => {
            "😔 I couldn't prepare that right now. Please try again in a few minutes.".to_string()
        }
        CoachError::NoActiveItem => "There's no pending workout to mark.".to_string(),
        CoachError::Database(_) => {
            "Something went wrong on our side. Please try again.".to_string()
        }
    }
}

fn day(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

/// Generated workout with its two follow-up actions.
pub fn training(content: &str) -> OutgoingResponse {
    OutgoingResponse::text(format!("🏋️ Your workout:\n\n{content}")).with_buttons(vec![vec![
        Button::new("✅ Done", TRAINING_DONE),
        Button::new("⏰ Postpone", TRAINING_POSTPONE),
    ]])
}

pub fn food(content: &str) -> OutgoingResponse {
    OutgoingResponse::text(format!("🥗 Your meal plan:\n\n{content}"))
}

pub fn reminder(content: &str) -> OutgoingResponse {
    let mut response = training(content);
    response.content = format!("🔔 Time to train!\n\n{}", response.content);
    response
}

pub fn postponed(next: DateTime<Utc>) -> String {
    format!("{POSTPONED_PREFIX} {}.", day(next))
}

/// Empty when nothing new was granted.
pub fn unlocked(kinds: &[AchievementKind]) -> String {
    kinds
        .iter()
        .map(|k| format!("🏆 Achievement unlocked: {}!", k.title()))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn workout_completed(kinds: &[AchievementKind]) -> String {
    let mut text = "💪 Great job! Workout marked as done.".to_string();
    if !kinds.is_empty() {
        text.push_str("\n\n");
        text.push_str(&unlocked(kinds));
    }
    text
}

pub fn weight_saved(weight_kg: f64, kinds: &[AchievementKind]) -> String {
    let mut text = format!("✅ Weight {weight_kg} kg saved.");
    if !kinds.is_empty() {
        text.push_str("\n\n");
        text.push_str(&unlocked(kinds));
    }
    text
}

pub fn weight_history(weights: &[WeightEntry]) -> String {
    if weights.is_empty() {
        return NO_WEIGHTS.to_string();
    }
    let lines: Vec<String> = weights
        .iter()
        .map(|w| format!("{}: {} kg", day(w.recorded_at), w.weight_kg))
        .collect();
    format!("📈 Weight history:\n\n{}", lines.join("\n"))
}

pub fn achievements(list: &[Achievement]) -> String {
    if list.is_empty() {
        return NO_ACHIEVEMENTS.to_string();
    }
    let lines: Vec<String> = list
        .iter()
        .map(|a| format!("🏆 {} — {}", a.kind.title(), day(a.achieved_at)))
        .collect();
    format!("Your achievements:\n\n{}", lines.join("\n"))
}

pub fn report(completed: usize, missed: usize) -> String {
    format!(
        "📊 Weekly report (last 7 days):\n\
         - Workouts completed: {completed}\n\
         - Workouts missed: {missed}"
    )
}

pub fn subscription_status(sub: Option<&Subscription>, now: DateTime<Utc>) -> String {
    match sub {
        Some(s) if s.is_active_at(now) => format!("active until {}", day(s.expires_at)),
        Some(s) => format!("expired on {}", day(s.expires_at)),
        None => "not subscribed".to_string(),
    }
}

pub fn schedule_menu() -> OutgoingResponse {
    let rows = TrainingSchedule::PRESETS
        .iter()
        .map(|n| vec![Button::new(format!("{n} times a week"), format!("schedule:{n}"))])
        .collect();
    OutgoingResponse::text("How many times a week do you want to train?").with_buttons(rows)
}

pub fn schedule_saved(schedule: &TrainingSchedule) -> String {
    format!("📅 Schedule saved: {schedule}")
}

pub fn reminder_saved(hhmm: &str) -> String {
    format!("🔔 Reminders will come at {hhmm}.")
}

pub fn trial_granted(expires_at: DateTime<Utc>) -> String {
    format!("🎁 Free trial activated until {}!", day(expires_at))
}

pub fn payment_received(sub: &Subscription) -> String {
    format!("✅ Thank you! Your subscription is active until {}.", day(sub.expires_at))
}

pub fn trial_offer(days: i64) -> OutgoingResponse {
    OutgoingResponse::text(format!("Or try it free for {days} days!"))
        .with_buttons(vec![vec![Button::new(format!("🎁 Free trial ({days} days)"), TRIAL_CLAIM)]])
}

pub fn monthly_invoice(provider_token: &str, days: i64) -> Invoice {
    Invoice {
        title: "1 month subscription".to_string(),
        description: format!("Workouts and meal plans for {days} days"),
        payload: PLAN_MONTHLY.to_string(),
        currency: CURRENCY.to_string(),
        amount: MONTHLY_PRICE,
        provider_token: provider_token.to_string(),
    }
}

pub fn admin_stats(users: usize, subscribers: usize) -> String {
    format!("🔐 Admin\n\nUsers: {users}\nActive subscribers: {subscribers}")
}

/// Everything `/profile` shows.
pub struct ProfileView<'a> {
    pub user: &'a UserRecord,
    pub schedule: Option<&'a TrainingSchedule>,
    pub achievements: &'a [Achievement],
    pub subscription: Option<&'a Subscription>,
    pub trial_days_left: i64,
    pub weights: &'a [WeightEntry],
}

/// Returns `None` when the user has no committed profile.
pub fn profile(view: &ProfileView<'_>, now: DateTime<Utc>) -> Option<String> {
    let p = view.user.profile.as_ref()?;

    let schedule = view
        .schedule
        .map_or_else(|| "not set".to_string(), ToString::to_string);
    let badges = if view.achievements.is_empty() {
        "none".to_string()
    } else {
        view.achievements
            .iter()
            .map(|a| a.kind.title())
            .collect::<Vec<_>>()
            .join(", ")
    };
    let next = view
        .user
        .next_training_at
        .map_or_else(|| "not set".to_string(), day);
    let recent: Vec<String> = view
        .weights
        .iter()
        .rev()
        .take(5)
        .rev()
        .map(|w| format!("{}: {} kg", day(w.recorded_at), w.weight_kg))
        .collect();

    let mut text = format!(
        "👤 {}\n\
         Age: {}\n\
         Gender: {}\n\
         Height: {} cm\n\
         Weight: {} kg\n\
         Goal: {}\n\
         Training location: {}\n\
         Level: {}\n\
         Next workout: {next}\n\
         Reminder time: {}\n\
         Schedule: {schedule}\n\
         Achievements: {badges}\n\
         Subscription: {}",
        p.name,
        p.age,
        p.gender.label(),
        p.height_cm,
        p.weight_kg,
        p.goal.label(),
        p.training_location.label(),
        p.level.label(),
        view.user.reminder_time,
        subscription_status(view.subscription, now),
    );
    if view.trial_days_left > 0 {
        text.push_str(&format!("\nTrial days left: {}", view.trial_days_left));
    }
    text.push_str("\nWeight history:\n");
    if recent.is_empty() {
        text.push_str("no entries");
    } else {
        text.push_str(&recent.join("\n"));
    }
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DatabaseError;
    use crate::profile::{Gender, Goal, Level, Profile, SubscriptionSource, TrainingLocation};

    #[test]
    fn database_errors_stay_generic() {
        let text = for_error(&CoachError::Database(DatabaseError::Query(
            "get_user: disk I/O error".into(),
        )));
        assert!(!text.contains("disk"));
        assert!(for_error(&CoachError::Validation("Too short.".into())).contains("Too short."));
    }

    #[test]
    fn training_reply_offers_both_actions() {
        let r = training("Squats");
        let data: Vec<&str> = r.buttons.iter().flatten().map(|b| b.data.as_str()).collect();
        assert_eq!(data, vec![TRAINING_DONE, TRAINING_POSTPONE]);
        assert!(reminder("Squats").content.starts_with("🔔"));
    }

    #[test]
    fn unlocked_lists_each_badge() {
        assert!(workout_completed(&[]).ends_with("done."));
        let text = weight_saved(84.0, &[AchievementKind::FiveKgLost]);
        assert!(text.contains("5 kg lost"));
    }

    #[test]
    fn profile_shows_last_five_weights_and_trial() {
        let now = Utc::now();
        let user = UserRecord {
            user_id: "u1".into(),
            profile: Some(Profile {
                name: "Al".into(),
                age: 34,
                gender: Gender::Male,
                height_cm: 180,
                weight_kg: 82.0,
                goal: Goal::Maintain,
                training_location: TrainingLocation::Gym,
                level: Level::Advanced,
            }),
            reminder_time: "09:00".into(),
            trial_granted: true,
            next_training_at: None,
            created_at: now,
        };
        let weights: Vec<WeightEntry> = (0..7)
            .map(|i| WeightEntry {
                user_id: "u1".into(),
                weight_kg: 80.0 + f64::from(i),
                recorded_at: now,
            })
            .collect();
        let sub = Subscription {
            user_id: "u1".into(),
            expires_at: now + chrono::Duration::days(3),
            source: SubscriptionSource::Trial,
        };
        let view = ProfileView {
            user: &user,
            schedule: None,
            achievements: &[],
            subscription: Some(&sub),
            trial_days_left: 3,
            weights: &weights,
        };

        let text = profile(&view, now).unwrap();
        assert!(text.contains("Trial days left: 3"));
        assert!(text.contains("86 kg"));
        assert!(!text.contains(": 81 kg"));
        assert!(text.contains("Schedule: not set"));
    }

    #[test]
    fn subscription_status_variants() {
        let now = Utc::now();
        let sub = Subscription {
            user_id: "u1".into(),
            expires_at: now - chrono::Duration::days(1),
            source: SubscriptionSource::Paid,
        };
        assert!(subscription_status(Some(&sub), now).starts_with("expired"));
        assert_eq!(subscription_status(None, now), "not subscribed");
    }
}
