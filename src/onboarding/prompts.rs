//! Questions, menus and confirmations shown during onboarding.

use crate::channels::{Button, OutgoingResponse};
use crate::profile::{ChoiceOption, Gender, Goal, Level, Profile, TrainingLocation};

use super::state::{ChoiceKind, OnboardingStep, StepKind};

pub const NO_DRAFT: &str = "Start the questionnaire first with /start.";
pub const CANCELLED: &str = "Questionnaire cancelled. Send /start whenever you want to begin again.";
pub const NOTHING_TO_CANCEL: &str = "Nothing to cancel right now.";

/// Callback data for a menu option, e.g. `location:gym`.
pub fn choice_data(kind: ChoiceKind, value: &str) -> String {
    format!("{}:{value}", kind.as_str())
}

fn menu<T: ChoiceOption>(kind: ChoiceKind) -> Vec<Vec<Button>> {
    T::ALL
        .iter()
        .map(|o| vec![Button::new(o.label(), choice_data(kind, o.as_str()))])
        .collect()
}

/// One button per option, one option per row.
pub fn choice_menu(kind: ChoiceKind) -> Vec<Vec<Button>> {
    match kind {
        ChoiceKind::Gender => menu::<Gender>(kind),
        ChoiceKind::Goal => menu::<Goal>(kind),
        ChoiceKind::TrainingLocation => menu::<TrainingLocation>(kind),
        ChoiceKind::Level => menu::<Level>(kind),
    }
}

fn question(step: OnboardingStep) -> &'static str {
    match step {
        OnboardingStep::Name => "What's your name?",
        OnboardingStep::Age => "How old are you?",
        OnboardingStep::Gender => "What's your gender?",
        OnboardingStep::Height => "What's your height in cm?",
        OnboardingStep::Weight => "What's your current weight in kg?",
        OnboardingStep::Goal => "What's your goal?",
        OnboardingStep::TrainingLocation => "Where will you train?",
        OnboardingStep::Level => "What's your fitness level?",
    }
}

/// The question for a step, with its menu when the step takes a choice.
pub fn step_prompt(step: OnboardingStep) -> OutgoingResponse {
    let response = OutgoingResponse::text(question(step));
    match step.kind() {
        StepKind::FreeText => response,
        StepKind::Choice(kind) => response.with_buttons(choice_menu(kind)),
    }
}

/// A corrective message followed by the question again.
pub fn rejection(message: &str, step: OnboardingStep) -> OutgoingResponse {
    let mut response = step_prompt(step);
    response.content = format!("⚠️ {message}\n\n{}", response.content);
    response
}

pub fn greeting(returning: bool) -> String {
    if returning {
        "👋 Welcome back! Let's refresh your profile.".to_string()
    } else {
        "👋 Hi! I'm your personal fitness coach. Answer a few questions so I can tailor \
         workouts and meal plans to you."
            .to_string()
    }
}

pub fn completed(profile: &Profile) -> String {
    format!(
        "✅ Profile saved, {}!\n\n\
         /training — get a workout\n\
         /food — get a meal plan\n\
         /weight <kg> — log your weight\n\
         /profile — see your profile\n\
         /subscribe — subscription and free trial\n\
         /help — all commands",
        profile.name
    )
}
