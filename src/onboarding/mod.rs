//! Onboarding: the step-by-step questionnaire that builds a user's profile.
//!
//! Answers accumulate in a persisted [`Draft`]; the profile row is written
//! only once, in the transaction that also drops the draft.

pub mod manager;
pub mod prompts;
pub mod state;

pub use manager::{OnboardingManager, OnboardingReply, StartKind};
pub use state::{
    ChoiceKind, Draft, DraftAnswers, OnboardingStep, STEPS, StepInput, StepKind, StepOutcome,
    validate_age, validate_height, validate_name, validate_weight,
};
