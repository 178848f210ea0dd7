//! Onboarding state machine: the step list, field validation and the
//! per-user draft.

use serde::{Deserialize, Serialize};

use crate::error::CoachError;
use crate::profile::{ChoiceOption, Gender, Goal, Level, Profile, TrainingLocation};

/// The questionnaire steps.
///
/// Progresses linearly: Name → Age → Gender → Height → Weight → Goal →
/// TrainingLocation → Level → commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStep {
    #[default]
    Name,
    Age,
    Gender,
    Height,
    Weight,
    Goal,
    TrainingLocation,
    Level,
}

/// Which menu a choice step offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChoiceKind {
    Gender,
    Goal,
    TrainingLocation,
    Level,
}

impl ChoiceKind {
    /// Prefix used in callback data, e.g. `gender:male`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gender => "gender",
            Self::Goal => "goal",
            Self::TrainingLocation => "location",
            Self::Level => "level",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "gender" => Some(Self::Gender),
            "goal" => Some(Self::Goal),
            "location" => Some(Self::TrainingLocation),
            "level" => Some(Self::Level),
            _ => None,
        }
    }
}

/// How a step takes its answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    FreeText,
    Choice(ChoiceKind),
}

/// One entry of the declarative step list.
#[derive(Debug, Clone, Copy)]
pub struct StepSpec {
    pub step: OnboardingStep,
    pub kind: StepKind,
}

const fn text(step: OnboardingStep) -> StepSpec {
    StepSpec {
        step,
        kind: StepKind::FreeText,
    }
}

const fn choice(step: OnboardingStep, kind: ChoiceKind) -> StepSpec {
    StepSpec {
        step,
        kind: StepKind::Choice(kind),
    }
}

/// The questionnaire, in order.
pub const STEPS: &[StepSpec] = &[
    text(OnboardingStep::Name),
    text(OnboardingStep::Age),
    choice(OnboardingStep::Gender, ChoiceKind::Gender),
    text(OnboardingStep::Height),
    text(OnboardingStep::Weight),
    choice(OnboardingStep::Goal, ChoiceKind::Goal),
    choice(OnboardingStep::TrainingLocation, ChoiceKind::TrainingLocation),
    choice(OnboardingStep::Level, ChoiceKind::Level),
];

impl OnboardingStep {
    fn position(&self) -> usize {
        STEPS
            .iter()
            .position(|s| s.step == *self)
            .unwrap_or(STEPS.len() - 1)
    }

    /// The next step, or `None` after the last one (commit).
    pub fn next(&self) -> Option<OnboardingStep> {
        STEPS.get(self.position() + 1).map(|s| s.step)
    }

    pub fn kind(&self) -> StepKind {
        STEPS[self.position()].kind
    }
}

impl std::fmt::Display for OnboardingStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Name => "name",
            Self::Age => "age",
            Self::Gender => "gender",
            Self::Height => "height",
            Self::Weight => "weight",
            Self::Goal => "goal",
            Self::TrainingLocation => "training_location",
            Self::Level => "level",
        };
        write!(f, "{s}")
    }
}

/// An answer delivered to the current step.
#[derive(Debug, Clone, Copy)]
pub enum StepInput<'a> {
    Text(&'a str),
    Choice { kind: ChoiceKind, value: &'a str },
}

/// Result of a successful answer.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Moved on; prompt for this step next.
    Advanced(OnboardingStep),
    /// Last step answered; the profile is ready to commit.
    Completed(Profile),
}

pub const EXPECTED_CHOICE: &str = "Please pick one of the options below.";
pub const WRONG_STEP: &str = "That's not this step of the questionnaire.";

/// Answers collected so far.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DraftAnswers {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height_cm: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_kg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<Goal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training_location: Option<TrainingLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<Level>,
}

impl DraftAnswers {
    fn to_profile(&self) -> Option<Profile> {
        Some(Profile {
            name: self.name.clone()?,
            age: self.age?,
            gender: self.gender?,
            height_cm: self.height_cm?,
            weight_kg: self.weight_kg?,
            goal: self.goal?,
            training_location: self.training_location?,
            level: self.level?,
        })
    }
}

/// In-progress onboarding for one user.
///
/// Persisted in the `drafts` table between answers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    pub step: OnboardingStep,
    pub answers: DraftAnswers,
}

impl Draft {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an answer to the current step.
    ///
    /// On error the draft is left exactly as it was.
    pub fn accept(&mut self, input: StepInput<'_>) -> Result<StepOutcome, CoachError> {
        let mut answers = self.answers.clone();

        match (self.step, input) {
            (OnboardingStep::Name, StepInput::Text(t)) => answers.name = Some(validate_name(t)?),
            (OnboardingStep::Age, StepInput::Text(t)) => answers.age = Some(validate_age(t)?),
            (OnboardingStep::Height, StepInput::Text(t)) => {
                answers.height_cm = Some(validate_height(t)?)
            }
            (OnboardingStep::Weight, StepInput::Text(t)) => {
                answers.weight_kg = Some(validate_weight(t)?)
            }
            (OnboardingStep::Gender, StepInput::Choice { kind: ChoiceKind::Gender, value }) => {
                answers.gender = Some(parse_choice(value)?)
            }
            (OnboardingStep::Goal, StepInput::Choice { kind: ChoiceKind::Goal, value }) => {
                answers.goal = Some(parse_choice(value)?)
            }
            (
                OnboardingStep::TrainingLocation,
                StepInput::Choice { kind: ChoiceKind::TrainingLocation, value },
            ) => answers.training_location = Some(parse_choice(value)?),
            (OnboardingStep::Level, StepInput::Choice { kind: ChoiceKind::Level, value }) => {
                answers.level = Some(parse_choice(value)?)
            }
            (_, StepInput::Text(_)) => {
                return Err(CoachError::Validation(EXPECTED_CHOICE.to_string()));
            }
            (_, StepInput::Choice { .. }) => {
                return Err(CoachError::Validation(WRONG_STEP.to_string()));
            }
        }

        match self.step.next() {
            Some(next) => {
                self.answers = answers;
                self.step = next;
                Ok(StepOutcome::Advanced(next))
            }
            None => {
                let profile = answers.to_profile().ok_or_else(|| {
                    CoachError::Validation("Some answers are missing, please /start again.".into())
                })?;
                self.answers = answers;
                Ok(StepOutcome::Completed(profile))
            }
        }
    }
}

// ── Field validation ────────────────────────────────────────────────

pub fn validate_name(raw: &str) -> Result<String, CoachError> {
    let name = raw.trim();
    let len = name.chars().count();
    if len < 2 {
        return Err(CoachError::Validation(
            "Please enter your real name (at least 2 characters).".into(),
        ));
    }
    if len > 64 {
        return Err(CoachError::Validation(
            "That name is too long (64 characters max).".into(),
        ));
    }
    Ok(name.to_string())
}

pub fn validate_age(raw: &str) -> Result<u8, CoachError> {
    let age: i64 = raw
        .trim()
        .parse()
        .map_err(|_| CoachError::Validation("Please enter a whole number.".into()))?;
    if !(10..=100).contains(&age) {
        return Err(CoachError::Validation(
            "Please enter a real age (from 10 to 100).".into(),
        ));
    }
    Ok(age as u8)
}

pub fn validate_height(raw: &str) -> Result<u16, CoachError> {
    let height: i64 = raw
        .trim()
        .parse()
        .map_err(|_| CoachError::Validation("Please enter a whole number.".into()))?;
    if !(100..=250).contains(&height) {
        return Err(CoachError::Validation(
            "Please enter a real height in cm (from 100 to 250).".into(),
        ));
    }
    Ok(height as u16)
}

/// Accepts `.` or `,` as decimal separator.
pub fn validate_weight(raw: &str) -> Result<f64, CoachError> {
    let weight: f64 = raw
        .trim()
        .replace(',', ".")
        .parse()
        .map_err(|_| CoachError::Validation("Please enter a number (e.g. 70.5).".into()))?;
    if !weight.is_finite() || !(30.0..=300.0).contains(&weight) {
        return Err(CoachError::Validation(
            "Please enter a real weight (from 30 to 300 kg).".into(),
        ));
    }
    Ok(weight)
}

fn parse_choice<T: ChoiceOption>(value: &str) -> Result<T, CoachError> {
    T::parse(value).ok_or_else(|| CoachError::Validation(EXPECTED_CHOICE.to_string()))
}
