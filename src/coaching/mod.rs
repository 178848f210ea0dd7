//! Coaching: generated workouts and meal plans, and the training record
//! lifecycle around them.

pub mod orchestrator;
pub mod prompts;

pub use orchestrator::{Coach, CompletedTraining, GeneratedTraining, WeightLogged};

/// Number of most recent training records the difficulty signal looks at.
pub const DIFFICULTY_WINDOW: usize = 5;
/// Fewer completions than this inside the window means easy content.
pub const EASY_BELOW_COMPLETED: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Difficulty {
    Easy,
    Standard,
}

impl Difficulty {
    /// Derive from the statuses of the most recent records.
    pub fn from_recent(statuses: &[crate::profile::TrainingStatus]) -> Self {
        let completed = statuses
            .iter()
            .take(DIFFICULTY_WINDOW)
            .filter(|s| **s == crate::profile::TrainingStatus::Completed)
            .count();
        if completed < EASY_BELOW_COMPLETED {
            Self::Easy
        } else {
            Self::Standard
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Self::Easy => "light and simple exercises",
            Self::Standard => "medium or hard exercises",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::TrainingStatus::{Completed, Missed, Pending};

    #[test]
    fn difficulty_threshold() {
        assert_eq!(Difficulty::from_recent(&[]), Difficulty::Easy);
        assert_eq!(
            Difficulty::from_recent(&[Completed, Completed, Missed, Pending, Missed]),
            Difficulty::Easy
        );
        assert_eq!(
            Difficulty::from_recent(&[Completed, Missed, Completed, Pending, Completed]),
            Difficulty::Standard
        );
    }

    #[test]
    fn difficulty_ignores_records_beyond_window() {
        let statuses = [Missed, Missed, Missed, Completed, Completed, Completed, Completed];
        assert_eq!(Difficulty::from_recent(&statuses), Difficulty::Easy);
    }
}
