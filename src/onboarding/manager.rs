//! OnboardingManager: loads a user's draft, applies one answer, persists
//! the result and commits the profile at the end.

use std::sync::Arc;

use crate::error::CoachError;
use crate::profile::Profile;
use crate::store::Database;

use super::state::{Draft, OnboardingStep, StepInput, StepOutcome};

/// How `start` found the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartKind {
    New,
    Returning,
}

/// Result of feeding one answer to the questionnaire.
#[derive(Debug, Clone, PartialEq)]
pub enum OnboardingReply {
    /// Answer accepted; ask this step next.
    Prompt(OnboardingStep),
    /// Answer rejected; state unchanged.
    Rejected {
        message: String,
        step: OnboardingStep,
    },
    /// Profile committed.
    Completed(Profile),
    /// The user has no questionnaire in progress.
    NoDraft,
}

pub struct OnboardingManager {
    db: Arc<dyn Database>,
}

impl OnboardingManager {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Reset the questionnaire to its first step, creating the user record
    /// on first contact.
    pub async fn start(&self, user_id: &str) -> Result<StartKind, CoachError> {
        let created = self.db.ensure_user(user_id).await?;
        self.db.save_draft(user_id, &Draft::new()).await?;

        tracing::info!(user_id = %user_id, new_user = created, "Onboarding started");
        Ok(if created {
            StartKind::New
        } else {
            StartKind::Returning
        })
    }

    /// Discard the draft. Returns `false` when none existed.
    pub async fn cancel(&self, user_id: &str) -> Result<bool, CoachError> {
        let cancelled = self.db.delete_draft(user_id).await?;
        if cancelled {
            tracing::info!(user_id = %user_id, "Onboarding cancelled");
        }
        Ok(cancelled)
    }

    pub async fn is_active(&self, user_id: &str) -> Result<bool, CoachError> {
        Ok(self.db.get_draft(user_id).await?.is_some())
    }

    pub async fn handle(
        &self,
        user_id: &str,
        input: StepInput<'_>,
    ) -> Result<OnboardingReply, CoachError> {
        let Some(mut draft) = self.db.get_draft(user_id).await? else {
            return Ok(OnboardingReply::NoDraft);
        };

        match draft.accept(input) {
            Ok(StepOutcome::Advanced(step)) => {
                self.db.save_draft(user_id, &draft).await?;
                Ok(OnboardingReply::Prompt(step))
            }
            Ok(StepOutcome::Completed(profile)) => {
                self.db.commit_profile(user_id, &profile).await?;
                Ok(OnboardingReply::Completed(profile))
            }
            Err(CoachError::Validation(message)) => {
                tracing::debug!(user_id = %user_id, step = %draft.step, "Answer rejected");
                Ok(OnboardingReply::Rejected {
                    message,
                    step: draft.step,
                })
            }
            Err(e) => Err(e),
        }
    }
}
