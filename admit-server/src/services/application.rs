//! Applicant-facing operations: editing, submitting, RSVP.

use admit_core::{
    transition, validate, Action, ApplicationForm, FieldErrors, Status, StatusEffect, Transition,
};
use tracing::info;

use crate::error::ServiceError;
use crate::services::{Admissions, Identity};

impl Admissions {
    /// Save application data. Editing while APPLIED revokes the submission
    /// (status back to VERIFIED) and discards any staged decision; both
    /// happen in one storage transaction with the form write.
    pub async fn edit_application(
        &self,
        identity: &Identity,
        form: &ApplicationForm,
    ) -> Result<Status, ServiceError> {
        let current = identity.user.status;
        let (_settings, guards) = self.guard_context(identity.role()).await?;

        match transition(current, Action::EditApplication, &guards)? {
            Transition::To { status, effects } => {
                debug_assert!(effects.contains(&StatusEffect::DiscardStagedDecision));
                let saved = self
                    .repo
                    .save_application(identity.id(), form, &[current], status)
                    .await?;
                if saved {
                    Ok(status)
                } else {
                    // The status moved between the identity snapshot and the
                    // write; nothing was saved. Report where the user is now.
                    let user = self.user_or_not_found(identity.id()).await?;
                    Ok(user.status)
                }
            }
            // Post-decision statuses cannot edit; leave everything alone.
            Transition::Ignored => Ok(current),
        }
    }

    /// Attempt submission. Returns the validation map; empty means the
    /// status moved to APPLIED. A non-empty map changes nothing.
    pub async fn submit_application(
        &self,
        identity: &Identity,
    ) -> Result<FieldErrors, ServiceError> {
        let current = identity.user.status;
        let (_settings, guards) = self.guard_context(identity.role()).await?;

        let next = match transition(current, Action::SubmitApplication, &guards)? {
            Transition::To { status, .. } => status,
            Transition::Ignored => return Ok(FieldErrors::new()),
        };

        let errors = validate(&identity.user.application);
        if !errors.is_empty() {
            return Ok(errors);
        }

        self.repo
            .update_status(identity.id(), &[current], next, false)
            .await?;
        info!(user = %identity.id(), "application submitted");
        Ok(FieldErrors::new())
    }

    /// Answer a released acceptance.
    pub async fn rsvp(
        &self,
        identity: &Identity,
        reply: admit_core::RsvpReply,
    ) -> Result<Status, ServiceError> {
        let current = identity.user.status;
        let (_settings, guards) = self.guard_context(identity.role()).await?;

        match transition(current, Action::Rsvp(reply), &guards)? {
            Transition::To { status, .. } => {
                self.repo
                    .update_status(identity.id(), &[current], status, false)
                    .await?;
                info!(user = %identity.id(), status = %status, "rsvp recorded");
                Ok(status)
            }
            Transition::Ignored => Ok(current),
        }
    }
}
