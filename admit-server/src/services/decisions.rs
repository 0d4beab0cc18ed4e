//! Admin decision staging, release, and walk-in confirmation.
//!
//! Release processes each staged decision as an independent unit of work:
//! the status update and staged-row delete commit in one storage
//! transaction, and only then is the notification attempted. Units are
//! dispatched concurrently across users; within one unit, commit strictly
//! precedes notify.

use admit_core::{transition, Action, Decision, Status, Transition, UserId};
use futures_util::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::ServiceError;
use crate::notifier::OutboundMessage;
use crate::repository::{ReleaseOutcome, Settings, StagedDecision};
use crate::services::{Admissions, Identity};

/// One recipient the release pipeline could not notify. The status change
/// behind it is already durable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryFailure {
    pub user_id: UserId,
    pub email: String,
    pub message: String,
}

/// Result summary of a release run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReleaseReport {
    /// Users whose status moved and staged row was deleted.
    pub released: Vec<UserId>,
    /// Users whose status had already moved; staged row deleted, nothing
    /// else changed, no notification owed.
    pub skipped: Vec<UserId>,
    /// Committed releases whose notification could not be delivered.
    pub delivery_failures: Vec<DeliveryFailure>,
    /// Units that failed at the storage layer before committing.
    pub errors: Vec<(UserId, String)>,
}

enum UnitOutcome {
    Released { user_id: UserId, delivery: Option<DeliveryFailure> },
    Skipped(UserId),
    Gone(UserId),
    Failed(UserId, String),
}

impl Admissions {
    /// Stage a decision for each listed user. Users not currently awaiting
    /// a decision are silently skipped; a missing user aborts the whole
    /// operation. Returns the ids actually staged.
    pub async fn stage_decisions(
        &self,
        identity: &Identity,
        ids: &[UserId],
        decision: Decision,
    ) -> Result<Vec<UserId>, ServiceError> {
        identity.require_admin()?;

        let mut staged = Vec::new();
        for &id in ids {
            let user = self.user_or_not_found(id).await?;
            if !user.status.awaiting_decision() {
                continue;
            }
            self.repo.stage_decision(id, decision).await?;
            staged.push(id);
        }
        info!(
            staged = staged.len(),
            decision = %decision,
            "decisions staged"
        );
        Ok(staged)
    }

    /// Delete staged decisions unconditionally. Returns how many existed.
    pub async fn remove_staged_decisions(
        &self,
        identity: &Identity,
        ids: &[UserId],
    ) -> Result<usize, ServiceError> {
        identity.require_admin()?;
        Ok(self.repo.remove_staged(ids).await?)
    }

    /// List staged decisions, optionally restricted to the given ids.
    pub async fn staged_decisions(
        &self,
        identity: &Identity,
        ids: Option<&[UserId]>,
    ) -> Result<Vec<StagedDecision>, ServiceError> {
        identity.require_admin()?;
        Ok(self.repo.staged_decisions(ids).await?)
    }

    /// Release staged decisions: all of them, or the subset matching `ids`.
    /// Ids without a staged decision are simply not part of the run.
    pub async fn release_decisions(
        &self,
        identity: &Identity,
        ids: Option<&[UserId]>,
    ) -> Result<ReleaseReport, ServiceError> {
        identity.require_admin()?;

        let settings = self.repo.settings().await?;
        let staged = self.repo.staged_decisions(ids).await?;

        let units = staged
            .into_iter()
            .map(|record| self.release_one(record, &settings));
        let outcomes = join_all(units).await;

        let mut report = ReleaseReport::default();
        for outcome in outcomes {
            match outcome {
                UnitOutcome::Released { user_id, delivery } => {
                    report.released.push(user_id);
                    if let Some(failure) = delivery {
                        report.delivery_failures.push(failure);
                    }
                }
                UnitOutcome::Skipped(id) => report.skipped.push(id),
                // Deleted concurrently between listing and releasing.
                UnitOutcome::Gone(_) => {}
                UnitOutcome::Failed(id, message) => report.errors.push((id, message)),
            }
        }

        info!(
            released = report.released.len(),
            skipped = report.skipped.len(),
            delivery_failures = report.delivery_failures.len(),
            "release run finished"
        );
        Ok(report)
    }

    async fn release_one(&self, record: StagedDecision, settings: &Settings) -> UnitOutcome {
        let StagedDecision { user_id, decision } = record;

        let outcome = match self.repo.release_decision(user_id, decision).await {
            Ok(outcome) => outcome,
            Err(e) => return UnitOutcome::Failed(user_id, e.to_string()),
        };

        match outcome {
            ReleaseOutcome::Applied {
                email,
                greeting_name,
                new_status,
            } => {
                info!(user = %user_id, status = %new_status, "decision released");
                let message = OutboundMessage {
                    to: email.clone(),
                    greeting_name,
                    subject: "Your application status".to_string(),
                    body: settings.acceptance_template.clone(),
                };
                let delivery = match self.notifier.send(&message).await {
                    Ok(()) => None,
                    Err(e) => {
                        warn!(user = %user_id, error = %e, "release notification failed");
                        Some(DeliveryFailure {
                            user_id,
                            email,
                            message: e.to_string(),
                        })
                    }
                };
                UnitOutcome::Released { user_id, delivery }
            }
            ReleaseOutcome::StatusMoved => UnitOutcome::Skipped(user_id),
            ReleaseOutcome::NoDecision => UnitOutcome::Gone(user_id),
        }
    }

    /// Force attendance for walk-ins: discard any staged decision and set
    /// status to CONFIRMED, bypassing release and its notification.
    /// CREATED/VERIFIED users are skipped. Returns the ids confirmed.
    pub async fn confirm_walk_ins(
        &self,
        identity: &Identity,
        ids: &[UserId],
    ) -> Result<Vec<UserId>, ServiceError> {
        identity.require_admin()?;
        let (_settings, guards) = self.guard_context(identity.role()).await?;

        let mut confirmed = Vec::new();
        for &id in ids {
            let user = self.user_or_not_found(id).await?;
            match transition(user.status, Action::WalkInConfirm, &guards)? {
                Transition::To { status, .. } => {
                    debug_assert_eq!(status, Status::Confirmed);
                    let moved = self
                        .repo
                        .update_status(id, &[user.status], status, true)
                        .await?;
                    if moved {
                        confirmed.push(id);
                    }
                }
                Transition::Ignored => {}
            }
        }
        info!(confirmed = confirmed.len(), "walk-ins confirmed");
        Ok(confirmed)
    }
}
