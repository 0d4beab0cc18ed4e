//! Pure status transition function.
//!
//! The legality of every lifecycle move is decided in one place: a pure
//! function from `(current status, action, guards)` to a new status plus
//! effects. Effects are data — the service layer executes them against
//! storage only after the status write has committed.
//!
//! Requests that match no row of the table are deliberately ignored rather
//! than failed: bulk admin operations run against client-supplied id lists
//! that may be stale, and a stale entry must not abort the batch. The only
//! loud failures are explicit business rules (window closed, deadline
//! passed, already submitted, role insufficient).

use chrono::{DateTime, Utc};
use std::fmt;

use crate::status::{Decision, Role, RsvpReply, Status};

/// A requested lifecycle move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// First use of the magic link.
    Verify,
    /// Applicant edits application data (revokes a submission, if any).
    EditApplication,
    /// Applicant submits a complete application. The caller must have run
    /// submission validation first; this action only moves the status.
    SubmitApplication,
    /// Applicant answers a released acceptance.
    Rsvp(RsvpReply),
    /// The release pipeline applies a staged decision.
    ReleaseDecision(Decision),
    /// Admin forces attendance without going through release.
    WalkInConfirm,
}

/// Guard context read at the start of the transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Guards {
    /// Whether the application window is open.
    pub application_open: bool,
    /// RSVP deadline; `None` means no deadline.
    pub confirm_by: Option<DateTime<Utc>>,
    /// Wall-clock time of the request.
    pub now: DateTime<Utc>,
    /// Role of the caller making the request.
    pub caller_role: Role,
}

/// Storage-side cleanup a successful transition requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEffect {
    /// Delete any staged decision for this user. Emitted when application
    /// data is edited after staging and on walk-in confirmation.
    DiscardStagedDecision,
}

/// Outcome of a legal transition request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The status moves (possibly to its current value, for edits while
    /// VERIFIED) and the listed effects must be applied with it.
    To {
        status: Status,
        effects: Vec<StatusEffect>,
    },
    /// The request matched no row of the table; state must not change.
    Ignored,
}

impl Transition {
    fn to(status: Status) -> Self {
        Self::To {
            status,
            effects: Vec::new(),
        }
    }

    fn to_with(status: Status, effects: Vec<StatusEffect>) -> Self {
        Self::To { status, effects }
    }
}

/// Explicit business-rule rejections. Everything else illegal is `Ignored`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// The application window is closed.
    ApplicationsClosed,
    /// The application was already submitted.
    AlreadySubmitted,
    /// The RSVP confirmation deadline has passed.
    ConfirmDeadlinePassed,
    /// The caller's role is insufficient for this action.
    NotAdmin { role: Role },
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApplicationsClosed => write!(f, "applications are closed"),
            Self::AlreadySubmitted => write!(f, "application already submitted"),
            Self::ConfirmDeadlinePassed => write!(f, "confirmation deadline has passed"),
            Self::NotAdmin { role } => write!(f, "requires admin role, caller is {}", role),
        }
    }
}

impl std::error::Error for TransitionError {}

/// Pure transition function implementing the lifecycle table.
///
/// Returns the new status and effects, `Transition::Ignored` for requests
/// outside the table, or a `TransitionError` for explicit business rules.
pub fn transition(
    current: Status,
    action: Action,
    guards: &Guards,
) -> Result<Transition, TransitionError> {
    match (current, action) {
        // First magic-link use.
        (Status::Created, Action::Verify) => Ok(Transition::to(Status::Verified)),

        // Editing always lands on VERIFIED: a submission is revoked and any
        // staged decision is discarded with it.
        (Status::Verified | Status::Applied, Action::EditApplication) => {
            if !guards.application_open {
                return Err(TransitionError::ApplicationsClosed);
            }
            Ok(Transition::to_with(
                Status::Verified,
                vec![StatusEffect::DiscardStagedDecision],
            ))
        }

        (Status::Verified, Action::SubmitApplication) => {
            if !guards.application_open {
                return Err(TransitionError::ApplicationsClosed);
            }
            Ok(Transition::to(Status::Applied))
        }

        // Re-submitting is the one illegal move the applicant is told about.
        (Status::Applied, Action::SubmitApplication) => Err(TransitionError::AlreadySubmitted),

        // Release only lands while the user still awaits a decision; the
        // pipeline re-checks this inside the storage transaction.
        (Status::Applied | Status::Waitlisted, Action::ReleaseDecision(decision)) => {
            Ok(Transition::to(decision.released_status()))
        }

        (Status::Accepted, Action::Rsvp(RsvpReply::Confirm)) => {
            if let Some(deadline) = guards.confirm_by {
                if guards.now >= deadline {
                    return Err(TransitionError::ConfirmDeadlinePassed);
                }
            }
            Ok(Transition::to(Status::Confirmed))
        }

        // Declining is never deadline-checked.
        (Status::Accepted | Status::Confirmed, Action::Rsvp(RsvpReply::Decline)) => {
            Ok(Transition::to(Status::Declined))
        }

        // Walk-in confirmation: admin override for anyone past verification,
        // bypassing release (and its notification).
        (Status::Created | Status::Verified, Action::WalkInConfirm) => Ok(Transition::Ignored),
        (_, Action::WalkInConfirm) => {
            if guards.caller_role != Role::Admin {
                return Err(TransitionError::NotAdmin {
                    role: guards.caller_role,
                });
            }
            Ok(Transition::to_with(
                Status::Confirmed,
                vec![StatusEffect::DiscardStagedDecision],
            ))
        }

        // Everything else is deliberately ignored.
        _ => Ok(Transition::Ignored),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn open_guards() -> Guards {
        Guards {
            application_open: true,
            confirm_by: None,
            now: Utc.with_ymd_and_hms(2026, 1, 10, 12, 0, 0).unwrap(),
            caller_role: Role::Hacker,
        }
    }

    fn admin_guards() -> Guards {
        Guards {
            caller_role: Role::Admin,
            ..open_guards()
        }
    }

    #[test]
    fn test_verify_moves_created_to_verified() {
        let result = transition(Status::Created, Action::Verify, &open_guards()).unwrap();
        assert_eq!(result, Transition::to(Status::Verified));
    }

    #[test]
    fn test_verify_is_noop_elsewhere() {
        for status in [Status::Verified, Status::Applied, Status::Accepted] {
            let result = transition(status, Action::Verify, &open_guards()).unwrap();
            assert_eq!(result, Transition::Ignored);
        }
    }

    #[test]
    fn test_edit_resets_applied_to_verified_and_discards_decision() {
        let result = transition(Status::Applied, Action::EditApplication, &open_guards()).unwrap();
        assert_eq!(
            result,
            Transition::To {
                status: Status::Verified,
                effects: vec![StatusEffect::DiscardStagedDecision],
            }
        );
    }

    #[test]
    fn test_edit_is_idempotent_on_verified() {
        let result = transition(Status::Verified, Action::EditApplication, &open_guards()).unwrap();
        assert!(matches!(
            result,
            Transition::To {
                status: Status::Verified,
                ..
            }
        ));
    }

    #[test]
    fn test_edit_rejected_when_window_closed() {
        let guards = Guards {
            application_open: false,
            ..open_guards()
        };
        let result = transition(Status::Verified, Action::EditApplication, &guards);
        assert_eq!(result, Err(TransitionError::ApplicationsClosed));
    }

    #[test]
    fn test_submit_moves_verified_to_applied() {
        let result =
            transition(Status::Verified, Action::SubmitApplication, &open_guards()).unwrap();
        assert_eq!(result, Transition::to(Status::Applied));
    }

    #[test]
    fn test_submit_twice_is_a_business_error() {
        let result = transition(Status::Applied, Action::SubmitApplication, &open_guards());
        assert_eq!(result, Err(TransitionError::AlreadySubmitted));
    }

    #[test]
    fn test_submit_rejected_when_window_closed() {
        let guards = Guards {
            application_open: false,
            ..open_guards()
        };
        let result = transition(Status::Verified, Action::SubmitApplication, &guards);
        assert_eq!(result, Err(TransitionError::ApplicationsClosed));
    }

    #[test]
    fn test_release_lands_on_decision_status() {
        for (decision, expected) in [
            (Decision::Accepted, Status::Accepted),
            (Decision::Rejected, Status::Rejected),
            (Decision::Waitlisted, Status::Waitlisted),
        ] {
            let result = transition(
                Status::Applied,
                Action::ReleaseDecision(decision),
                &open_guards(),
            )
            .unwrap();
            assert_eq!(result, Transition::to(expected));
        }
    }

    #[test]
    fn test_release_moves_waitlisted_user() {
        let result = transition(
            Status::Waitlisted,
            Action::ReleaseDecision(Decision::Accepted),
            &open_guards(),
        )
        .unwrap();
        assert_eq!(result, Transition::to(Status::Accepted));
    }

    #[test]
    fn test_release_ignored_when_status_already_moved() {
        // Guards against the race where the user declined between staging
        // and release.
        let result = transition(
            Status::Declined,
            Action::ReleaseDecision(Decision::Accepted),
            &open_guards(),
        )
        .unwrap();
        assert_eq!(result, Transition::Ignored);
    }

    #[test]
    fn test_rsvp_confirm_before_deadline() {
        let guards = Guards {
            confirm_by: Some(Utc.with_ymd_and_hms(2026, 1, 20, 0, 0, 0).unwrap()),
            ..open_guards()
        };
        let result = transition(Status::Accepted, Action::Rsvp(RsvpReply::Confirm), &guards);
        assert_eq!(result, Ok(Transition::to(Status::Confirmed)));
    }

    #[test]
    fn test_rsvp_confirm_after_deadline_blocked() {
        let guards = Guards {
            confirm_by: Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()),
            ..open_guards()
        };
        let result = transition(Status::Accepted, Action::Rsvp(RsvpReply::Confirm), &guards);
        assert_eq!(result, Err(TransitionError::ConfirmDeadlinePassed));
    }

    #[test]
    fn test_rsvp_decline_ignores_deadline() {
        let guards = Guards {
            confirm_by: Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()),
            ..open_guards()
        };
        let result = transition(Status::Accepted, Action::Rsvp(RsvpReply::Decline), &guards);
        assert_eq!(result, Ok(Transition::to(Status::Declined)));

        // Confirmed users can still back out.
        let result = transition(Status::Confirmed, Action::Rsvp(RsvpReply::Decline), &guards);
        assert_eq!(result, Ok(Transition::to(Status::Declined)));
    }

    #[test]
    fn test_rsvp_confirm_without_deadline() {
        let result = transition(
            Status::Accepted,
            Action::Rsvp(RsvpReply::Confirm),
            &open_guards(),
        );
        assert_eq!(result, Ok(Transition::to(Status::Confirmed)));
    }

    #[test]
    fn test_walk_in_confirms_and_discards_decision() {
        for status in [
            Status::Applied,
            Status::Accepted,
            Status::Waitlisted,
            Status::Rejected,
            Status::Declined,
        ] {
            let result = transition(status, Action::WalkInConfirm, &admin_guards()).unwrap();
            assert_eq!(
                result,
                Transition::To {
                    status: Status::Confirmed,
                    effects: vec![StatusEffect::DiscardStagedDecision],
                },
                "walk-in from {} should force CONFIRMED",
                status
            );
        }
    }

    #[test]
    fn test_walk_in_skips_unverified_users() {
        for status in [Status::Created, Status::Verified] {
            let result = transition(status, Action::WalkInConfirm, &admin_guards()).unwrap();
            assert_eq!(result, Transition::Ignored);
        }
    }

    #[test]
    fn test_walk_in_requires_admin() {
        for role in [Role::Hacker, Role::Organizer] {
            let guards = Guards {
                caller_role: role,
                ..open_guards()
            };
            let result = transition(Status::Applied, Action::WalkInConfirm, &guards);
            assert_eq!(result, Err(TransitionError::NotAdmin { role }));
        }
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    const ALL_STATUSES: [Status; 8] = [
        Status::Created,
        Status::Verified,
        Status::Applied,
        Status::Accepted,
        Status::Rejected,
        Status::Waitlisted,
        Status::Confirmed,
        Status::Declined,
    ];

    fn arb_status() -> impl Strategy<Value = Status> {
        proptest::sample::select(ALL_STATUSES.as_slice())
    }

    fn arb_decision() -> impl Strategy<Value = Decision> {
        prop_oneof![
            Just(Decision::Accepted),
            Just(Decision::Rejected),
            Just(Decision::Waitlisted),
        ]
    }

    fn arb_action() -> impl Strategy<Value = Action> {
        prop_oneof![
            Just(Action::Verify),
            Just(Action::EditApplication),
            Just(Action::SubmitApplication),
            Just(Action::Rsvp(RsvpReply::Confirm)),
            Just(Action::Rsvp(RsvpReply::Decline)),
            arb_decision().prop_map(Action::ReleaseDecision),
            Just(Action::WalkInConfirm),
        ]
    }

    fn arb_guards() -> impl Strategy<Value = Guards> {
        (
            proptest::bool::ANY,
            proptest::option::of(0i64..4_000_000),
            0i64..4_000_000,
            prop_oneof![Just(Role::Hacker), Just(Role::Organizer), Just(Role::Admin)],
        )
            .prop_map(|(application_open, confirm_by, now, caller_role)| Guards {
                application_open,
                confirm_by: confirm_by.map(|s| Utc.timestamp_opt(s, 0).unwrap()),
                now: Utc.timestamp_opt(now, 0).unwrap(),
                caller_role,
            })
    }

    /// Whether the (status, action) pair appears in the lifecycle table at
    /// all, independent of guards. Pairs outside the table must always be
    /// ignored, whatever the guard context.
    fn in_table(status: Status, action: Action) -> bool {
        matches!(
            (status, action),
            (Status::Created, Action::Verify)
                | (Status::Verified | Status::Applied, Action::EditApplication)
                | (Status::Verified | Status::Applied, Action::SubmitApplication)
                | (
                    Status::Applied | Status::Waitlisted,
                    Action::ReleaseDecision(_)
                )
                | (Status::Accepted, Action::Rsvp(RsvpReply::Confirm))
                | (Status::Accepted | Status::Confirmed, Action::Rsvp(RsvpReply::Decline))
        ) || (matches!(action, Action::WalkInConfirm)
            && !matches!(status, Status::Created | Status::Verified))
    }

    proptest! {
        #[test]
        fn pairs_outside_the_table_never_change_state(
            status in arb_status(),
            action in arb_action(),
            guards in arb_guards(),
        ) {
            prop_assume!(!in_table(status, action));
            let result = transition(status, action, &guards);
            prop_assert_eq!(result, Ok(Transition::Ignored));
        }

        #[test]
        fn transitions_never_land_on_created(
            status in arb_status(),
            action in arb_action(),
            guards in arb_guards(),
        ) {
            if let Ok(Transition::To { status: next, .. }) = transition(status, action, &guards) {
                prop_assert_ne!(next, Status::Created);
            }
        }

        #[test]
        fn decline_always_succeeds_for_accepted_and_confirmed(
            status in proptest::sample::select(&[Status::Accepted, Status::Confirmed]),
            guards in arb_guards(),
        ) {
            let result = transition(status, Action::Rsvp(RsvpReply::Decline), &guards);
            prop_assert_eq!(result, Ok(Transition::To {
                status: Status::Declined,
                effects: vec![],
            }));
        }
    }
}
