//! Core identity and lifecycle types.
//!
//! Statuses form an ordered lifecycle but not a total order: WAITLISTED can
//! move to ACCEPTED or REJECTED via a later decision, and an admin walk-in
//! can force CONFIRMED from any post-verification status.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Newtype for a user's stable storage key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Caller role, resolved by the session collaborator before any operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Hacker,
    Organizer,
    Admin,
}

impl Role {
    /// Stable string form used by the storage layer.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hacker => "hacker",
            Self::Organizer => "organizer",
            Self::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hacker" => Some(Self::Hacker),
            "organizer" => Some(Self::Organizer),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    /// True for roles allowed to operate the check-in scanner.
    pub fn can_scan(&self) -> bool {
        matches!(self, Self::Organizer | Self::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authoritative applicant status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Registered but the magic link has never been used.
    Created,
    /// Logged in at least once; application not yet submitted.
    Verified,
    /// Application submitted and awaiting a decision.
    Applied,
    /// Decision released: admitted.
    Accepted,
    /// Decision released: not admitted (terminal).
    Rejected,
    /// Decision released: waitlisted; a later decision may move this.
    Waitlisted,
    /// Admitted and RSVP'd yes.
    Confirmed,
    /// RSVP'd no (terminal).
    Declined,
}

impl Status {
    /// Stable string form used by the storage layer.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Verified => "verified",
            Self::Applied => "applied",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Waitlisted => "waitlisted",
            Self::Confirmed => "confirmed",
            Self::Declined => "declined",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(Self::Created),
            "verified" => Some(Self::Verified),
            "applied" => Some(Self::Applied),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            "waitlisted" => Some(Self::Waitlisted),
            "confirmed" => Some(Self::Confirmed),
            "declined" => Some(Self::Declined),
            _ => None,
        }
    }

    /// True while an admin decision may still be staged for this user.
    pub fn awaiting_decision(&self) -> bool {
        matches!(self, Self::Applied | Self::Waitlisted)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An admin's chosen outcome for an applicant.
///
/// A staged decision lives separately from the authoritative status until
/// released; this enum is deliberately narrower than `Status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Accepted,
    Rejected,
    Waitlisted,
}

impl Decision {
    /// The status a user lands in when this decision is released.
    pub fn released_status(&self) -> Status {
        match self {
            Self::Accepted => Status::Accepted,
            Self::Rejected => Status::Rejected,
            Self::Waitlisted => Status::Waitlisted,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.released_status().as_str()
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            "waitlisted" => Some(Self::Waitlisted),
            _ => None,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An applicant's answer to a released acceptance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RsvpReply {
    Confirm,
    Decline,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_string_round_trip() {
        for status in [
            Status::Created,
            Status::Verified,
            Status::Applied,
            Status::Accepted,
            Status::Rejected,
            Status::Waitlisted,
            Status::Confirmed,
            Status::Declined,
        ] {
            assert_eq!(Status::parse(status.as_str()), Some(status));
        }
        assert_eq!(Status::parse("unknown"), None);
    }

    #[test]
    fn test_decision_released_status() {
        assert_eq!(Decision::Accepted.released_status(), Status::Accepted);
        assert_eq!(Decision::Rejected.released_status(), Status::Rejected);
        assert_eq!(Decision::Waitlisted.released_status(), Status::Waitlisted);
    }

    #[test]
    fn test_awaiting_decision() {
        assert!(Status::Applied.awaiting_decision());
        assert!(Status::Waitlisted.awaiting_decision());
        assert!(!Status::Accepted.awaiting_decision());
        assert!(!Status::Verified.awaiting_decision());
    }

    #[test]
    fn test_role_can_scan() {
        assert!(!Role::Hacker.can_scan());
        assert!(Role::Organizer.can_scan());
        assert!(Role::Admin.can_scan());
    }
}
