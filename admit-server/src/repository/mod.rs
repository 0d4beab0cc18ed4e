//! Repository abstraction for admissions storage.
//!
//! The service layer talks only to the `AdmissionsRepository` trait so the
//! business logic is testable without a live database file. The SQLite
//! implementation provides per-user atomic read-modify-write operations;
//! the release path composes a status update with the staged-decision
//! delete in a single transaction.

mod sqlite;

pub use sqlite::SqliteRepository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use admit_core::{ApplicationForm, Decision, Role, Status, UserId};

/// Storage failure.
#[derive(Debug, Clone)]
pub enum RepositoryError {
    /// The underlying store failed during the named operation.
    Storage { operation: String, message: String },
    /// A stored row could not be decoded.
    Corruption { what: String },
    /// A uniqueness constraint was violated (duplicate email).
    Conflict { what: String },
}

impl RepositoryError {
    pub fn storage(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Storage {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn corruption(what: impl Into<String>) -> Self {
        Self::Corruption { what: what.into() }
    }

    pub fn conflict(what: impl Into<String>) -> Self {
        Self::Conflict { what: what.into() }
    }
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage { operation, message } => {
                write!(f, "storage operation '{}' failed: {}", operation, message)
            }
            Self::Corruption { what } => write!(f, "corrupt stored data: {}", what),
            Self::Conflict { what } => write!(f, "uniqueness conflict: {}", what),
        }
    }
}

impl std::error::Error for RepositoryError {}

/// A stored user row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: UserId,
    /// Normalized lowercase, unique.
    pub email: String,
    /// SHA-256 hex of the magic-link token; unique, never the raw token.
    pub credential_hash: String,
    pub role: Role,
    pub status: Status,
    pub application: ApplicationForm,
}

impl UserRecord {
    /// Name to greet the user by in notifications.
    pub fn greeting_name(&self) -> &str {
        self.application
            .preferred_name
            .as_deref()
            .or(self.application.name.as_deref())
            .unwrap_or(&self.email)
    }
}

/// A staged (not yet released) decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagedDecision {
    pub user_id: UserId,
    pub decision: Decision,
}

/// The singleton admissions settings row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub application_open: bool,
    pub confirm_by: Option<DateTime<Utc>>,
    pub info: String,
    pub rolling_admissions: bool,
    /// Body template for decision-release notifications.
    pub acceptance_template: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            application_open: false,
            confirm_by: None,
            info: String::new(),
            rolling_admissions: false,
            acceptance_template: "Your application status has been updated. \
                                  Log in to view your decision."
                .to_string(),
        }
    }
}

/// Result of the per-user release transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Status was updated and the staged row deleted; carries what the
    /// notification needs.
    Applied {
        email: String,
        greeting_name: String,
        new_status: Status,
    },
    /// The user's status had already moved; the staged row was still
    /// deleted, but the status is untouched and no notification is owed.
    StatusMoved,
    /// No staged decision existed for this user (deleted concurrently).
    NoDecision,
}

#[async_trait]
pub trait AdmissionsRepository: Send + Sync {
    // -- users -----------------------------------------------------------

    /// Insert a new user with status CREATED and role HACKER.
    /// Fails with `Conflict` if the email is already registered.
    async fn create_user(
        &self,
        email: &str,
        credential_hash: &str,
    ) -> Result<UserRecord, RepositoryError>;

    /// Replace the user's credential hash (re-registration).
    async fn rotate_credential(
        &self,
        id: UserId,
        credential_hash: &str,
    ) -> Result<(), RepositoryError>;

    async fn user_by_id(&self, id: UserId) -> Result<Option<UserRecord>, RepositoryError>;
    async fn user_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepositoryError>;
    async fn user_by_credential(
        &self,
        credential_hash: &str,
    ) -> Result<Option<UserRecord>, RepositoryError>;

    /// Set the user's role (operator provisioning).
    async fn set_role(&self, id: UserId, role: Role) -> Result<bool, RepositoryError>;

    /// Compare-and-set status update: moves to `to` only if the current
    /// status is one of `expected`, optionally deleting any staged decision
    /// in the same transaction. Returns whether the status row moved.
    async fn update_status(
        &self,
        id: UserId,
        expected: &[Status],
        to: Status,
        discard_staged: bool,
    ) -> Result<bool, RepositoryError>;

    /// Save application data, reset status to `to` if currently one of
    /// `expected`, and delete any staged decision — one transaction.
    /// Returns whether the guard matched (form is only saved when it does).
    async fn save_application(
        &self,
        id: UserId,
        form: &ApplicationForm,
        expected: &[Status],
        to: Status,
    ) -> Result<bool, RepositoryError>;

    // -- staged decisions ------------------------------------------------

    /// Upsert the staged decision for a user (at most one per user).
    async fn stage_decision(&self, id: UserId, decision: Decision) -> Result<(), RepositoryError>;

    /// All staged decisions, or the subset for the given ids.
    async fn staged_decisions(
        &self,
        ids: Option<&[UserId]>,
    ) -> Result<Vec<StagedDecision>, RepositoryError>;

    /// Delete staged decisions unconditionally. Returns how many existed.
    async fn remove_staged(&self, ids: &[UserId]) -> Result<usize, RepositoryError>;

    /// Atomically: update the user's status to the staged decision's status
    /// iff still APPLIED/WAITLISTED, and delete the staged row. Both writes
    /// commit together or not at all.
    async fn release_decision(
        &self,
        id: UserId,
        decision: Decision,
    ) -> Result<ReleaseOutcome, RepositoryError>;

    // -- scan counters ---------------------------------------------------

    /// Atomic per-key increment; returns the new count.
    async fn increment_scan(&self, id: UserId, action: &str) -> Result<u64, RepositoryError>;

    /// All of one user's counters.
    async fn scan_counts(&self, id: UserId) -> Result<BTreeMap<String, u64>, RepositoryError>;

    /// Number of HACKER-role users with a positive count for this action.
    async fn count_scanned(&self, action: &str) -> Result<u64, RepositoryError>;

    // -- settings --------------------------------------------------------

    async fn settings(&self) -> Result<Settings, RepositoryError>;
    async fn update_settings(&self, settings: &Settings) -> Result<(), RepositoryError>;
}
