//! Operation layer.
//!
//! One `Admissions` service owns the repository and notifier collaborators
//! and exposes the externally callable operations. Role checks and guard
//! reads happen here before any mutation; the legality of each lifecycle
//! move is decided by `admit_core::transition`, and its effects are applied
//! to storage in the same transaction as the status write.

mod account;
mod application;
mod decisions;
mod scans;

pub use account::RegistrationReceipt;
pub use decisions::{DeliveryFailure, ReleaseReport};

use std::sync::Arc;

use chrono::Utc;
use admit_core::{Guards, Role, Status, UserId};

use crate::credentials;
use crate::error::ServiceError;
use crate::notifier::Notifier;
use crate::repository::{AdmissionsRepository, Settings, UserRecord};

/// The resolved caller of an operation.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user: UserRecord,
}

impl Identity {
    pub fn id(&self) -> UserId {
        self.user.id
    }

    pub fn role(&self) -> Role {
        self.user.role
    }

    pub(crate) fn require_admin(&self) -> Result<(), ServiceError> {
        if self.role() == Role::Admin {
            Ok(())
        } else {
            Err(ServiceError::Authorization {
                required: "admin",
                role: self.role(),
            })
        }
    }

    pub(crate) fn require_scanner(&self) -> Result<(), ServiceError> {
        if self.role().can_scan() {
            Ok(())
        } else {
            Err(ServiceError::Authorization {
                required: "organizer or admin",
                role: self.role(),
            })
        }
    }
}

/// The admissions service. Cheap to clone; handlers share one instance.
#[derive(Clone)]
pub struct Admissions {
    pub(crate) repo: Arc<dyn AdmissionsRepository>,
    pub(crate) notifier: Arc<dyn Notifier>,
    /// Public base URL used to build magic links in registration mail.
    pub(crate) base_url: String,
}

impl Admissions {
    pub fn new(
        repo: Arc<dyn AdmissionsRepository>,
        notifier: Arc<dyn Notifier>,
        base_url: String,
    ) -> Self {
        Self {
            repo,
            notifier,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Resolve a presented magic-link token to a caller identity.
    ///
    /// Returns `None` for tokens that hash to no stored credential; the
    /// caller decides whether that is a 401 or an anonymous operation.
    pub async fn authenticate(&self, raw_token: &str) -> Result<Option<Identity>, ServiceError> {
        let hash = credentials::hash_token(raw_token);
        let user = self.repo.user_by_credential(&hash).await?;
        Ok(user.map(|user| Identity { user }))
    }

    /// Current guard context for a transition attempt by `caller_role`.
    pub(crate) async fn guard_context(
        &self,
        caller_role: Role,
    ) -> Result<(Settings, Guards), ServiceError> {
        let settings = self.repo.settings().await?;
        let guards = Guards {
            application_open: settings.application_open,
            confirm_by: settings.confirm_by,
            now: Utc::now(),
            caller_role,
        };
        Ok((settings, guards))
    }

    /// Fetch a user for an admin bulk operation; a missing id is fatal for
    /// the whole operation, unlike guard mismatches which are skipped.
    pub(crate) async fn user_or_not_found(&self, id: UserId) -> Result<UserRecord, ServiceError> {
        self.repo
            .user_by_id(id)
            .await?
            .ok_or(ServiceError::NotFound { what: "user", id })
    }

    /// Self-service view of the caller's own record.
    pub async fn me(&self, identity: &Identity) -> Result<MeView, ServiceError> {
        let user = self.user_or_not_found(identity.id()).await?;
        let scan_counts = self.repo.scan_counts(user.id).await?;
        Ok(MeView {
            id: user.id,
            email: user.email,
            role: user.role,
            status: user.status,
            application: user.application,
            scan_counts,
        })
    }

    /// Read the admissions settings (admin).
    pub async fn settings(&self, identity: &Identity) -> Result<Settings, ServiceError> {
        identity.require_admin()?;
        Ok(self.repo.settings().await?)
    }

    /// Replace the admissions settings (admin).
    pub async fn update_settings(
        &self,
        identity: &Identity,
        settings: &Settings,
    ) -> Result<(), ServiceError> {
        identity.require_admin()?;
        self.repo.update_settings(settings).await?;
        tracing::info!(
            application_open = settings.application_open,
            rolling = settings.rolling_admissions,
            "settings updated"
        );
        Ok(())
    }

    /// Set a user's role (admin; operator provisioning).
    pub async fn set_role(
        &self,
        identity: &Identity,
        target: UserId,
        role: Role,
    ) -> Result<(), ServiceError> {
        identity.require_admin()?;
        self.user_or_not_found(target).await?;
        self.repo.set_role(target, role).await?;
        tracing::info!(user = %target, role = %role, "role changed");
        Ok(())
    }
}

/// What a user sees about themselves.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MeView {
    pub id: UserId,
    pub email: String,
    pub role: Role,
    pub status: Status,
    pub application: admit_core::ApplicationForm,
    pub scan_counts: std::collections::BTreeMap<String, u64>,
}
