//! Registration and magic-link verification.

use admit_core::{transition, Action, Status, Transition, UserId};
use tracing::{info, warn};

use crate::credentials;
use crate::error::ServiceError;
use crate::notifier::OutboundMessage;
use crate::repository::RepositoryError;
use crate::services::{Admissions, Identity};

/// What `register` produced. The raw token never leaves the notification;
/// the receipt only says whether the login mail went out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationReceipt {
    pub user_id: UserId,
    pub delivered: bool,
}

impl Admissions {
    /// Register an email address, or rotate the credential of an existing
    /// registration. Either way a fresh magic link is mailed.
    ///
    /// The credential rotation commits before the mail is attempted; a
    /// delivery failure is reported in the receipt, never rolled back.
    pub async fn register(&self, email: &str) -> Result<RegistrationReceipt, ServiceError> {
        let email = normalize_email(email)?;

        let raw_token = credentials::mint_token();
        let hash = credentials::hash_token(&raw_token);

        // Create first; a uniqueness conflict means the email is already
        // registered (possibly by a concurrent request that won the insert),
        // and we rotate that row's credential instead.
        let user_id = match self.repo.create_user(&email, &hash).await {
            Ok(user) => {
                info!(user = %user.id, "new registration");
                user.id
            }
            Err(RepositoryError::Conflict { .. }) => {
                let user = self.repo.user_by_email(&email).await?.ok_or_else(|| {
                    ServiceError::Storage(RepositoryError::storage(
                        "register",
                        "registration disappeared during credential rotation",
                    ))
                })?;
                self.repo.rotate_credential(user.id, &hash).await?;
                info!(user = %user.id, "credential rotated for existing registration");
                user.id
            }
            Err(e) => return Err(e.into()),
        };

        let message = OutboundMessage {
            to: email.clone(),
            greeting_name: email.clone(),
            subject: "Your login link".to_string(),
            body: format!(
                "Use this link to log in:\n{}/verify?token={}",
                self.base_url, raw_token
            ),
        };
        let delivered = match self.notifier.send(&message).await {
            Ok(()) => true,
            Err(e) => {
                warn!(user = %user_id, error = %e, "login link delivery failed");
                false
            }
        };

        Ok(RegistrationReceipt { user_id, delivered })
    }

    /// First use of the magic link: CREATED moves to VERIFIED. Any other
    /// status is left untouched.
    pub async fn verify(&self, identity: &Identity) -> Result<Status, ServiceError> {
        let current = identity.user.status;
        let (_settings, guards) = self.guard_context(identity.role()).await?;

        match transition(current, Action::Verify, &guards)? {
            Transition::To { status, .. } => {
                self.repo
                    .update_status(identity.id(), &[current], status, false)
                    .await?;
                info!(user = %identity.id(), "magic link verified");
                Ok(status)
            }
            Transition::Ignored => Ok(current),
        }
    }
}

fn normalize_email(email: &str) -> Result<String, ServiceError> {
    let email = email.trim().to_ascii_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
        }
        None => false,
    };
    if !valid {
        return Err(ServiceError::InvalidInput {
            field: "email",
            message: "not a valid email address".to_string(),
        });
    }
    Ok(email)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(
            normalize_email("  Ada@Example.COM ").unwrap(),
            "ada@example.com"
        );
        assert!(normalize_email("not-an-email").is_err());
        assert!(normalize_email("a@nodot").is_err());
        assert!(normalize_email("@example.com").is_err());
        assert!(normalize_email("a@.com").is_err());
    }
}
