//! Check-in scan counting.

use admit_core::UserId;
use tracing::info;

use crate::error::ServiceError;
use crate::services::{Admissions, Identity};

impl Admissions {
    /// Record one scan of `target` for `action`. Deliberately not
    /// idempotent: every scan increments, re-scans included.
    pub async fn record_scan(
        &self,
        identity: &Identity,
        target: UserId,
        action: &str,
    ) -> Result<u64, ServiceError> {
        identity.require_scanner()?;

        let action = action.trim();
        if action.is_empty() {
            return Err(ServiceError::InvalidInput {
                field: "action",
                message: "scan action must not be empty".to_string(),
            });
        }

        self.user_or_not_found(target).await?;
        let count = self.repo.increment_scan(target, action).await?;
        info!(user = %target, action, count, "scan recorded");
        Ok(count)
    }

    /// Number of HACKER-role users scanned at least once for `action`.
    pub async fn count_scanned(
        &self,
        identity: &Identity,
        action: &str,
    ) -> Result<u64, ServiceError> {
        identity.require_scanner()?;
        Ok(self.repo.count_scanned(action.trim()).await?)
    }
}
