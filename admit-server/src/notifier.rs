//! Notification delivery boundary.
//!
//! The core hands off structured messages; rendering niceties and retry
//! policy belong to the transport behind this trait. Delivery failures are
//! isolated per recipient and never roll back the state change that
//! triggered the message.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Mutex;
use tracing::info;

/// A rendered-enough message: recipient, greeting, subject, body template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub to: String,
    pub greeting_name: String,
    pub subject: String,
    pub body: String,
}

/// A failed send for one recipient.
#[derive(Debug, Clone)]
pub struct DeliveryError {
    pub message: String,
}

impl DeliveryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for DeliveryError {}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<(), DeliveryError>;
}

// =============================================================================
// HTTP mail API client
// =============================================================================

#[derive(Debug, Serialize)]
struct MailSendRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: String,
}

/// Client for a JSON mail-send API.
#[derive(Clone)]
pub struct MailApiClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    from: String,
}

impl MailApiClient {
    pub fn new(endpoint: String, api_key: String, from: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
            from,
        }
    }
}

#[async_trait]
impl Notifier for MailApiClient {
    async fn send(&self, message: &OutboundMessage) -> Result<(), DeliveryError> {
        let request = MailSendRequest {
            from: &self.from,
            to: &message.to,
            subject: &message.subject,
            text: format!("Hi {},\n\n{}", message.greeting_name, message.body),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| DeliveryError::new(format!("mail API request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::new(format!(
                "mail API returned {}: {}",
                status, body
            )));
        }

        Ok(())
    }
}

// =============================================================================
// Local notifiers
// =============================================================================

/// Logs messages instead of delivering them. Used when no mail transport is
/// configured (local development).
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &OutboundMessage) -> Result<(), DeliveryError> {
        info!(
            "mail transport not configured; would send to {}: {}",
            message.to, message.subject
        );
        Ok(())
    }
}

/// Captures sent messages for assertions; can be told to fail for specific
/// recipients. Used by integration tests.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<OutboundMessage>>,
    fail_for: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages accepted so far, in send order.
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().expect("mutex poisoned").clone()
    }

    /// Make every send to this recipient fail from now on.
    pub fn fail_deliveries_to(&self, email: &str) {
        self.fail_for
            .lock()
            .expect("mutex poisoned")
            .push(email.to_string());
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, message: &OutboundMessage) -> Result<(), DeliveryError> {
        let failing = self
            .fail_for
            .lock()
            .expect("mutex poisoned")
            .iter()
            .any(|email| email == &message.to);
        if failing {
            return Err(DeliveryError::new(format!(
                "simulated delivery failure to {}",
                message.to
            )));
        }
        self.sent
            .lock()
            .expect("mutex poisoned")
            .push(message.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(to: &str) -> OutboundMessage {
        OutboundMessage {
            to: to.to_string(),
            greeting_name: "Ada".to_string(),
            subject: "Hello".to_string(),
            body: "Body".to_string(),
        }
    }

    #[tokio::test]
    async fn test_recording_notifier_captures_sends() {
        let notifier = RecordingNotifier::new();
        notifier.send(&message("a@example.com")).await.unwrap();
        notifier.send(&message("b@example.com")).await.unwrap();

        let sent = notifier.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].to, "a@example.com");
        assert_eq!(sent[1].to, "b@example.com");
    }

    #[tokio::test]
    async fn test_recording_notifier_simulated_failure() {
        let notifier = RecordingNotifier::new();
        notifier.fail_deliveries_to("a@example.com");

        let result = notifier.send(&message("a@example.com")).await;
        assert!(result.is_err());
        assert!(notifier.sent().is_empty());

        notifier.send(&message("b@example.com")).await.unwrap();
        assert_eq!(notifier.sent().len(), 1);
    }
}
