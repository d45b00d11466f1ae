//! Notification side channel. Submissions are announced to reviewers after the
//! write commits; delivery is best-effort and never fails the request.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("webhook rejected notification (status {status}): {message}")]
    Rejected { status: u16, message: String },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub data: BTreeMap<String, String>,
}

impl Notification {
    /// Reviewer alert for a freshly submitted policy.
    pub fn new_submission(policy_id: &str, title: &str, agency: &str) -> Self {
        let mut data = BTreeMap::new();
        data.insert("policyId".to_string(), policy_id.to_string());
        data.insert("type".to_string(), "new_submission".to_string());
        Self {
            title: "Pengajuan Kebijakan Baru".to_string(),
            body: format!("{title} dari {agency} membutuhkan verifikasi"),
            data,
        }
    }
}

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), NotificationError>;
}

/// Posts notifications as JSON to a reviewer webhook.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String, timeout: Duration) -> Result<Self, NotificationError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl NotificationDispatcher for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotificationError> {
        let response = self
            .client
            .post(&self.url)
            .json(notification)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(NotificationError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        debug!(url = %self.url, "notification delivered");
        Ok(())
    }
}

/// Used when no webhook is configured: notifications only reach the log.
pub struct LogNotifier;

#[async_trait]
impl NotificationDispatcher for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotificationError> {
        info!(
            title = %notification.title,
            body = %notification.body,
            "notification (no webhook configured)"
        );
        Ok(())
    }
}

/// Sends `notification` on a detached task. Failures are logged and dropped.
pub fn dispatch(
    notifier: Arc<dyn NotificationDispatcher>,
    notification: Notification,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = notifier.notify(&notification).await {
            warn!(title = %notification.title, error = %e, "failed to send notification");
        }
    })
}
