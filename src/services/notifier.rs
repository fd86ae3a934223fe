use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

use crate::error::{EngineError, EngineResult};
use crate::models::Notification;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, owner_id: &str, notification: &Notification) -> EngineResult<()>;
}

/// Fire-and-forget delivery: failures are logged, never propagated.
pub async fn deliver(notifier: &dyn Notifier, owner_id: &str, notification: &Notification) -> bool {
    match notifier.notify(owner_id, notification).await {
        Ok(()) => true,
        Err(e) => {
            log::error!("[Notifier] {}: delivery failed: {}", owner_id, e);
            false
        }
    }
}

/// Writes alerts to the log. Used when no webhook is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, owner_id: &str, notification: &Notification) -> EngineResult<()> {
        log::warn!(
            "[Alert] {}: {} - {}",
            owner_id,
            notification.title,
            notification.body
        );
        Ok(())
    }
}

/// POSTs alerts as JSON to a configured URL.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: &str, timeout: Duration) -> EngineResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::Config(format!("webhook client: {}", e)))?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, owner_id: &str, notification: &Notification) -> EngineResult<()> {
        let payload = json!({
            "ownerId": owner_id,
            "title": notification.title,
            "body": notification.body,
            "data": notification.data,
        });
        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| EngineError::Delivery(format!("webhook request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(EngineError::Delivery(format!(
                "webhook error {}: {}",
                status, text
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Broken;

    #[async_trait]
    impl Notifier for Broken {
        async fn notify(&self, _owner_id: &str, _notification: &Notification) -> EngineResult<()> {
            Err(EngineError::Delivery("unreachable".into()))
        }
    }

    fn note() -> Notification {
        Notification {
            title: "Migraine risk HIGH".into(),
            body: "Your migraine risk is now 55%.".into(),
            data: json!({ "riskScore": 55 }),
        }
    }

    #[tokio::test]
    async fn failures_are_swallowed() {
        assert!(!deliver(&Broken, "ana", &note()).await);
        assert!(deliver(&LogNotifier, "ana", &note()).await);
    }

    #[tokio::test]
    async fn webhook_to_closed_port_fails_softly() {
        let webhook =
            WebhookNotifier::new("http://127.0.0.1:9/alerts", Duration::from_secs(2)).unwrap();
        assert!(!deliver(&webhook, "ana", &note()).await);
    }
}
