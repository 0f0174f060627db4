//! Webhook channel: POSTs the notification as JSON.

use std::time::Duration;

use crate::model::Severity;

use super::{Notification, NotificationChannel, SendResult};

pub struct WebhookChannel {
    http: reqwest::blocking::Client,
    url: String,
    min_severity: Severity,
}

impl WebhookChannel {
    pub fn new(url: &str, min_severity: Severity, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url: url.to_string(),
            min_severity,
        })
    }
}

impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    fn min_severity(&self) -> Severity {
        self.min_severity
    }

    fn required(&self) -> bool {
        false
    }

    fn send(&self, notification: &Notification<'_>) -> SendResult {
        match self.http.post(&self.url).json(notification).send() {
            Ok(response) if response.status().is_success() => SendResult::Sent,
            Ok(response) => SendResult::Failed(format!("HTTP error: {}", response.status())),
            Err(e) => SendResult::Failed(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_is_optional_with_configured_floor() {
        let channel = WebhookChannel::new("http://127.0.0.1:9/hook", Severity::Warning, Duration::from_secs(1)).unwrap();
        assert!(!channel.required());
        assert_eq!(channel.min_severity(), Severity::Warning);
        assert_eq!(channel.name(), "webhook");
    }
}
