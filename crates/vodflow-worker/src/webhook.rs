//! Best-effort webhook notifications.

use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

/// Webhook target configuration.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Target URL; notifications are disabled when unset
    pub url: String,
    /// Shared secret included in the payload and header
    pub secret: Option<String>,
}

impl WebhookConfig {
    /// Create from environment variables. Returns `None` when no webhook is
    /// configured.
    pub fn from_env() -> Option<Self> {
        let url = std::env::var("WEBHOOK_URL").ok()?;
        if url.is_empty() {
            return None;
        }
        Some(Self {
            url,
            secret: std::env::var("WEBHOOK_SECRET").ok().filter(|s| !s.is_empty()),
        })
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    correlation_id: &'a str,
    hls_master_url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    secret: Option<&'a str>,
}

/// Sends completion notifications to the configured webhook.
/// Failures are logged and never fail the job.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    config: WebhookConfig,
}

impl WebhookNotifier {
    pub fn new(config: WebhookConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client");
        Self { client, config }
    }

    /// Notify the external system that a playable URL exists.
    pub async fn notify(&self, correlation_id: &str, hls_master_url: &str) {
        let payload = WebhookPayload {
            correlation_id,
            hls_master_url,
            secret: self.config.secret.as_deref(),
        };

        let mut request = self.client.post(&self.config.url).json(&payload);
        if let Some(secret) = &self.config.secret {
            request = request.header("X-Webhook-Secret", secret);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                info!(correlation_id, "webhook delivered");
            }
            Ok(response) => {
                warn!(
                    correlation_id,
                    status = %response.status(),
                    "webhook rejected"
                );
            }
            Err(e) => {
                warn!(correlation_id, error = %e, "webhook delivery failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_shape() {
        let payload = WebhookPayload {
            correlation_id: "lesson-42",
            hls_master_url: "/api/upload/hls/p/master.m3u8",
            secret: Some("s3cret"),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["correlation_id"], "lesson-42");
        assert_eq!(json["hls_master_url"], "/api/upload/hls/p/master.m3u8");
        assert_eq!(json["secret"], "s3cret");
    }

    #[test]
    fn secret_is_omitted_when_absent() {
        let payload = WebhookPayload {
            correlation_id: "c",
            hls_master_url: "u",
            secret: None,
        };
        let json = serde_json::to_string(&payload).unwrap();
        assert!(!json.contains("secret"));
    }
}
