//! n8n notification sink
//!
//! Lifecycle events are pushed to the configured webhook URL. Delivery is
//! best-effort: `notify` returns a bool, logs failures, and never
//! propagates an error. Callers dispatch it with `tokio::spawn` so it
//! stays off the response path.

use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use crate::logging::{log_error, log_webhook};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WebhookEvent {
    PersonaCreated,
    PersonaEnriched,
    QueryCompleted,
}

impl WebhookEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookEvent::PersonaCreated => "persona_created",
            WebhookEvent::PersonaEnriched => "persona_enriched",
            WebhookEvent::QueryCompleted => "query_completed",
        }
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload {
    event: String,
    timestamp: String,
    data: WebhookData,
    source: String,
    version: String,
}

#[derive(Debug, Serialize)]
struct WebhookData {
    #[serde(rename = "personaId")]
    persona_id: String,
    #[serde(rename = "projectId", skip_serializing_if = "Option::is_none")]
    project_id: Option<String>,
    #[serde(rename = "clientId", skip_serializing_if = "Option::is_none")]
    client_id: Option<String>,
    metadata: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct WebhookClient {
    client: Client,
    url: Option<String>,
}

impl WebhookClient {
    pub fn new(url: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        WebhookClient { client, url }
    }

    /// Send a lifecycle event. Returns whether delivery succeeded; failure
    /// is logged and swallowed.
    pub async fn notify(
        &self,
        event: WebhookEvent,
        persona_id: &str,
        project_id: Option<&str>,
        metadata: serde_json::Value,
    ) -> bool {
        let url = match &self.url {
            Some(url) => url,
            None => {
                log_webhook(
                    Some(persona_id),
                    &format!("Skipping {} notification, sink not configured", event.as_str()),
                );
                return false;
            }
        };

        let payload = WebhookPayload {
            event: event.as_str().to_string(),
            timestamp: Utc::now().to_rfc3339(),
            data: WebhookData {
                persona_id: persona_id.to_string(),
                project_id: project_id.map(String::from),
                client_id: None,
                metadata,
            },
            source: "quarterback".to_string(),
            version: "1.0".to_string(),
        };

        match self
            .client
            .post(url)
            .header("User-Agent", "Quarterback-Platform/1.0")
            .json(&payload)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                log_webhook(
                    Some(persona_id),
                    &format!("Delivered {} notification", event.as_str()),
                );
                true
            }
            Ok(response) => {
                log_error(
                    Some(persona_id),
                    &format!(
                        "Webhook {} delivery failed with status {}",
                        event.as_str(),
                        response.status()
                    ),
                );
                false
            }
            Err(e) => {
                log_error(
                    Some(persona_id),
                    &format!("Webhook {} delivery failed: {}", event.as_str(), e),
                );
                false
            }
        }
    }

    /// Send a test payload to verify the sink is reachable
    pub async fn test_webhook(&self) -> (bool, String) {
        if self.url.is_none() {
            return (false, "Webhook URL not configured".to_string());
        }

        let delivered = self
            .notify(
                WebhookEvent::QueryCompleted,
                "test-persona",
                None,
                serde_json::json!({ "test": true }),
            )
            .await;

        if delivered {
            (true, "Test webhook delivered".to_string())
        } else {
            (false, "Test webhook delivery failed".to_string())
        }
    }
}
