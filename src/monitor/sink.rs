//! Alert notification sinks

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;

use crate::data::ConjunctionAssessment;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("webhook delivery failed: {0}")]
    Delivery(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Critical,
    High,
}

impl Severity {
    pub fn of(assessment: &ConjunctionAssessment) -> Self {
        if assessment.emergency {
            Severity::Critical
        } else {
            Severity::High
        }
    }
}

/// Receives every alert the monitor fires
#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &str;

    async fn notify(&self, assessment: &ConjunctionAssessment) -> Result<(), SinkError>;
}

/// Writes fired alerts to the log under `orbitwatch::alert`
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, a: &ConjunctionAssessment) -> Result<(), SinkError> {
        log::warn!(
            target: "orbitwatch::alert",
            "Conjunction alert {}: {} vs {} at {}, miss {:.3} km, Pc {:.2e}",
            a.id,
            a.object_a.name.as_deref().unwrap_or(a.object_a.id.as_str()),
            a.object_b.name.as_deref().unwrap_or(a.object_b.id.as_str()),
            a.tca.to_rfc3339(),
            a.miss_distance_km,
            a.probability
        );
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    severity: Severity,
    data: &'a ConjunctionAssessment,
}

/// POSTs a JSON alert document to a fixed URL
#[derive(Debug, Clone)]
pub struct WebhookSink {
    client: Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>) -> Result<Self, SinkError> {
        let client = Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .map_err(|e| SinkError::Client(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn notify(&self, assessment: &ConjunctionAssessment) -> Result<(), SinkError> {
        let payload = WebhookPayload {
            kind: "collision_alert",
            severity: Severity::of(assessment),
            data: assessment,
        };

        self.client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| SinkError::Delivery(e.to_string()))?;
        Ok(())
    }
}
