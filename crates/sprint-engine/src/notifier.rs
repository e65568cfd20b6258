//! Outbound builder notifications

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sprint_common::AlumniProfile;
use tracing::{info, warn};

/// What a builder is being reminded about
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadSummary {
    pub lead_id: String,
    pub business_name: String,
    pub checkpoints_completed: u32,
    pub total_milestones: u32,
    pub hours_since_update: i64,
    pub sprint_deadline: Option<DateTime<Utc>>,
}

/// Delivers a reminder to a builder. Returns whether delivery succeeded.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, recipient: &AlumniProfile, lead: &LeadSummary) -> bool;
}

/// Notifier that only logs; used when no delivery endpoint is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, recipient: &AlumniProfile, lead: &LeadSummary) -> bool {
        info!(
            "Nudge for {} on lead {} ({}/{} checkpoints, {}h since last update)",
            recipient.id,
            lead.lead_id,
            lead.checkpoints_completed,
            lead.total_milestones,
            lead.hours_since_update
        );
        true
    }
}

/// Payload posted to the notification webhook
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NudgePayload<'a> {
    pub recipient_id: &'a str,
    pub recipient_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_email: Option<&'a str>,
    pub lead: &'a LeadSummary,
}

/// Posts nudges to an HTTP endpoint (e.g. an email relay)
pub struct WebhookNotifier {
    webhook_url: String,
    http_client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self {
            webhook_url: webhook_url.into(),
            http_client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, recipient: &AlumniProfile, lead: &LeadSummary) -> bool {
        let payload = NudgePayload {
            recipient_id: &recipient.id,
            recipient_name: &recipient.name,
            recipient_email: recipient.email.as_deref(),
            lead,
        };

        match self
            .http_client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
        {
            Ok(response) => {
                if response.status().is_success() {
                    info!("Nudge delivered to {} for lead {}", recipient.id, lead.lead_id);
                    true
                } else {
                    warn!(
                        "Nudge webhook returned error status {} for {}",
                        response.status(),
                        recipient.id
                    );
                    false
                }
            }
            Err(e) => {
                warn!("Failed to send nudge to {}: {}", recipient.id, e);
                false
            }
        }
    }
}
