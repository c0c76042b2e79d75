//! Slack webhook notifier with severity-based channel routing.
//!
//! Renders the alert into Slack's block format and posts it to an incoming
//! webhook. Warning alerts go to the general SLA channel; critical,
//! breached, and escalation events go to the critical channel.

use crate::{AlertNotifier, NotifyError};
use async_trait::async_trait;
use sentinel_core::config::NotifierConfig;
use sentinel_core::types::{AlertEventKind, AlertPayload, AlertType};
use tracing::{debug, info, warn};

/// Slack incoming-webhook provider.
pub struct SlackWebhookNotifier {
    config: NotifierConfig,
}

impl SlackWebhookNotifier {
    pub fn new(config: NotifierConfig) -> Self {
        info!(
            channel = %config.channel,
            critical_channel = %config.critical_channel,
            configured = !config.slack_webhook_url.is_empty(),
            "Slack notifier initialized"
        );
        Self { config }
    }

    fn channel_for(&self, payload: &AlertPayload) -> &str {
        match payload.kind {
            AlertEventKind::Sla(AlertType::Warning) => &self.config.channel,
            AlertEventKind::Sla(_) | AlertEventKind::Escalation => &self.config.critical_channel,
        }
    }

    /// Render the Slack message body for an alert or escalation event.
    pub fn render(&self, payload: &AlertPayload) -> serde_json::Value {
        let (emoji, headline) = match payload.kind {
            AlertEventKind::Sla(AlertType::Warning) => (":warning:", "SLA warning"),
            AlertEventKind::Sla(AlertType::Critical) => (":rotating_light:", "SLA critical"),
            AlertEventKind::Sla(AlertType::Breached) => (":red_circle:", "SLA BREACHED"),
            AlertEventKind::Escalation => (":arrow_double_up:", "Ticket escalated"),
        };

        let mut fields = vec![
            format!("*Ticket:* {} ({})", payload.external_id, payload.title),
            format!("*Priority:* {:?}", payload.priority),
            format!("*Tier:* {:?}", payload.customer_tier),
            format!("*Escalation level:* L{}", payload.escalation_level.as_u8()),
        ];
        if let Some(sla_type) = payload.sla_type {
            fields.push(format!("*SLA type:* {sla_type:?}"));
        }
        if let Some(remaining) = payload.remaining_minutes {
            fields.push(format!("*Remaining:* {remaining}m"));
        }

        serde_json::json!({
            "channel": self.channel_for(payload),
            "text": format!("{emoji} {headline}: {}", payload.external_id),
            "blocks": [
                {
                    "type": "section",
                    "text": {
                        "type": "mrkdwn",
                        "text": format!("{emoji} *{headline}*\n{}", fields.join("\n"))
                    }
                }
            ]
        })
    }
}

#[async_trait]
impl AlertNotifier for SlackWebhookNotifier {
    /// Deliver the rendered payload.
    /// In production: POST to the configured incoming-webhook URL.
    async fn deliver(&self, payload: &AlertPayload) -> Result<(), NotifyError> {
        if self.config.slack_webhook_url.is_empty() {
            warn!(
                ticket = %payload.external_id,
                "Slack webhook URL not configured, skipping notification"
            );
            return Err(NotifyError::NotConfigured("slack_webhook_url".to_string()));
        }

        let body = self.render(payload);

        debug!(
            ticket = %payload.external_id,
            kind = ?payload.kind,
            channel = %self.channel_for(payload),
            "Delivering Slack notification"
        );

        metrics::counter!("notify.slack_deliveries").increment(1);

        // Build-and-log stub. In production, HTTP POST `body` to the
        // webhook and map non-2xx responses to NotifyError::Delivery.
        let _ = body;

        Ok(())
    }
}
