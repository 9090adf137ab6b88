//! WhatsApp Cloud API
//!
//! Inbound webhook payload parsing and the outbound text sender.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use leadflow_config::WhatsAppConfig;
use leadflow_core::{Error, InboundEvent, MessageSender};

use crate::ServerError;

/// Webhook notification body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookEntry {
    #[serde(default)]
    pub changes: Vec<WebhookChange>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookChange {
    #[serde(default)]
    pub value: ChangeValue,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub metadata: Option<Metadata>,
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub messages: Vec<WebhookMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub phone_number_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Contact {
    #[serde(default)]
    pub wa_id: String,
    #[serde(default)]
    pub profile: Option<Profile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookMessage {
    pub id: String,
    pub from: String,
    /// Unix seconds, sent as a string
    #[serde(default)]
    pub timestamp: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub text: Option<TextBody>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextBody {
    pub body: String,
}

impl WebhookPayload {
    /// Text messages as inbound events.
    ///
    /// Non-text messages and changes addressed to another business number are
    /// skipped. A missing or unparsable timestamp falls back to `received_at`.
    pub fn into_events(self, phone_number_id: &str, received_at: DateTime<Utc>) -> Vec<InboundEvent> {
        let mut events = Vec::new();

        for change in self.entry.into_iter().flat_map(|e| e.changes) {
            let value = change.value;
            if let Some(metadata) = &value.metadata {
                if !phone_number_id.is_empty()
                    && !metadata.phone_number_id.is_empty()
                    && metadata.phone_number_id != phone_number_id
                {
                    continue;
                }
            }

            let names: HashMap<String, String> = value
                .contacts
                .iter()
                .filter_map(|c| {
                    let phone = normalize_phone(&c.wa_id)?;
                    let name = c.profile.as_ref()?.name.trim().to_string();
                    (!name.is_empty()).then_some((phone, name))
                })
                .collect();

            for message in value.messages {
                if message.kind != "text" {
                    tracing::debug!(id = %message.id, kind = %message.kind, "Non-text message skipped");
                    continue;
                }
                let (Some(text), Some(phone)) = (message.text, normalize_phone(&message.from)) else {
                    continue;
                };

                let timestamp = message
                    .timestamp
                    .parse::<i64>()
                    .ok()
                    .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
                    .unwrap_or(received_at);

                let mut event =
                    InboundEvent::new(phone.clone(), text.body, timestamp).with_message_id(message.id);
                if let Some(name) = names.get(&phone) {
                    event = event.with_sender_name(name.clone());
                }
                events.push(event);
            }
        }

        events
    }
}

/// Digits only; `None` when nothing is left
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        None
    } else {
        Some(digits)
    }
}

/// Sends plain text through the Cloud API `/messages` endpoint
pub struct WhatsAppSender {
    client: reqwest::Client,
    endpoint: String,
    access_token: String,
}

impl WhatsAppSender {
    pub fn new(config: &WhatsAppConfig) -> Result<Self, ServerError> {
        if config.phone_number_id.trim().is_empty() {
            return Err(ServerError::Config(
                "whatsapp.phone_number_id is required when WhatsApp is enabled".to_string(),
            ));
        }
        let access_token = match &config.access_token {
            Some(token) if !token.is_empty() => token.clone(),
            _ => {
                return Err(ServerError::Config(
                    "whatsapp.access_token is required when WhatsApp is enabled".to_string(),
                ))
            },
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ServerError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/{}/messages",
                config.api_base.trim_end_matches('/'),
                config.phone_number_id
            ),
            access_token,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn text_payload(to: &str, text: &str) -> serde_json::Value {
    serde_json::json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": to,
        "type": "text",
        "text": {
            "preview_url": false,
            "body": text,
        }
    })
}

#[async_trait]
impl MessageSender for WhatsAppSender {
    async fn send_message(&self, to_phone: &str, text: &str) -> Result<(), Error> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.access_token)
            .json(&text_payload(to_phone, text))
            .send()
            .await
            .map_err(|e| Error::Send(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Send(format!("WhatsApp API {}: {}", status, body)));
        }

        tracing::debug!(to = %to_phone, "WhatsApp message sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &str = r#"{
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "1029384756",
            "changes": [{
                "field": "messages",
                "value": {
                    "messaging_product": "whatsapp",
                    "metadata": { "display_phone_number": "5215500000000", "phone_number_id": "PNID" },
                    "contacts": [{ "profile": { "name": "María López" }, "wa_id": "5215599991234" }],
                    "messages": [
                        {
                            "from": "5215599991234",
                            "id": "wamid.A1",
                            "timestamp": "1772463600",
                            "type": "text",
                            "text": { "body": "Hola, quiero información" }
                        },
                        {
                            "from": "5215599991234",
                            "id": "wamid.A2",
                            "timestamp": "1772463601",
                            "type": "image",
                            "image": { "id": "media-1" }
                        }
                    ]
                }
            }]
        }]
    }"#;

    #[test]
    fn test_parse_text_messages() {
        let payload: WebhookPayload = serde_json::from_str(PAYLOAD).unwrap();
        let events = payload.into_events("PNID", Utc::now());

        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.from_phone, "5215599991234");
        assert_eq!(event.text, "Hola, quiero información");
        assert_eq!(event.message_id.as_deref(), Some("wamid.A1"));
        assert_eq!(event.sender_name.as_deref(), Some("María López"));
        assert_eq!(event.timestamp.timestamp(), 1_772_463_600);
    }

    #[test]
    fn test_other_business_number_skipped() {
        let payload: WebhookPayload = serde_json::from_str(PAYLOAD).unwrap();
        assert!(payload.into_events("OTHER", Utc::now()).is_empty());
    }

    #[test]
    fn test_status_only_payload() {
        let payload: WebhookPayload = serde_json::from_str(
            r#"{"object":"whatsapp_business_account","entry":[{"changes":[{"value":{"statuses":[{"id":"wamid.X","status":"read"}]}}]}]}"#,
        )
        .unwrap();
        assert!(payload.into_events("", Utc::now()).is_empty());
    }

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone("+52 1 55 9999-1234").as_deref(), Some("5215599991234"));
        assert_eq!(normalize_phone("n/a"), None);
    }

    #[test]
    fn test_sender_requires_credentials() {
        let mut config = WhatsAppConfig::default();
        assert!(WhatsAppSender::new(&config).is_err());

        config.phone_number_id = "PNID".into();
        assert!(WhatsAppSender::new(&config).is_err());

        config.access_token = Some("token".into());
        let sender = WhatsAppSender::new(&config).unwrap();
        assert_eq!(sender.endpoint(), "https://graph.facebook.com/v19.0/PNID/messages");
    }
}
