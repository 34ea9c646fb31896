//! WhatsApp adapters — Meta Business Cloud API and Twilio's WhatsApp bridge.
//!
//! The Cloud API needs an access token + phone number ID from Meta Business
//! Suite. Template sends use provider-native placeholders; free-form text is
//! only deliverable inside an open customer-service window, which is the
//! tenant's responsibility.

use async_trait::async_trait;
use sendfleet_core::error::{Result, SendFleetError};
use sendfleet_core::traits::ProviderAdapter;
use sendfleet_core::types::{ChannelKind, ChannelPayload, Recipient, SendOutcome};
use std::collections::HashMap;
use std::time::Duration;

const GRAPH_API: &str = "https://graph.facebook.com/v21.0";

/// WhatsApp Business Cloud API.
#[derive(Debug)]
pub struct MetaWhatsAppAdapter {
    access_token: String,
    phone_number_id: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl MetaWhatsAppAdapter {
    pub fn from_credentials(creds: &HashMap<String, String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            access_token: super::require(creds, "access_token", "meta")?,
            phone_number_id: super::require(creds, "phone_number_id", "meta")?,
            client: reqwest::Client::new(),
            timeout,
        })
    }

    /// Build the Cloud API message body: template when a template id is
    /// present, plain text otherwise.
    pub(crate) fn message_body(
        to: &str,
        message: &str,
        template_id: Option<&str>,
        template_params: &[String],
    ) -> serde_json::Value {
        match template_id {
            Some(template) => serde_json::json!({
                "messaging_product": "whatsapp",
                "recipient_type": "individual",
                "to": to,
                "type": "template",
                "template": {
                    "name": template,
                    "language": { "code": "en" },
                    "components": [{
                        "type": "body",
                        "parameters": template_params.iter()
                            .map(|p| serde_json::json!({"type": "text", "text": p}))
                            .collect::<Vec<_>>(),
                    }],
                }
            }),
            None => serde_json::json!({
                "messaging_product": "whatsapp",
                "recipient_type": "individual",
                "to": to,
                "type": "text",
                "text": { "preview_url": false, "body": message }
            }),
        }
    }
}

#[async_trait]
impl ProviderAdapter for MetaWhatsAppAdapter {
    fn vendor(&self) -> &str {
        "meta"
    }

    fn channel(&self) -> ChannelKind {
        ChannelKind::Whatsapp
    }

    async fn send(&self, recipient: &Recipient, payload: &ChannelPayload) -> Result<SendOutcome> {
        let ChannelPayload::Whatsapp {
            message,
            template_id,
            template_params,
        } = payload
        else {
            return Err(SendFleetError::Adapter(
                "meta adapter given a non-whatsapp payload".into(),
            ));
        };

        let url = format!("{GRAPH_API}/{}/messages", self.phone_number_id);
        let body = Self::message_body(
            recipient.address.trim_start_matches('+'),
            message,
            template_id.as_deref(),
            template_params,
        );

        let response = match self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.access_token))
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return Ok(SendOutcome::rejected(format!("WhatsApp request: {e}"))),
        };

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Ok(SendOutcome::rejected(format!(
                "WhatsApp API error {status}: {text}"
            )));
        }

        let result: serde_json::Value = match response.json().await {
            Ok(v) => v,
            Err(e) => {
                return Ok(SendOutcome::rejected(format!(
                    "Invalid WhatsApp response: {e}"
                )));
            }
        };

        match result["messages"][0]["id"].as_str() {
            Some(id) => {
                tracing::debug!("WhatsApp message sent: {} → {}", id, recipient.address);
                Ok(SendOutcome::accepted(id))
            }
            None => Ok(SendOutcome::rejected("WhatsApp response missing message id")),
        }
    }
}

/// Twilio's WhatsApp channel — same Messages API, `whatsapp:`-prefixed
/// addresses.
#[derive(Debug)]
pub struct TwilioWhatsAppAdapter {
    inner: super::sms::TwilioSmsAdapter,
}

impl TwilioWhatsAppAdapter {
    pub fn from_credentials(creds: &HashMap<String, String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            inner: super::sms::TwilioSmsAdapter::from_credentials(creds, timeout)?,
        })
    }
}

#[async_trait]
impl ProviderAdapter for TwilioWhatsAppAdapter {
    fn vendor(&self) -> &str {
        "twilio"
    }

    fn channel(&self) -> ChannelKind {
        ChannelKind::Whatsapp
    }

    async fn send(&self, recipient: &Recipient, payload: &ChannelPayload) -> Result<SendOutcome> {
        let ChannelPayload::Whatsapp { message, .. } = payload else {
            return Err(SendFleetError::Adapter(
                "twilio whatsapp adapter given a non-whatsapp payload".into(),
            ));
        };
        let mut params = self.inner.form_params(&recipient.address, message);
        params[0].1 = format!("whatsapp:{}", params[0].1);
        params[1].1 = format!("whatsapp:{}", params[1].1);
        self.inner.post_message(&params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_body_when_no_template() {
        let body = MetaWhatsAppAdapter::message_body("84901234567", "Hello!", None, &[]);
        assert_eq!(body["type"], "text");
        assert_eq!(body["text"]["body"], "Hello!");
        assert_eq!(body["to"], "84901234567");
    }

    #[test]
    fn template_body_carries_parameters() {
        let params = vec!["Alice".to_string(), "3pm".to_string()];
        let body = MetaWhatsAppAdapter::message_body(
            "84901234567",
            "ignored for templates",
            Some("appointment_reminder"),
            &params,
        );
        assert_eq!(body["type"], "template");
        assert_eq!(body["template"]["name"], "appointment_reminder");
        let components = body["template"]["components"][0]["parameters"]
            .as_array()
            .unwrap();
        assert_eq!(components.len(), 2);
        assert_eq!(components[0]["text"], "Alice");
        assert_eq!(components[1]["text"], "3pm");
    }

    #[test]
    fn meta_requires_token_and_phone_id() {
        let creds: HashMap<String, String> = [("access_token", "EAAB...")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let err =
            MetaWhatsAppAdapter::from_credentials(&creds, Duration::from_secs(5)).unwrap_err();
        assert!(err.to_string().contains("phone_number_id"));
    }
}
