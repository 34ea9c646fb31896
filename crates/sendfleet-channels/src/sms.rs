//! SMS adapters — Twilio Messages API and the Vonage (Nexmo) SMS API.

use async_trait::async_trait;
use sendfleet_core::error::{Result, SendFleetError};
use sendfleet_core::traits::ProviderAdapter;
use sendfleet_core::types::{ChannelKind, ChannelPayload, Recipient, SendOutcome};
use std::collections::HashMap;
use std::time::Duration;

/// Twilio Programmable Messaging.
#[derive(Debug)]
pub struct TwilioSmsAdapter {
    account_sid: String,
    auth_token: String,
    from_number: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl TwilioSmsAdapter {
    pub fn from_credentials(creds: &HashMap<String, String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            account_sid: super::require(creds, "account_sid", "twilio")?,
            auth_token: super::require(creds, "auth_token", "twilio")?,
            from_number: super::require(creds, "from_number", "twilio")?,
            client: reqwest::Client::new(),
            timeout,
        })
    }

    pub(crate) fn form_params(&self, to: &str, body: &str) -> Vec<(&'static str, String)> {
        vec![
            ("To", super::e164(to)),
            ("From", super::e164(&self.from_number)),
            ("Body", body.to_string()),
        ]
    }

    pub(crate) async fn post_message(
        &self,
        params: &[(&'static str, String)],
    ) -> Result<SendOutcome> {
        let url = format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            self.account_sid
        );

        let response = match self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(params)
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return Ok(SendOutcome::rejected(format!("Twilio request: {e}"))),
        };

        let status = response.status();
        let result: serde_json::Value = match response.json().await {
            Ok(v) => v,
            Err(e) => return Ok(SendOutcome::rejected(format!("Invalid Twilio response: {e}"))),
        };

        if !status.is_success() {
            let message = result["message"].as_str().unwrap_or("unknown error");
            return Ok(SendOutcome::rejected(format!(
                "Twilio API error {status}: {message}"
            )));
        }

        match result["sid"].as_str() {
            Some(sid) => Ok(SendOutcome::accepted(sid)),
            None => Ok(SendOutcome::rejected("Twilio response missing sid")),
        }
    }
}

#[async_trait]
impl ProviderAdapter for TwilioSmsAdapter {
    fn vendor(&self) -> &str {
        "twilio"
    }

    fn channel(&self) -> ChannelKind {
        ChannelKind::Sms
    }

    async fn send(&self, recipient: &Recipient, payload: &ChannelPayload) -> Result<SendOutcome> {
        let ChannelPayload::Sms { message, .. } = payload else {
            return Err(SendFleetError::Adapter(
                "twilio sms adapter given a non-sms payload".into(),
            ));
        };
        let params = self.form_params(&recipient.address, message);
        self.post_message(&params).await
    }
}

/// Vonage (Nexmo) SMS API.
#[derive(Debug)]
pub struct VonageSmsAdapter {
    api_key: String,
    api_secret: String,
    from: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl VonageSmsAdapter {
    pub fn from_credentials(creds: &HashMap<String, String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            api_key: super::require(creds, "api_key", "vonage")?,
            api_secret: super::require(creds, "api_secret", "vonage")?,
            from: super::require(creds, "from", "vonage")?,
            client: reqwest::Client::new(),
            timeout,
        })
    }
}

#[async_trait]
impl ProviderAdapter for VonageSmsAdapter {
    fn vendor(&self) -> &str {
        "vonage"
    }

    fn channel(&self) -> ChannelKind {
        ChannelKind::Sms
    }

    async fn send(&self, recipient: &Recipient, payload: &ChannelPayload) -> Result<SendOutcome> {
        let ChannelPayload::Sms { message, .. } = payload else {
            return Err(SendFleetError::Adapter(
                "vonage adapter given a non-sms payload".into(),
            ));
        };

        let request = serde_json::json!({
            "api_key": self.api_key,
            "api_secret": self.api_secret,
            "from": self.from,
            "to": recipient.address.trim_start_matches('+'),
            "text": message,
        });

        let response = match self
            .client
            .post("https://rest.nexmo.com/sms/json")
            .json(&request)
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return Ok(SendOutcome::rejected(format!("Vonage request: {e}"))),
        };

        let result: serde_json::Value = match response.json().await {
            Ok(v) => v,
            Err(e) => return Ok(SendOutcome::rejected(format!("Invalid Vonage response: {e}"))),
        };

        // Vonage reports per-part status; "0" is success.
        let first = &result["messages"][0];
        match first["status"].as_str() {
            Some("0") => match first["message-id"].as_str() {
                Some(id) => Ok(SendOutcome::accepted(id)),
                None => Ok(SendOutcome::rejected("Vonage response missing message-id")),
            },
            Some(code) => {
                let text = first["error-text"].as_str().unwrap_or("unknown error");
                Ok(SendOutcome::rejected(format!(
                    "Vonage status {code}: {text}"
                )))
            }
            None => Ok(SendOutcome::rejected("Vonage response missing status")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn twilio() -> TwilioSmsAdapter {
        let creds: HashMap<String, String> = [
            ("account_sid", "AC123"),
            ("auth_token", "tok"),
            ("from_number", "15550001111"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        TwilioSmsAdapter::from_credentials(&creds, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn twilio_form_params_are_e164() {
        let params = twilio().form_params("15559992222", "Your order shipped");
        assert_eq!(params[0], ("To", "+15559992222".to_string()));
        assert_eq!(params[1], ("From", "+15550001111".to_string()));
        assert_eq!(params[2].1, "Your order shipped");
    }

    #[tokio::test]
    async fn twilio_rejects_wrong_payload_kind() {
        let recipient = Recipient {
            address: "15559992222".into(),
            display_name: String::new(),
            custom_fields: HashMap::new(),
        };
        let err = twilio()
            .send(
                &recipient,
                &ChannelPayload::Email {
                    subject: "s".into(),
                    body: "b".into(),
                    from_name: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SendFleetError::Adapter(_)));
    }

    #[test]
    fn vonage_requires_all_three_keys() {
        let creds: HashMap<String, String> =
            [("api_key", "k"), ("api_secret", "s")]
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
        let err = VonageSmsAdapter::from_credentials(&creds, Duration::from_secs(5)).unwrap_err();
        assert!(err.to_string().contains("'from'"));
    }
}
