//! Email adapters — SMTP relay (async lettre) and the Resend HTTP API.

use async_trait::async_trait;
use sendfleet_core::error::{Result, SendFleetError};
use sendfleet_core::traits::ProviderAdapter;
use sendfleet_core::types::{ChannelKind, ChannelPayload, Recipient, SendOutcome};
use std::collections::HashMap;
use std::time::Duration;

/// SMTP relay configuration.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_email: String,
    pub from_name: Option<String>,
}

/// Sends via an authenticated STARTTLS SMTP relay.
#[derive(Debug)]
pub struct SmtpEmailAdapter {
    config: SmtpConfig,
    timeout: Duration,
}

impl SmtpEmailAdapter {
    pub fn new(config: SmtpConfig, timeout: Duration) -> Self {
        Self { config, timeout }
    }

    pub fn from_credentials(creds: &HashMap<String, String>, timeout: Duration) -> Result<Self> {
        let port = creds
            .get("smtp_port")
            .map(|p| p.parse::<u16>())
            .transpose()
            .map_err(|e| SendFleetError::Config(format!("smtp: bad smtp_port: {e}")))?
            .unwrap_or(587);
        Ok(Self::new(
            SmtpConfig {
                host: super::require(creds, "smtp_host", "smtp")?,
                port,
                username: super::require(creds, "username", "smtp")?,
                password: super::require(creds, "password", "smtp")?,
                from_email: super::require(creds, "from_email", "smtp")?,
                from_name: creds.get("from_name").filter(|v| !v.is_empty()).cloned(),
            },
            timeout,
        ))
    }

    async fn deliver(
        &self,
        recipient: &Recipient,
        subject: &str,
        body: &str,
        from_name: Option<&str>,
    ) -> Result<SendOutcome> {
        use lettre::message::header::ContentType;
        use lettre::message::Mailbox;
        use lettre::transport::smtp::authentication::Credentials;
        use lettre::{AsyncSmtpTransport, AsyncTransport, Message};

        let from_addr: lettre::Address = match self.config.from_email.parse() {
            Ok(a) => a,
            Err(e) => {
                return Err(SendFleetError::Config(format!(
                    "smtp: invalid from_email: {e}"
                )));
            }
        };
        let to_addr: lettre::Address = match recipient.address.parse() {
            Ok(a) => a,
            Err(e) => return Ok(SendOutcome::rejected(format!("Invalid address: {e}"))),
        };

        let from_display = from_name
            .map(String::from)
            .or_else(|| self.config.from_name.clone());
        let to_display =
            (!recipient.display_name.is_empty()).then(|| recipient.display_name.clone());

        let message_id = format!("<{}@{}>", uuid::Uuid::new_v4(), self.config.host);
        let email = Message::builder()
            .from(Mailbox::new(from_display, from_addr))
            .to(Mailbox::new(to_display, to_addr))
            .subject(subject)
            .message_id(Some(message_id.clone()))
            .header(ContentType::TEXT_HTML)
            .body(body.to_string())
            .map_err(|e| SendFleetError::Adapter(format!("Build email: {e}")))?;

        let creds = Credentials::new(self.config.username.clone(), self.config.password.clone());
        let mailer = AsyncSmtpTransport::<lettre::Tokio1Executor>::starttls_relay(&self.config.host)
            .map_err(|e| SendFleetError::Config(format!("SMTP relay: {e}")))?
            .port(self.config.port)
            .credentials(creds)
            .timeout(Some(self.timeout))
            .build();

        match mailer.send(email).await {
            Ok(_) => {
                tracing::debug!("📤 SMTP accepted {} → {}", message_id, recipient.address);
                Ok(SendOutcome::accepted(message_id))
            }
            Err(e) => Ok(SendOutcome::rejected(format!("SMTP send: {e}"))),
        }
    }
}

#[async_trait]
impl ProviderAdapter for SmtpEmailAdapter {
    fn vendor(&self) -> &str {
        "smtp"
    }

    fn channel(&self) -> ChannelKind {
        ChannelKind::Email
    }

    async fn send(&self, recipient: &Recipient, payload: &ChannelPayload) -> Result<SendOutcome> {
        let ChannelPayload::Email {
            subject,
            body,
            from_name,
        } = payload
        else {
            return Err(SendFleetError::Adapter(
                "smtp adapter given a non-email payload".into(),
            ));
        };
        self.deliver(recipient, subject, body, from_name.as_deref())
            .await
    }
}

/// Resend transactional email API.
#[derive(Debug)]
pub struct ResendAdapter {
    api_key: String,
    from_email: String,
    from_name: Option<String>,
    client: reqwest::Client,
    timeout: Duration,
}

impl ResendAdapter {
    pub fn from_credentials(creds: &HashMap<String, String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            api_key: super::require(creds, "api_key", "resend")?,
            from_email: super::require(creds, "from_email", "resend")?,
            from_name: creds.get("from_name").filter(|v| !v.is_empty()).cloned(),
            client: reqwest::Client::new(),
            timeout,
        })
    }

    fn from_header(&self, from_name: Option<&str>) -> String {
        match from_name.or(self.from_name.as_deref()) {
            Some(name) => format!("{name} <{}>", self.from_email),
            None => self.from_email.clone(),
        }
    }
}

#[async_trait]
impl ProviderAdapter for ResendAdapter {
    fn vendor(&self) -> &str {
        "resend"
    }

    fn channel(&self) -> ChannelKind {
        ChannelKind::Email
    }

    async fn send(&self, recipient: &Recipient, payload: &ChannelPayload) -> Result<SendOutcome> {
        let ChannelPayload::Email {
            subject,
            body,
            from_name,
        } = payload
        else {
            return Err(SendFleetError::Adapter(
                "resend adapter given a non-email payload".into(),
            ));
        };

        let request = serde_json::json!({
            "from": self.from_header(from_name.as_deref()),
            "to": [recipient.address],
            "subject": subject,
            "html": body,
        });

        let response = match self
            .client
            .post("https://api.resend.com/emails")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return Ok(SendOutcome::rejected(format!("Resend request: {e}"))),
        };

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Ok(SendOutcome::rejected(format!(
                "Resend API error {status}: {text}"
            )));
        }

        let result: serde_json::Value = match response.json().await {
            Ok(v) => v,
            Err(e) => return Ok(SendOutcome::rejected(format!("Invalid Resend response: {e}"))),
        };

        match result["id"].as_str() {
            Some(id) => Ok(SendOutcome::accepted(id)),
            None => Ok(SendOutcome::rejected("Resend response missing id")),
        }
    }
}
