//! SMTP gateway using lettre.
//!
//! # Example
//!
//! ```rust,ignore
//! use courier_core::impls::SmtpGateway;
//!
//! let gateway = SmtpGateway::new("smtp.example.com", 587)
//!     .credentials("username", "password")
//!     .from("Notif Service <notify@example.com>")
//!     .build()?;
//! ```

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::{Mailbox, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::domain::{ConfigError, GatewayError, Recipient};
use crate::ports::DeliveryGateway;

/// Sends plain-text messages through an SMTP relay.
pub struct SmtpGateway {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpGateway {
    /// Builder for a STARTTLS connection.
    pub fn new(host: &str, port: u16) -> SmtpGatewayBuilder {
        SmtpGatewayBuilder {
            host: host.to_string(),
            port,
            credentials: None,
            from: None,
            timeout: Some(Duration::from_secs(10)),
            starttls: true,
        }
    }

    fn build_message(
        &self,
        recipient: &Recipient,
        subject: &str,
        body: &str,
    ) -> Result<Message, GatewayError> {
        let to: Mailbox = recipient
            .as_str()
            .parse()
            .map_err(|e| GatewayError::Rejected(format!("{recipient}: {e}")))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| GatewayError::Transport(e.to_string()))
    }
}

pub struct SmtpGatewayBuilder {
    host: String,
    port: u16,
    credentials: Option<(String, String)>,
    from: Option<String>,
    timeout: Option<Duration>,
    starttls: bool,
}

impl SmtpGatewayBuilder {
    pub fn credentials(mut self, username: &str, password: &str) -> Self {
        self.credentials = Some((username.to_string(), password.to_string()));
        self
    }

    pub fn from(mut self, from: &str) -> Self {
        self.from = Some(from.to_string());
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Plain connection without TLS. Only for a local relay.
    pub fn dangerous_plaintext(mut self) -> Self {
        self.starttls = false;
        self
    }

    pub fn build(self) -> Result<SmtpGateway, ConfigError> {
        let from_raw = self.from.unwrap_or_else(|| format!("notify@{}", self.host));
        let from: Mailbox = from_raw.parse().map_err(|_| ConfigError::Invalid {
            name: "smtp from address",
            value: from_raw.clone(),
        })?;

        let builder = if self.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.host).map_err(|e| {
                ConfigError::Invalid {
                    name: "smtp host",
                    value: format!("{}: {e}", self.host),
                }
            })?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.host)
        };

        let mut builder = builder.port(self.port).timeout(self.timeout);
        if let Some((username, password)) = self.credentials {
            builder = builder.credentials(Credentials::new(username, password));
        }

        Ok(SmtpGateway {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl DeliveryGateway for SmtpGateway {
    async fn send(
        &self,
        recipient: &Recipient,
        subject: &str,
        body: &str,
    ) -> Result<(), GatewayError> {
        let message = self.build_message(recipient, subject, body)?;
        let response = self
            .transport
            .send(message)
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        tracing::debug!(
            recipient = %recipient,
            code = %response.code(),
            "smtp relay accepted message"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}
