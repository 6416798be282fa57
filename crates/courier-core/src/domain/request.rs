//! Inbound bulk-email request and its validation.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::errors::ValidationError;
use super::recipient::Recipient;

/// Subject used when the submitter does not provide one.
pub const DEFAULT_SUBJECT: &str = "Notification";

/// Raw submission payload, as received from the API layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRequest {
    #[serde(alias = "emailLists")]
    pub recipients: Vec<String>,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

impl NotificationRequest {
    pub fn new(recipients: impl IntoIterator<Item = impl Into<String>>, body: impl Into<String>) -> Self {
        Self {
            recipients: recipients.into_iter().map(Into::into).collect(),
            body: body.into(),
            subject: None,
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Check the payload and produce the immutable message a job is built from.
    ///
    /// Fails on the first problem found: empty list, empty body, a malformed
    /// address, or the same address listed twice.
    pub fn validate(self, default_subject: &str) -> Result<Message, ValidationError> {
        if self.recipients.is_empty() {
            return Err(ValidationError::NoRecipients);
        }
        if self.body.trim().is_empty() {
            return Err(ValidationError::EmptyBody);
        }

        let mut seen = HashSet::with_capacity(self.recipients.len());
        let mut recipients = Vec::with_capacity(self.recipients.len());
        for raw in &self.recipients {
            let recipient = Recipient::parse(raw)?;
            if !seen.insert(recipient.clone()) {
                return Err(ValidationError::DuplicateRecipient(recipient.to_string()));
            }
            recipients.push(recipient);
        }

        let subject = self
            .subject
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| default_subject.to_string());

        Ok(Message {
            recipients,
            subject,
            body: self.body,
        })
    }
}

/// A validated message: non-empty, de-duplicated recipients in submission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub recipients: Vec<Recipient>,
    pub subject: String,
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_request_keeps_order_and_defaults_subject() {
        let msg = NotificationRequest::new(["b@x.com", "a@x.com"], "hello")
            .validate(DEFAULT_SUBJECT)
            .unwrap();

        let addrs: Vec<&str> = msg.recipients.iter().map(Recipient::as_str).collect();
        assert_eq!(addrs, vec!["b@x.com", "a@x.com"]);
        assert_eq!(msg.subject, "Notification");
        assert_eq!(msg.body, "hello");
    }

    #[test]
    fn explicit_subject_wins() {
        let msg = NotificationRequest::new(["a@x.com"], "hello")
            .with_subject("Outage")
            .validate(DEFAULT_SUBJECT)
            .unwrap();
        assert_eq!(msg.subject, "Outage");
    }

    #[test]
    fn empty_recipient_list_is_rejected() {
        let err = NotificationRequest::new(Vec::<String>::new(), "hello")
            .validate(DEFAULT_SUBJECT)
            .unwrap_err();
        assert_eq!(err, ValidationError::NoRecipients);
    }

    #[test]
    fn empty_body_is_rejected() {
        let err = NotificationRequest::new(["a@x.com"], "   ")
            .validate(DEFAULT_SUBJECT)
            .unwrap_err();
        assert_eq!(err, ValidationError::EmptyBody);
    }

    #[test]
    fn malformed_address_is_rejected() {
        let err = NotificationRequest::new(["a@x.com", "broken"], "hello")
            .validate(DEFAULT_SUBJECT)
            .unwrap_err();
        assert_eq!(err, ValidationError::InvalidAddress("broken".into()));
    }

    #[test]
    fn duplicate_address_is_rejected() {
        let err = NotificationRequest::new(["a@x.com", " a@x.com"], "hello")
            .validate(DEFAULT_SUBJECT)
            .unwrap_err();
        assert_eq!(err, ValidationError::DuplicateRecipient("a@x.com".into()));
    }

    #[test]
    fn accepts_legacy_field_name() {
        let req: NotificationRequest = serde_json::from_value(serde_json::json!({
            "emailLists": ["a@x.com"],
            "body": "hi"
        }))
        .unwrap();
        assert_eq!(req.recipients, vec!["a@x.com".to_string()]);
        assert_eq!(req.subject, None);
    }
}
