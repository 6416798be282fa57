//! DeliveryGateway port - the mail transport.

use async_trait::async_trait;

use crate::domain::{GatewayError, Recipient};

/// Sends one message to one recipient.
///
/// No batching semantics of its own: the dispatcher decides how many sends
/// are in flight. Implementations should bound each call with their own
/// transport timeout; the dispatcher may add another on top.
#[async_trait]
pub trait DeliveryGateway: Send + Sync {
    async fn send(
        &self,
        recipient: &Recipient,
        subject: &str,
        body: &str,
    ) -> Result<(), GatewayError>;

    /// Short name used in logs.
    fn name(&self) -> &'static str {
        "gateway"
    }
}
