//! BatchDispatcher - bounded-concurrency fan-out of one message.
//!
//! Recipients are split into consecutive batches of at most `batch_size`.
//! Batches run strictly one after another; inside a batch every send runs
//! concurrently and the whole batch is joined before the next one starts.
//! Peak in-flight sends therefore never exceed `batch_size`.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::domain::{DeliveryOutcome, GatewayError, OutcomeCounts, OutcomeMap, Recipient};
use crate::ports::DeliveryGateway;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSettings {
    pub batch_size: NonZeroUsize,

    /// Upper bound for a single send, on top of the gateway's own timeout.
    pub send_timeout: Option<Duration>,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            batch_size: NonZeroUsize::new(50).unwrap_or(NonZeroUsize::MIN),
            send_timeout: None,
        }
    }
}

pub struct BatchDispatcher {
    gateway: Arc<dyn DeliveryGateway>,
    settings: DispatchSettings,
}

impl BatchDispatcher {
    pub fn new(gateway: Arc<dyn DeliveryGateway>, settings: DispatchSettings) -> Self {
        Self { gateway, settings }
    }

    pub fn settings(&self) -> DispatchSettings {
        self.settings
    }

    /// Send `body` to every recipient and return one outcome per recipient.
    ///
    /// Never fails: a gateway error or timeout becomes a `Failure` outcome
    /// and the remaining recipients are still attempted.
    pub async fn dispatch(&self, recipients: &[Recipient], subject: &str, body: &str) -> OutcomeMap {
        let batch_size = self.settings.batch_size.get();
        let batches = recipients.len().div_ceil(batch_size);
        let mut outcomes = OutcomeMap::with_capacity(recipients.len());

        for (index, batch) in recipients.chunks(batch_size).enumerate() {
            debug!(
                gateway = self.gateway.name(),
                batch = index + 1,
                batches,
                size = batch.len(),
                "dispatching batch"
            );

            let results = join_all(
                batch
                    .iter()
                    .map(|recipient| self.send_one(recipient, subject, body)),
            )
            .await;

            for (recipient, result) in batch.iter().zip(results) {
                if let Err(error) = &result {
                    warn!(recipient = %recipient, error = %error, "delivery failed");
                }
                outcomes.insert(recipient.clone(), DeliveryOutcome::from(&result));
            }
        }

        let counts = OutcomeCounts::tally(outcomes.values());
        debug!(
            total = counts.total,
            success = counts.success,
            failure = counts.failure,
            "dispatch finished"
        );
        outcomes
    }

    async fn send_one(
        &self,
        recipient: &Recipient,
        subject: &str,
        body: &str,
    ) -> Result<(), GatewayError> {
        let send = self.gateway.send(recipient, subject, body);
        match self.settings.send_timeout {
            Some(limit) => tokio::time::timeout(limit, send)
                .await
                .unwrap_or_else(|_| Err(GatewayError::Timeout(limit.as_millis() as u64))),
            None => send.await,
        }
    }
}
