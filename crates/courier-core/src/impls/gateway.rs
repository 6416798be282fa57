//! Delivery gateways that do not talk to a real transport.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{GatewayError, Recipient};
use crate::ports::DeliveryGateway;

/// Gateway that emits a tracing event per message and always succeeds.
///
/// Useful for staging or when you want to see what would be sent.
#[derive(Debug, Default)]
pub struct LoggingGateway {
    log_body: bool,
}

impl LoggingGateway {
    pub fn new() -> Self {
        Self { log_body: false }
    }

    /// Also log message bodies (at debug level).
    pub fn log_body(mut self, log_body: bool) -> Self {
        self.log_body = log_body;
        self
    }
}

#[async_trait]
impl DeliveryGateway for LoggingGateway {
    async fn send(
        &self,
        recipient: &Recipient,
        subject: &str,
        body: &str,
    ) -> Result<(), GatewayError> {
        tracing::info!(recipient = %recipient, subject = %subject, "email logged");
        if self.log_body {
            tracing::debug!(body = %body, "email body");
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "logger"
    }
}

/// Programmable gateway for tests and demos.
///
/// - recipients in the failure set are rejected
/// - per-recipient delays shuffle completion order
/// - "hanging" recipients never resolve, which lets a test kill a worker
///   mid-batch
/// - the in-flight high-water mark is recorded for concurrency assertions
#[derive(Debug, Default)]
pub struct ScriptedGateway {
    failing: HashSet<String>,
    fail_all: bool,
    default_delay: Duration,
    delays: HashMap<String, Duration>,
    hanging: Mutex<HashSet<String>>,
    sends: Mutex<Vec<Recipient>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, recipients: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.failing.extend(recipients.into_iter().map(Into::into));
        self
    }

    pub fn fail_all(mut self) -> Self {
        self.fail_all = true;
        self
    }

    /// Delay applied to every send without a specific delay.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    pub fn delay_for(mut self, recipient: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(recipient.into(), delay);
        self
    }

    pub fn hanging(self, recipients: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let hanging = recipients.into_iter().map(Into::into).collect();
        Self {
            hanging: Mutex::new(hanging),
            ..self
        }
    }

    /// Later sends to previously hanging recipients resolve normally.
    pub async fn stop_hanging(&self) {
        self.hanging.lock().await.clear();
    }

    /// Every attempted send, in start order.
    pub async fn sends(&self) -> Vec<Recipient> {
        self.sends.lock().await.clone()
    }

    pub async fn attempts(&self, recipient: &str) -> usize {
        self.sends
            .lock()
            .await
            .iter()
            .filter(|r| r.as_str() == recipient)
            .count()
    }

    /// Highest number of sends observed in flight at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

/// Decrements the in-flight counter even if the send future is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DeliveryGateway for ScriptedGateway {
    async fn send(
        &self,
        recipient: &Recipient,
        _subject: &str,
        _body: &str,
    ) -> Result<(), GatewayError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        self.sends.lock().await.push(recipient.clone());

        let hangs = self.hanging.lock().await.contains(recipient.as_str());
        if hangs {
            std::future::pending::<()>().await;
        }

        let delay = self
            .delays
            .get(recipient.as_str())
            .copied()
            .unwrap_or(self.default_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.fail_all || self.failing.contains(recipient.as_str()) {
            return Err(GatewayError::Rejected(format!(
                "scripted failure for {recipient}"
            )));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
