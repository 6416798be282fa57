//! In-memory queue broker.
//!
//! # Structure
//! One `tokio::sync::Mutex` guards all broker state:
//! - `records`: `JobId` → `DeliveryRecord`, the only place state changes
//! - `ready`: FIFO of ids waiting for a worker
//! - `scheduled`: min-heap of retries ordered by `next_run_at`
//! - `dead_letters`: dead ids not yet returned by `drain_dead`
//!
//! # Waiting for work
//! `lease()` never polls. Under the lock it promotes due retries and
//! reclaims expired leases. If nothing is ready it sleeps until the earliest
//! retry or lease expiry, or until `Notify` reports an enqueue or a retry.
//!
//! # Stale holders
//! Every lease carries the `lease_seq` it was issued with. Once a lease has
//! expired the record is no longer `Leased` under that sequence number, so
//! `extend`, `ack` and `retry` from the old holder fail with
//! `QueueError::LeaseLost` and change nothing.

use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use super::{DeliveryRecord, DeliveryState, RetryPolicy};
use crate::domain::{JobId, QueueError};
use crate::observability::QueueCounts;
use crate::ports::{JobLease, QueueBroker};

/// Scheduled retry entry for the priority queue.
///
/// Reverse ordering so `BinaryHeap` behaves as a min-heap (earliest first).
#[derive(Debug, Clone, PartialEq, Eq)]
struct ScheduledJob {
    next_run_at: Instant,
    job_id: JobId,
}

impl PartialOrd for ScheduledJob {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledJob {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other.next_run_at.cmp(&self.next_run_at)
    }
}

/// Broker tuning.
#[derive(Debug, Clone)]
pub struct BrokerSettings {
    /// How long a lease may stay unacknowledged before the job is handed out
    /// again.
    pub lease_timeout: Duration,

    /// Deliveries after which a job is dead-lettered instead of retried.
    pub max_deliveries: u32,

    pub retry_policy: RetryPolicy,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            lease_timeout: Duration::from_secs(30),
            max_deliveries: 5,
            retry_policy: RetryPolicy::default(),
        }
    }
}

struct BrokerState {
    records: HashMap<JobId, DeliveryRecord>,
    ready: VecDeque<JobId>,
    scheduled: BinaryHeap<ScheduledJob>,
    /// Dead-lettered ids not yet handed out by `drain_dead`.
    dead_letters: Vec<JobId>,
    next_lease_seq: u64,
    settings: BrokerSettings,
}

impl BrokerState {
    fn new(settings: BrokerSettings) -> Self {
        Self {
            records: HashMap::new(),
            ready: VecDeque::new(),
            scheduled: BinaryHeap::new(),
            dead_letters: Vec::new(),
            next_lease_seq: 1,
            settings,
        }
    }

    fn allocate_lease_seq(&mut self) -> u64 {
        let seq = self.next_lease_seq;
        self.next_lease_seq += 1;
        seq
    }

    /// Move jobs whose backoff has elapsed back to the ready queue.
    fn promote_scheduled(&mut self, now: Instant) {
        while let Some(entry) = self.scheduled.peek() {
            if entry.next_run_at > now {
                break;
            }
            let Some(entry) = self.scheduled.pop() else {
                break;
            };
            if let Some(record) = self.records.get_mut(&entry.job_id)
                && record.state == DeliveryState::RetryScheduled
            {
                record.requeue();
                self.ready.push_back(entry.job_id);
            }
        }
    }

    /// Reclaim leases whose holder never acked in time.
    fn reclaim_expired(&mut self, now: Instant) {
        let max_deliveries = self.settings.max_deliveries;
        let mut reclaimed = Vec::new();
        let mut dead = Vec::new();
        for record in self.records.values_mut() {
            let expired = record.state == DeliveryState::Leased
                && record.lease_expires_at.is_some_and(|at| at <= now);
            if !expired {
                continue;
            }
            if record.deliveries >= max_deliveries {
                tracing::error!(
                    job_id = %record.job_id,
                    deliveries = record.deliveries,
                    "lease expired and delivery budget exhausted, dead-lettering job"
                );
                record.mark_dead("lease expired".to_string());
                dead.push(record.job_id);
            } else {
                tracing::warn!(
                    job_id = %record.job_id,
                    deliveries = record.deliveries,
                    "lease expired, redelivering job"
                );
                record.requeue();
                reclaimed.push(record.job_id);
            }
        }
        self.ready.extend(reclaimed);
        self.dead_letters.extend(dead);
    }

    /// Earliest instant at which something may become leasable.
    fn next_wake(&self) -> Option<Instant> {
        let retry = self.scheduled.peek().map(|entry| entry.next_run_at);
        let expiry = self
            .records
            .values()
            .filter(|r| r.state == DeliveryState::Leased)
            .filter_map(|r| r.lease_expires_at)
            .min();
        match (retry, expiry) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn counts(&self) -> QueueCounts {
        let mut counts = QueueCounts::default();
        for record in self.records.values() {
            match record.state {
                DeliveryState::Ready => counts.ready += 1,
                DeliveryState::Leased => counts.leased += 1,
                DeliveryState::RetryScheduled => counts.retry_scheduled += 1,
                DeliveryState::Acked => counts.acked += 1,
                DeliveryState::Dead => counts.dead += 1,
            }
        }
        counts
    }
}

/// In-memory, at-least-once broker.
///
/// Redelivery happens in two ways: a lease explicitly asks for `retry`
/// (backoff per `RetryPolicy`), or a lease is never acked and expires after
/// `lease_timeout`.
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
    notify: Arc<Notify>,
    available: AtomicBool,
}

impl InMemoryBroker {
    pub fn new(settings: BrokerSettings) -> Self {
        Self {
            state: Arc::new(Mutex::new(BrokerState::new(settings))),
            notify: Arc::new(Notify::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the broker becoming unreachable (enqueue fails) or recovering.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub async fn delivery_state(&self, job_id: JobId) -> Option<DeliveryState> {
        let state = self.state.lock().await;
        state.records.get(&job_id).map(|r| r.state)
    }

    pub async fn record(&self, job_id: JobId) -> Option<DeliveryRecord> {
        let state = self.state.lock().await;
        state.records.get(&job_id).cloned()
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new(BrokerSettings::default())
    }
}

#[async_trait]
impl QueueBroker for InMemoryBroker {
    async fn enqueue(&self, job_id: JobId) -> Result<(), QueueError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(QueueError::Unavailable("in-memory broker is offline".into()));
        }

        {
            let mut state = self.state.lock().await;
            if let Some(existing) = state.records.get(&job_id)
                && !existing.state.is_terminal()
            {
                // already pending somewhere in the broker
                return Ok(());
            }
            state.records.insert(job_id, DeliveryRecord::new(job_id));
            state.ready.push_back(job_id);
        }

        self.notify.notify_one();
        Ok(())
    }

    async fn lease(&self) -> Option<Box<dyn JobLease>> {
        loop {
            let next_wake = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                state.reclaim_expired(now);
                state.promote_scheduled(now);

                while let Some(job_id) = state.ready.pop_front() {
                    let seq = state.allocate_lease_seq();
                    let lease_timeout = state.settings.lease_timeout;
                    let expires_at = now + lease_timeout;
                    let Some(record) = state.records.get_mut(&job_id) else {
                        continue;
                    };
                    if !record.state.is_leasable() {
                        continue;
                    }
                    record.start_lease(seq, expires_at);
                    let lease = InMemoryLease {
                        job_id,
                        seq,
                        delivery: record.deliveries,
                        lease_timeout,
                        state: Arc::clone(&self.state),
                        notify: Arc::clone(&self.notify),
                    };
                    return Some(Box::new(lease));
                }

                state.next_wake()
            };

            match next_wake {
                Some(wake_at) => {
                    tokio::select! {
                        _ = self.notify.notified() => {},
                        _ = tokio::time::sleep_until(wake_at) => {},
                    }
                }
                None => self.notify.notified().await,
            }
        }
    }

    async fn counts(&self) -> Result<QueueCounts, QueueError> {
        let state = self.state.lock().await;
        Ok(state.counts())
    }

    async fn drain_dead(&self) -> Result<Vec<JobId>, QueueError> {
        let mut state = self.state.lock().await;
        Ok(std::mem::take(&mut state.dead_letters))
    }
}

struct InMemoryLease {
    job_id: JobId,
    seq: u64,
    delivery: u32,
    lease_timeout: Duration,
    state: Arc<Mutex<BrokerState>>,
    notify: Arc<Notify>,
}

#[async_trait]
impl JobLease for InMemoryLease {
    fn job_id(&self) -> JobId {
        self.job_id
    }

    fn delivery(&self) -> u32 {
        self.delivery
    }

    fn lease_timeout(&self) -> Duration {
        self.lease_timeout
    }

    async fn extend(&self) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        match state.records.get_mut(&self.job_id) {
            Some(record) if record.holds_lease(self.seq) => {
                record.extend_lease(Instant::now() + self.lease_timeout);
                Ok(())
            }
            _ => Err(QueueError::LeaseLost(self.job_id)),
        }
    }

    async fn ack(self: Box<Self>) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        match state.records.get_mut(&self.job_id) {
            Some(record) if record.holds_lease(self.seq) => {
                record.mark_acked();
                Ok(())
            }
            _ => Err(QueueError::LeaseLost(self.job_id)),
        }
    }

    async fn retry(self: Box<Self>, error: String) -> Result<(), QueueError> {
        {
            let mut state = self.state.lock().await;
            let max_deliveries = state.settings.max_deliveries;
            let delay = state.settings.retry_policy.next_delay(self.delivery);

            let Some(record) = state.records.get_mut(&self.job_id) else {
                return Err(QueueError::LeaseLost(self.job_id));
            };
            if !record.holds_lease(self.seq) {
                return Err(QueueError::LeaseLost(self.job_id));
            }

            if record.deliveries >= max_deliveries {
                tracing::error!(
                    job_id = %self.job_id,
                    deliveries = record.deliveries,
                    error = %error,
                    "delivery budget exhausted, dead-lettering job"
                );
                record.mark_dead(error);
                state.dead_letters.push(self.job_id);
                return Ok(());
            }

            let next_run_at = Instant::now() + delay;
            tracing::warn!(
                job_id = %self.job_id,
                deliveries = record.deliveries,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "job scheduled for redelivery"
            );
            record.schedule_retry(next_run_at, error);
            state.scheduled.push(ScheduledJob {
                next_run_at,
                job_id: self.job_id,
            });
        }

        // notify outside the lock so a sleeping lease() recomputes its wake time
        self.notify.notify_one();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    fn job_id() -> JobId {
        JobId::from_ulid(Ulid::new())
    }

    fn settings(max_deliveries: u32) -> BrokerSettings {
        BrokerSettings {
            lease_timeout: Duration::from_secs(30),
            max_deliveries,
            retry_policy: RetryPolicy::new(Duration::from_secs(2)),
        }
    }

    #[tokio::test]
    async fn enqueue_and_counts() {
        let broker = InMemoryBroker::default();
        broker.enqueue(job_id()).await.unwrap();

        let counts = broker.counts().await.unwrap();
        assert_eq!(counts.ready, 1);
        assert_eq!(counts.leased, 0);
    }

    #[tokio::test]
    async fn enqueue_is_idempotent_while_pending() {
        let broker = InMemoryBroker::default();
        let id = job_id();
        broker.enqueue(id).await.unwrap();
        broker.enqueue(id).await.unwrap();

        assert_eq!(broker.counts().await.unwrap().ready, 1);
    }

    #[tokio::test]
    async fn offline_broker_rejects_enqueue() {
        let broker = InMemoryBroker::default();
        broker.set_available(false);
        let err = broker.enqueue(job_id()).await.unwrap_err();
        assert!(matches!(err, QueueError::Unavailable(_)));
    }

    #[tokio::test]
    async fn lease_transitions_to_leased() {
        let broker = InMemoryBroker::default();
        let id = job_id();
        broker.enqueue(id).await.unwrap();

        let lease = tokio::time::timeout(Duration::from_millis(100), broker.lease())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(lease.job_id(), id);
        assert_eq!(lease.delivery(), 1);

        let counts = broker.counts().await.unwrap();
        assert_eq!(counts.ready, 0);
        assert_eq!(counts.leased, 1);
    }

    #[tokio::test]
    async fn ack_marks_acked() {
        let broker = InMemoryBroker::default();
        let id = job_id();
        broker.enqueue(id).await.unwrap();
        broker.lease().await.unwrap().ack().await.unwrap();

        assert_eq!(broker.delivery_state(id).await, Some(DeliveryState::Acked));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_redelivers_after_backoff() {
        let broker = InMemoryBroker::new(settings(5));
        let id = job_id();
        broker.enqueue(id).await.unwrap();

        let started = Instant::now();
        broker
            .lease()
            .await
            .unwrap()
            .retry("store offline".into())
            .await
            .unwrap();
        assert_eq!(
            broker.delivery_state(id).await,
            Some(DeliveryState::RetryScheduled)
        );

        let lease = broker.lease().await.unwrap();
        assert_eq!(lease.delivery(), 2);
        assert!(started.elapsed() >= Duration::from_secs(2));

        let record = broker.record(id).await.unwrap();
        assert_eq!(record.last_error.as_deref(), Some("store offline"));
    }

    #[tokio::test]
    async fn retry_past_budget_dead_letters() {
        let broker = InMemoryBroker::new(settings(1));
        let id = job_id();
        broker.enqueue(id).await.unwrap();
        broker
            .lease()
            .await
            .unwrap()
            .retry("boom".into())
            .await
            .unwrap();

        assert_eq!(broker.delivery_state(id).await, Some(DeliveryState::Dead));
        assert_eq!(broker.counts().await.unwrap().dead, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_lease_is_redelivered() {
        let broker = InMemoryBroker::new(settings(5));
        let id = job_id();
        broker.enqueue(id).await.unwrap();

        // worker "crashes": the lease is dropped without ack
        let first = broker.lease().await.unwrap();
        assert_eq!(first.delivery(), 1);
        drop(first);

        let second = broker.lease().await.unwrap();
        assert_eq!(second.job_id(), id);
        assert_eq!(second.delivery(), 2);
        second.ack().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stale_lease_cannot_ack() {
        let broker = InMemoryBroker::new(settings(5));
        let id = job_id();
        broker.enqueue(id).await.unwrap();

        let stale = broker.lease().await.unwrap();
        tokio::time::advance(Duration::from_secs(31)).await;
        let fresh = broker.lease().await.unwrap();

        let err = stale.ack().await.unwrap_err();
        assert_eq!(err, QueueError::LeaseLost(id));
        fresh.ack().await.unwrap();
        assert_eq!(broker.delivery_state(id).await, Some(DeliveryState::Acked));
    }

    #[tokio::test(start_paused = true)]
    async fn extended_lease_is_not_reclaimed() {
        let broker = InMemoryBroker::new(settings(5));
        let id = job_id();
        broker.enqueue(id).await.unwrap();

        let held = broker.lease().await.unwrap();
        for _ in 0..3 {
            tokio::time::advance(Duration::from_secs(20)).await;
            held.extend().await.unwrap();
        }

        // 60s in, well past one lease_timeout, and nobody else may claim it
        let other = tokio::time::timeout(Duration::from_secs(10), broker.lease()).await;
        assert!(other.is_err());
        assert_eq!(broker.record(id).await.unwrap().deliveries, 1);
        held.ack().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stale_lease_cannot_extend() {
        let broker = InMemoryBroker::new(settings(5));
        let id = job_id();
        broker.enqueue(id).await.unwrap();

        let stale = broker.lease().await.unwrap();
        tokio::time::advance(Duration::from_secs(31)).await;
        let _fresh = broker.lease().await.unwrap();

        assert_eq!(stale.extend().await, Err(QueueError::LeaseLost(id)));
    }

    #[tokio::test(start_paused = true)]
    async fn dead_letters_are_drained_once() {
        let broker = InMemoryBroker::new(settings(1));
        let (retried, expired) = (job_id(), job_id());
        broker.enqueue(retried).await.unwrap();
        broker.lease().await.unwrap().retry("boom".into()).await.unwrap();

        broker.enqueue(expired).await.unwrap();
        drop(broker.lease().await.unwrap());
        tokio::time::advance(Duration::from_secs(31)).await;
        // reclaiming happens on the next lease attempt
        assert!(
            tokio::time::timeout(Duration::from_millis(10), broker.lease())
                .await
                .is_err()
        );

        let mut dead = broker.drain_dead().await.unwrap();
        dead.sort();
        let mut expected = vec![retried, expired];
        expected.sort();
        assert_eq!(dead, expected);
        assert!(broker.drain_dead().await.unwrap().is_empty());
    }
}
