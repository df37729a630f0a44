//! Job lifecycle events, their envelope, and the per-owner notification bus.
//!
//! The bus fans events out to live subscribers keyed by owner identity. It
//! keeps no history: an event published while an owner has no subscriber is
//! discarded, and a subscriber only sees events published after it
//! subscribed.
//!
//! Every subscriber owns a bounded `tokio::sync::broadcast` channel. When a
//! subscriber falls more than its capacity behind, the oldest undelivered
//! events for that subscriber are overwritten and it resumes from the oldest
//! retained one. Other subscribers are unaffected.
//!
//! ## Wire Format (SSE)
//!
//! ```text
//! event: job_progress
//! data: {"event_id":"...","event_type":"job_progress","occurred_at":"...","owner_id":"...","payload_version":1,"payload":{"type":"job_progress",...}}
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::defaults;
use crate::models::{JobStatus, JobType};
use crate::traits::EventPublisher;

// ============================================================================
// Job Events
// ============================================================================

/// Domain payload of a job lifecycle notification.
///
/// Serialized with a `type` tag, e.g.
/// `{"type":"job_progress","job_id":"...","status":"processing","progress_percent":40}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// A job was registered.
    JobStarted {
        job_id: Uuid,
        job_type: JobType,
        status: JobStatus,
        title: String,
    },
    /// A running job reported progress.
    JobProgress {
        job_id: Uuid,
        status: JobStatus,
        progress_percent: i32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// A job finished with status COMPLETED.
    JobCompleted { job_id: Uuid, status: JobStatus },
    /// A job finished FAILED or PARTIAL; `error` is the first recorded error.
    JobFailed {
        job_id: Uuid,
        status: JobStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl JobEvent {
    /// Event name used for the envelope and the SSE `event:` field.
    pub fn event_type(&self) -> &'static str {
        match self {
            JobEvent::JobStarted { .. } => "job_started",
            JobEvent::JobProgress { .. } => "job_progress",
            JobEvent::JobCompleted { .. } => "job_completed",
            JobEvent::JobFailed { .. } => "job_failed",
        }
    }

    pub fn job_id(&self) -> Uuid {
        match self {
            JobEvent::JobStarted { job_id, .. }
            | JobEvent::JobProgress { job_id, .. }
            | JobEvent::JobCompleted { job_id, .. }
            | JobEvent::JobFailed { job_id, .. } => *job_id,
        }
    }

    pub fn status(&self) -> JobStatus {
        match self {
            JobEvent::JobStarted { status, .. }
            | JobEvent::JobProgress { status, .. }
            | JobEvent::JobCompleted { status, .. }
            | JobEvent::JobFailed { status, .. } => *status,
        }
    }
}

// ============================================================================
// Event Envelope
// ============================================================================

/// Versioned wrapper delivered to subscribers and relayed between processes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event identifier (UUIDv7 for temporal ordering).
    pub event_id: Uuid,
    /// Same value as [`JobEvent::event_type`].
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    /// Delivery key: only this owner's subscribers receive the event.
    pub owner_id: String,
    /// Payload schema version.
    pub payload_version: u32,
    pub payload: JobEvent,
}

impl EventEnvelope {
    pub fn new(owner_id: impl Into<String>, event: JobEvent) -> Self {
        Self {
            event_id: crate::uuid_utils::new_v7(),
            event_type: event.event_type().to_string(),
            occurred_at: Utc::now(),
            owner_id: owner_id.into(),
            payload_version: defaults::EVENT_PAYLOAD_VERSION,
            payload: event,
        }
    }
}

// ============================================================================
// Notification Bus
// ============================================================================

/// Identifier of one registered delivery channel.
pub type SubscriptionId = u64;

type Channel = (SubscriptionId, broadcast::Sender<EventEnvelope>);

#[derive(Default)]
struct Registry {
    channels: RwLock<HashMap<String, Vec<Channel>>>,
    next_id: AtomicU64,
}

impl Registry {
    /// Deregister one channel. Returns whether it was registered.
    fn remove(&self, owner_id: &str, id: SubscriptionId) -> bool {
        let mut channels = self
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(list) = channels.get_mut(owner_id) else {
            return false;
        };
        let before = list.len();
        list.retain(|(sid, _)| *sid != id);
        let removed = list.len() != before;
        if list.is_empty() {
            channels.remove(owner_id);
        }
        removed
    }
}

/// In-process fan-out of job events keyed by owner identity.
///
/// Cheap to clone; clones share one subscriber registry.
#[derive(Clone)]
pub struct NotificationBus {
    registry: Arc<Registry>,
    capacity: usize,
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new(defaults::EVENT_BUFFER_CAPACITY)
    }
}

impl NotificationBus {
    /// Create a bus whose subscribers each buffer up to `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            registry: Arc::new(Registry::default()),
            capacity: capacity.max(1),
        }
    }

    /// Register a new delivery channel for `owner_id`.
    ///
    /// Any number of subscriptions may exist per owner; each receives its own
    /// copy of every subsequent event. Dropping the returned [`Subscription`]
    /// deregisters it.
    pub fn subscribe(&self, owner_id: &str) -> Subscription {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = broadcast::channel(self.capacity);
        let mut channels = self
            .registry
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let list = channels.entry(owner_id.to_string()).or_default();
        list.push((id, tx));
        debug!(
            subsystem = "events",
            component = "bus",
            op = "subscribe",
            owner_id,
            subscription_id = id,
            subscriber_count = list.len(),
            "Subscriber registered"
        );
        Subscription {
            id,
            owner_id: owner_id.to_string(),
            rx,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Deregister a delivery channel. Unknown or already removed ids are a no-op.
    pub fn unsubscribe(&self, owner_id: &str, id: SubscriptionId) {
        if self.registry.remove(owner_id, id) {
            debug!(
                subsystem = "events",
                component = "bus",
                op = "unsubscribe",
                owner_id,
                subscription_id = id,
                "Subscriber removed"
            );
        }
    }

    /// Deliver `event` to every channel currently subscribed under `owner_id`.
    pub fn publish(&self, owner_id: &str, event: JobEvent) {
        self.deliver(EventEnvelope::new(owner_id, event));
    }

    /// Deliver an already built envelope, keeping its id and timestamp.
    ///
    /// Used when relaying envelopes that were created in another process.
    pub fn deliver(&self, envelope: EventEnvelope) {
        let mut closed = Vec::new();
        {
            let channels = self
                .registry
                .channels
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            let Some(list) = channels.get(&envelope.owner_id) else {
                debug!(
                    subsystem = "events",
                    component = "bus",
                    event_type = %envelope.event_type,
                    owner_id = %envelope.owner_id,
                    "No subscribers, event discarded"
                );
                return;
            };
            debug!(
                subsystem = "events",
                component = "bus",
                op = "publish",
                event_type = %envelope.event_type,
                event_id = %envelope.event_id,
                owner_id = %envelope.owner_id,
                subscriber_count = list.len(),
                "NotificationBus publish"
            );
            for (id, tx) in list {
                if tx.send(envelope.clone()).is_err() {
                    closed.push(*id);
                }
            }
        }
        for id in closed {
            self.registry.remove(&envelope.owner_id, id);
        }
    }

    /// Live subscriptions for one owner.
    pub fn subscriber_count(&self, owner_id: &str) -> usize {
        self.registry
            .channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(owner_id)
            .map_or(0, Vec::len)
    }

    /// Live subscriptions across all owners.
    pub fn total_subscribers(&self) -> usize {
        self.registry
            .channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum()
    }
}

impl EventPublisher for NotificationBus {
    fn publish(&self, owner_id: &str, event: JobEvent) {
        NotificationBus::publish(self, owner_id, event);
    }
}

/// Receiving end of one bus registration.
pub struct Subscription {
    id: SubscriptionId,
    owner_id: String,
    rx: broadcast::Receiver<EventEnvelope>,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Wait for the next event.
    ///
    /// Returns `None` once the subscription has been removed and its buffer
    /// drained. Events overwritten while this subscriber lagged are skipped.
    pub async fn recv(&mut self) -> Option<EventEnvelope> {
        loop {
            match self.rx.recv().await {
                Ok(envelope) => return Some(envelope),
                Err(RecvError::Lagged(missed)) => self.log_lag(missed),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<EventEnvelope> {
        loop {
            match self.rx.try_recv() {
                Ok(envelope) => return Some(envelope),
                Err(TryRecvError::Lagged(missed)) => self.log_lag(missed),
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    fn log_lag(&self, missed: u64) {
        warn!(
            subsystem = "events",
            component = "bus",
            owner_id = %self.owner_id,
            subscription_id = self.id,
            missed,
            "Subscriber lagged, oldest events dropped"
        );
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.owner_id, self.id);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
