//! Cross-process job event relay over Redis pub/sub.
//!
//! Producers in any process publish through [`RedisEventRelay`]; the serving
//! process runs [`RedisEventListener::listen`], which feeds every relayed
//! envelope into its local [`NotificationBus`]. Envelopes travel as JSON on
//! [`defaults::JOB_EVENTS_CHANNEL`].
//!
//! `publish` never touches the network: envelopes are queued on a bounded
//! channel and a single background task PUBLISHes them in order.

use std::time::Duration;

use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use vestige_core::{
    defaults, EventEnvelope, EventPublisher, JobEvent, NotificationBus, Result,
};

/// Event publisher that fans out through Redis.
///
/// Envelopes wait in a queue of [`defaults::RELAY_QUEUE_CAPACITY`] while the
/// publisher task works through them. When Redis stalls and the queue is
/// full, new events are dropped with a warning.
pub struct RedisEventRelay {
    outbound: mpsc::Sender<String>,
}

impl RedisEventRelay {
    /// Connect to Redis and start the outbound publisher task.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        Self::connect_with_channel(redis_url, defaults::JOB_EVENTS_CHANNEL).await
    }

    pub async fn connect_with_channel(redis_url: &str, channel: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let connection = ConnectionManager::new(client).await?;
        let (relay, rx) = Self::with_queue(defaults::RELAY_QUEUE_CAPACITY);

        tokio::spawn(run_publisher(connection, channel.to_string(), rx));
        info!(
            subsystem = "events",
            component = "relay",
            channel,
            queue_capacity = defaults::RELAY_QUEUE_CAPACITY,
            "Redis event relay connected"
        );
        Ok(relay)
    }

    fn with_queue(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (outbound, rx) = mpsc::channel(capacity.max(1));
        (Self { outbound }, rx)
    }
}

/// Subscriber side of the relay, run by the serving process.
///
/// Holds no connection until [`RedisEventListener::listen`] subscribes.
pub struct RedisEventListener {
    client: redis::Client,
    channel: String,
}

impl RedisEventListener {
    /// Validate the URL; the connection is made by `listen`.
    pub fn open(redis_url: &str) -> Result<Self> {
        Self::open_with_channel(redis_url, defaults::JOB_EVENTS_CHANNEL)
    }

    pub fn open_with_channel(redis_url: &str, channel: &str) -> Result<Self> {
        Ok(Self {
            client: redis::Client::open(redis_url)?,
            channel: channel.to_string(),
        })
    }

    /// Deliver relayed envelopes into `bus` until the task is aborted.
    ///
    /// Lost subscriptions are re-established with exponential backoff.
    pub fn listen(&self, bus: NotificationBus) -> JoinHandle<()> {
        let client = self.client.clone();
        let channel = self.channel.clone();
        tokio::spawn(async move {
            let base = Duration::from_millis(defaults::RELAY_RECONNECT_BASE_MS);
            let max = Duration::from_millis(defaults::RELAY_RECONNECT_MAX_MS);
            let mut backoff = base;

            loop {
                match forward_subscription(&client, &channel, &bus).await {
                    Ok(()) => {
                        warn!(
                            subsystem = "events",
                            component = "relay",
                            "Relay subscription closed, resubscribing"
                        );
                        backoff = base;
                        tokio::time::sleep(base).await;
                    }
                    Err(e) => {
                        warn!(
                            subsystem = "events",
                            component = "relay",
                            error = %e,
                            retry_ms = backoff.as_millis() as u64,
                            "Relay subscription failed"
                        );
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(max);
                    }
                }
            }
        })
    }
}

impl EventPublisher for RedisEventRelay {
    fn publish(&self, owner_id: &str, event: JobEvent) {
        let envelope = EventEnvelope::new(owner_id, event);
        let payload = match serde_json::to_string(&envelope) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(
                    subsystem = "events",
                    component = "relay",
                    error = %e,
                    "Failed to encode event envelope"
                );
                return;
            }
        };
        match self.outbound.try_send(payload) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => warn!(
                subsystem = "events",
                component = "relay",
                event_type = %envelope.event_type,
                job_id = %envelope.payload.job_id(),
                status = %envelope.payload.status(),
                "Relay queue full, event dropped"
            ),
            Err(TrySendError::Closed(_)) => warn!(
                subsystem = "events",
                component = "relay",
                event_type = %envelope.event_type,
                "Relay publisher stopped, event dropped"
            ),
        }
    }
}

async fn run_publisher(
    mut connection: ConnectionManager,
    channel: String,
    mut rx: mpsc::Receiver<String>,
) {
    while let Some(payload) = rx.recv().await {
        match connection.publish::<_, _, i64>(&channel, payload).await {
            Ok(receivers) => debug!(
                subsystem = "events",
                component = "relay",
                receivers,
                "Event relayed"
            ),
            Err(e) => warn!(
                subsystem = "events",
                component = "relay",
                error = %e,
                "Failed to publish event to Redis"
            ),
        }
    }
    debug!(subsystem = "events", component = "relay", "Relay publisher exiting");
}

async fn forward_subscription(
    client: &redis::Client,
    channel: &str,
    bus: &NotificationBus,
) -> Result<()> {
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.subscribe(channel).await?;
    info!(
        subsystem = "events",
        component = "relay",
        channel,
        "Relay subscribed"
    );

    let mut messages = std::pin::pin!(pubsub.on_message());
    while let Some(msg) = messages.next().await {
        match msg.get_payload::<String>() {
            Ok(payload) => {
                forward_payload(bus, &payload);
            }
            Err(e) => warn!(
                subsystem = "events",
                component = "relay",
                error = %e,
                "Unreadable relay message skipped"
            ),
        }
    }
    Ok(())
}

/// Decode one relayed envelope and deliver it locally. Returns whether the
/// payload was a valid envelope.
pub fn forward_payload(bus: &NotificationBus, payload: &str) -> bool {
    match serde_json::from_str::<EventEnvelope>(payload) {
        Ok(envelope) => {
            bus.deliver(envelope);
            true
        }
        Err(e) => {
            warn!(
                subsystem = "events",
                component = "relay",
                error = %e,
                "Malformed relay envelope skipped"
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vestige_core::{new_v7, JobStatus};

    #[tokio::test]
    async fn test_forward_payload_delivers_to_owner() {
        let bus = NotificationBus::default();
        let mut sub = bus.subscribe("alice");
        let envelope = EventEnvelope::new(
            "alice",
            JobEvent::JobCompleted {
                job_id: new_v7(),
                status: JobStatus::Completed,
            },
        );
        let payload = serde_json::to_string(&envelope).unwrap();

        assert!(forward_payload(&bus, &payload));
        let received = sub.try_recv().unwrap();
        assert_eq!(received.event_id, envelope.event_id);
        assert_eq!(received.event_type, "job_completed");
    }

    #[tokio::test]
    async fn test_forward_payload_skips_malformed() {
        let bus = NotificationBus::default();
        let mut sub = bus.subscribe("alice");

        assert!(!forward_payload(&bus, "not json"));
        assert!(!forward_payload(&bus, r#"{"event_type":"job_started"}"#));
        assert!(sub.try_recv().is_none());
    }

    fn started(title: &str) -> JobEvent {
        JobEvent::JobStarted {
            job_id: new_v7(),
            job_type: vestige_core::JobType::Trufor,
            status: JobStatus::Pending,
            title: title.to_string(),
        }
    }

    #[test]
    fn test_publish_drops_events_when_queue_full() {
        let (relay, mut rx) = RedisEventRelay::with_queue(3);

        for i in 0..10 {
            relay.publish("alice", started(&format!("scan {}", i)));
        }

        let mut queued = Vec::new();
        while let Ok(payload) = rx.try_recv() {
            queued.push(serde_json::from_str::<EventEnvelope>(&payload).unwrap());
        }
        assert_eq!(queued.len(), 3);
        // The oldest events are the ones kept
        let titles: Vec<_> = queued
            .iter()
            .map(|e| match &e.payload {
                JobEvent::JobStarted { title, .. } => title.clone(),
                other => panic!("unexpected event {:?}", other),
            })
            .collect();
        assert_eq!(titles, vec!["scan 0", "scan 1", "scan 2"]);
    }

    #[test]
    fn test_publish_after_publisher_stopped_is_silent() {
        let (relay, rx) = RedisEventRelay::with_queue(3);
        drop(rx);
        relay.publish("alice", started("scan"));
    }

    #[test]
    fn test_listener_rejects_invalid_url() {
        assert!(RedisEventListener::open("not a url").is_err());
        assert!(RedisEventListener::open("redis://localhost:6379").is_ok());
    }
}
