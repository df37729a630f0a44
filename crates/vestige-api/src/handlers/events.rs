//! Live job event stream (Server-Sent Events).
//!
//! `GET /api/v1/jobs/stream` subscribes the caller's owner to the
//! notification bus and forwards each envelope as
//!
//! ```text
//! event: job_progress
//! data: {"event_id":"...","event_type":"job_progress",...}
//! ```
//!
//! An idle stream receives a `: keepalive` comment every keepalive interval.
//! When the client goes away the stream, and with it the subscription, is
//! dropped.

use std::convert::Infallible;

use axum::extract::State;
use axum::http::{header, HeaderName, HeaderValue};
use axum::response::sse::{Event, KeepAlive};
use axum::response::{IntoResponse, Sse};
use futures::stream::{self, Stream};
use tracing::{info, warn};

use vestige_core::Subscription;

use crate::owner::OwnerId;
use crate::AppState;

/// Turn a bus subscription into an SSE event stream.
pub fn event_stream(subscription: Subscription) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(subscription, |mut sub| async move {
        loop {
            let envelope = sub.recv().await?;
            match Event::default()
                .event(envelope.event_type.as_str())
                .json_data(&envelope)
            {
                Ok(event) => return Some((Ok::<_, Infallible>(event), sub)),
                Err(e) => warn!(
                    subsystem = "api",
                    component = "stream",
                    owner_id = sub.owner_id(),
                    event_id = %envelope.event_id,
                    error = %e,
                    "Failed to encode job event, skipped"
                ),
            }
        }
    })
}

pub async fn stream_jobs(State(state): State<AppState>, owner: OwnerId) -> impl IntoResponse {
    let subscription = state.bus.subscribe(owner.as_str());
    info!(
        subsystem = "api",
        component = "stream",
        owner_id = owner.as_str(),
        subscription_id = subscription.id(),
        subscriber_count = state.bus.subscriber_count(owner.as_str()),
        total_subscribers = state.bus.total_subscribers(),
        "Job stream opened"
    );

    let sse = Sse::new(event_stream(subscription)).keep_alive(
        KeepAlive::new()
            .interval(state.stream_keepalive)
            .text("keepalive"),
    );

    (
        [
            (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
            (
                HeaderName::from_static("x-accel-buffering"),
                HeaderValue::from_static("no"),
            ),
        ],
        sse,
    )
}
