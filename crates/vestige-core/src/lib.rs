//! # vestige-core
//!
//! Core types, traits, and abstractions for vestige.
//!
//! This crate holds the job and relationship models, the store and
//! collaborator traits the other crates implement, and the per-owner
//! [`NotificationBus`] that carries job lifecycle events to live streams.

pub mod defaults;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod traits;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use events::{EventEnvelope, JobEvent, NotificationBus, Subscription, SubscriptionId};
pub use models::*;
pub use traits::*;
pub use uuid_utils::new_v7;
