//! # vestige-jobs
//!
//! Job lifecycle tracking for vestige.
//!
//! This crate provides:
//! - [`JobLifecycleTracker`], which analysis producers call to create jobs
//!   and report progress and completion
//! - a retention sweeper that purges expired job records
//! - [`RedisEventRelay`] and [`RedisEventListener`], carrying job events
//!   between processes
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use vestige_core::{JobStatus, JobType, NotificationBus};
//! use vestige_db::Database;
//! use vestige_jobs::{JobLifecycleTracker, TrackerConfig};
//!
//! let db = Database::connect("postgres://...").await?;
//! let bus = NotificationBus::default();
//! let tracker = JobLifecycleTracker::new(
//!     Arc::new(db.jobs.clone()),
//!     Arc::new(bus.clone()),
//!     TrackerConfig::from_env(),
//! );
//!
//! let job_id = tracker.create("owner-1", JobType::Trufor, "TruFor scan", None).await?;
//! tracker.progress("owner-1", job_id, None, Some(50), Some("halfway".into())).await;
//! tracker.complete("owner-1", job_id, JobStatus::Completed, None, vec![]).await;
//! ```

pub mod relay;
pub mod retention;
pub mod tracker;

pub use relay::{RedisEventListener, RedisEventRelay};
pub use retention::{spawn_retention_sweeper, sweep_once, SweeperConfig, SweeperHandle};
pub use tracker::{JobLifecycleTracker, TrackerConfig};
