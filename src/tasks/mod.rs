//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - L1 expiry sweep: purges expired L1 entries at configured intervals
//! - Warm-up: populates every domain from its root entities
//! - Refresh: evicts entities changed within a recent window

mod cleanup;
mod scheduler;
mod warmup;

pub use cleanup::spawn_cleanup_task;
pub use scheduler::{spawn_refresh_task, spawn_warmup_task};
pub use warmup::{WarmUpReport, WarmUpRoot, WarmUpScheduler};
