//! Periodic sheet synchronization.

pub mod broadcaster;
pub mod service;

pub use broadcaster::{DashboardEvent, StateBroadcaster};
pub use service::{SyncFailure, SyncOutcome, SyncService};
