//! Shared constants for [`crate::command::TaskData`] (spec §4.4:
//! "Retries are capped at `Task.max_retries` (default 3)").

pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Reconciliation sweep cadence (spec §4.4: "scheduled per-minute").
pub const RECONCILE_INTERVAL_SECS: u64 = 60;
