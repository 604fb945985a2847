//! # Rover Reminder Scheduler
//!
//! Periodic stamina reconciliation with a rate-limited mail queue.
//!
//! ## Architecture
//! ```text
//! spawn_scheduler (tokio interval, skip missed ticks)
//!   └── ReconciliationScheduler::tick (try_lock run-lock)
//!         └── for each StaminaRecord
//!               ├── ReminderPolicy: flags → activity → cooldown → projection → remote confirm
//!               └── Send → NotificationQueue::submit
//!                            └── single worker: gateway → DailyCounters → mail log → pause
//! ```

pub mod counters;
pub mod engine;
pub mod persistence;
pub mod policy;
pub mod queue;

pub use counters::{DailyCounters, DayCount};
pub use engine::{ReconciliationScheduler, SweepReport, TickOutcome, spawn_scheduler};
pub use persistence::SqliteRecordStore;
pub use policy::{Decision, Evaluation, LocalVerdict, ReminderPolicy, SkipReason};
pub use queue::{DeliveryReport, NotificationQueue, WorkerState};
