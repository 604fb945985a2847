//! # Rover Reminder Core
//!
//! Shared types, collaborator traits, configuration and errors for the
//! stamina reminder workspace.

pub mod config;
pub mod error;
pub mod settings;
pub mod traits;
pub mod types;

pub use config::ReminderConfig;
pub use error::{ReminderError, Result};
pub use types::{
    AccountIdentity, DeliveryResult, FetchError, FetchFailureKind, Observation, RecordPatch,
    Snapshot, StaminaRecord,
};
