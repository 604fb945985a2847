//! # Rover Reminder API
//!
//! Remote stamina snapshots from the Kuro game widget endpoint.

pub mod kuro;
pub mod response;

pub use kuro::KuroClient;
