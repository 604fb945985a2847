//! Outbound mail boundary.

use async_trait::async_trait;

use crate::types::DeliveryResult;

/// Sends one message through a named provider profile.
///
/// Implementations must never panic or error past this boundary: every
/// transport failure comes back as `DeliveryResult { ok: false, .. }`.
/// `send` runs on the delivery queue's worker task, not the caller's.
#[async_trait]
pub trait DeliveryGateway: Send + Sync {
    async fn send(&self, recipient: &str, subject: &str, body: &str, profile: &str)
    -> DeliveryResult;
}
