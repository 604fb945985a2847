//! User activity lookups.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;

/// Answers whether a chat user has been active recently.
#[async_trait]
pub trait ActivityOracle: Send + Sync {
    async fn is_active(
        &self,
        owner_user_id: &str,
        bot_channel_id: &str,
        bot_instance_id: &str,
        window_days: u32,
        now: DateTime<Utc>,
    ) -> Result<bool>;
}
