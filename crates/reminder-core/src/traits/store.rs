//! Durable per-account reminder state.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{AccountIdentity, RecordPatch, StaminaRecord};

/// Record store keyed by [`AccountIdentity`].
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, identity: &AccountIdentity) -> Result<Option<StaminaRecord>>;

    async fn get_all(&self) -> Result<Vec<StaminaRecord>>;

    /// Merge `patch` into the stored record, creating it when missing.
    async fn upsert(&self, identity: &AccountIdentity, patch: RecordPatch) -> Result<()>;

    /// Delete one record. Returns whether a row existed.
    async fn delete(&self, identity: &AccountIdentity) -> Result<bool>;

    /// Delete every record of a user on one bot channel.
    async fn delete_by_user(&self, owner_user_id: &str, bot_channel_id: &str) -> Result<usize>;
}
