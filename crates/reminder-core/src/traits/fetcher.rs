//! Remote snapshot capability and the credential lookup it depends on.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{AccountIdentity, FetchError, Snapshot};

/// Fetches the current stamina of one game account.
#[async_trait]
pub trait SnapshotFetcher: Send + Sync {
    /// Name for logs.
    fn name(&self) -> &str;

    /// Fetch a fresh snapshot. Retries, token refresh and response parsing are
    /// the implementation's business; callers only see success or a
    /// classified failure.
    async fn fetch(
        &self,
        account_uid: &str,
        credential: &str,
    ) -> std::result::Result<Snapshot, FetchError>;
}

/// Looks up the remote session token bound to an account.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// `Ok(None)` means the account has no usable credential.
    async fn credential(&self, identity: &AccountIdentity) -> Result<Option<String>>;
}
