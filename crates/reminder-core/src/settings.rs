//! User-facing settings operations: push switch, notification email, threshold.
//!
//! These are the operations a chat front end (or the admin CLI) calls. Each
//! validates its input, writes a [`RecordPatch`] and returns the stored record.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::PushConfig;
use crate::error::{ReminderError, Result};
use crate::traits::RecordStore;
use crate::types::{AccountIdentity, RecordPatch, StaminaRecord, THRESHOLD_MAX, THRESHOLD_MIN};

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("valid email pattern")
});

/// Whether `email` looks like a deliverable address.
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email)
}

/// Address inferred for users whose chat id is a QQ number.
pub fn default_email_for(owner_user_id: &str) -> Option<String> {
    let id = owner_user_id.trim();
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
        Some(format!("{id}@qq.com"))
    } else {
        None
    }
}

async fn reload(store: &dyn RecordStore, identity: &AccountIdentity) -> Result<StaminaRecord> {
    store
        .get(identity)
        .await?
        .ok_or_else(|| ReminderError::NotFound(identity.to_string()))
}

/// Turn stamina reminders on or off for one account.
///
/// Enabling an account without an email infers `{user_id}@qq.com` when the
/// user id is numeric (and clears the failure counter); otherwise it fails
/// with [`ReminderError::MissingEmail`].
pub async fn set_push_switch(
    store: &dyn RecordStore,
    push: &PushConfig,
    identity: &AccountIdentity,
    enabled: bool,
) -> Result<StaminaRecord> {
    if !push.enabled {
        return Err(ReminderError::PushDisabled);
    }

    let mut patch = RecordPatch::new().notification_enabled(enabled);
    if enabled {
        let existing = store.get(identity).await?;
        let has_email = existing.as_ref().and_then(|r| r.email()).is_some();
        if !has_email {
            let email = default_email_for(&identity.owner_user_id)
                .ok_or_else(|| ReminderError::MissingEmail(identity.account_uid.clone()))?;
            tracing::info!("📧 Inferred notification email {email} for {identity}");
            patch = patch.notify_email(Some(email)).consecutive_failures(0);
        }
    }

    store.upsert(identity, patch).await?;
    reload(store, identity).await
}

/// Set the notification address. Resets the delivery failure counter.
pub async fn set_push_email(
    store: &dyn RecordStore,
    identity: &AccountIdentity,
    email: &str,
) -> Result<StaminaRecord> {
    let email = email.trim();
    if !is_valid_email(email) {
        return Err(ReminderError::Validation(format!("invalid email address: {email}")));
    }

    let patch = RecordPatch::new()
        .notify_email(Some(email.to_string()))
        .consecutive_failures(0);
    store.upsert(identity, patch).await?;
    reload(store, identity).await
}

/// Set the per-account threshold override.
pub async fn set_push_threshold(
    store: &dyn RecordStore,
    identity: &AccountIdentity,
    threshold: u32,
) -> Result<StaminaRecord> {
    if !(THRESHOLD_MIN..=THRESHOLD_MAX).contains(&threshold) {
        return Err(ReminderError::Validation(format!(
            "threshold must be within {THRESHOLD_MIN}..={THRESHOLD_MAX}, got {threshold}"
        )));
    }

    store
        .upsert(identity, RecordPatch::new().threshold(Some(threshold)))
        .await?;
    reload(store, identity).await
}
