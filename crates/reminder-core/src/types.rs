//! Domain types — tracked accounts, their stamina records, and partial updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lowest accepted reminder threshold.
pub const THRESHOLD_MIN: u32 = 120;
/// Highest accepted reminder threshold (also the stamina capacity).
pub const THRESHOLD_MAX: u32 = 240;
/// Consecutive delivery failures after which an account stops receiving reminders.
pub const SUPPRESS_AFTER_FAILURES: u32 = 5;
/// One stamina point regenerates every 6 minutes.
pub const SECS_PER_STAMINA: i64 = 360;

/// Composite key of one tracked account inside one bot deployment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountIdentity {
    /// Chat user that owns the account.
    pub owner_user_id: String,
    /// Bot channel (adapter) the user talks through.
    pub bot_channel_id: String,
    /// Bot instance inside the channel. May be empty.
    pub bot_instance_id: String,
    /// Game account uid.
    pub account_uid: String,
}

impl AccountIdentity {
    pub fn new(
        owner_user_id: impl Into<String>,
        bot_channel_id: impl Into<String>,
        bot_instance_id: impl Into<String>,
        account_uid: impl Into<String>,
    ) -> Self {
        Self {
            owner_user_id: owner_user_id.into(),
            bot_channel_id: bot_channel_id.into(),
            bot_instance_id: bot_instance_id.into(),
            account_uid: account_uid.into(),
        }
    }
}

impl std::fmt::Display for AccountIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.owner_user_id, self.bot_channel_id, self.bot_instance_id, self.account_uid
        )
    }
}

/// A confirmed stamina reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub observed_at: DateTime<Utc>,
    pub value: u32,
}

impl Observation {
    pub fn new(observed_at: DateTime<Utc>, value: u32) -> Self {
        Self { observed_at, value }
    }
}

/// Persistent reminder state for one account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaminaRecord {
    pub identity: AccountIdentity,
    /// Last confirmed remote snapshot.
    pub last_observation: Option<Observation>,
    /// User-controlled reminder switch.
    pub notification_enabled: bool,
    pub notify_email: Option<String>,
    /// Per-account threshold override. Clamped before use.
    pub threshold: Option<u32>,
    /// Last known remote credential status.
    pub credential_valid: Option<bool>,
    pub last_send_attempt_at: Option<DateTime<Utc>>,
    /// Outcome of the most recent send attempt.
    pub last_send_ok: Option<bool>,
    pub last_send_success_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
}

impl StaminaRecord {
    /// A fresh record with every field defaulted.
    pub fn new(identity: AccountIdentity) -> Self {
        Self {
            identity,
            last_observation: None,
            notification_enabled: false,
            notify_email: None,
            threshold: None,
            credential_valid: None,
            last_send_attempt_at: None,
            last_send_ok: None,
            last_send_success_at: None,
            consecutive_failures: 0,
        }
    }

    /// The notification address, ignoring blank values.
    pub fn email(&self) -> Option<&str> {
        self.notify_email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }

    /// Whether repeated delivery failures have silenced this account.
    pub fn is_suppressed(&self) -> bool {
        self.consecutive_failures >= SUPPRESS_AFTER_FAILURES
    }
}

/// Partial update for a [`StaminaRecord`]. Only fields that are set are applied.
///
/// Nullable columns take `Option<Option<T>>` so a patch can clear them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPatch {
    pub last_observation: Option<Observation>,
    pub notification_enabled: Option<bool>,
    pub notify_email: Option<Option<String>>,
    pub threshold: Option<Option<u32>>,
    pub credential_valid: Option<bool>,
    pub last_send_attempt_at: Option<DateTime<Utc>>,
    pub last_send_ok: Option<bool>,
    pub last_send_success_at: Option<DateTime<Utc>>,
    pub consecutive_failures: Option<u32>,
}

impl RecordPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observation(mut self, observation: Observation) -> Self {
        self.last_observation = Some(observation);
        self
    }

    pub fn notification_enabled(mut self, enabled: bool) -> Self {
        self.notification_enabled = Some(enabled);
        self
    }

    pub fn notify_email(mut self, email: Option<String>) -> Self {
        self.notify_email = Some(email);
        self
    }

    pub fn threshold(mut self, threshold: Option<u32>) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn credential_valid(mut self, valid: bool) -> Self {
        self.credential_valid = Some(valid);
        self
    }

    pub fn consecutive_failures(mut self, count: u32) -> Self {
        self.consecutive_failures = Some(count);
        self
    }

    /// Record the outcome of one delivery attempt made at `at`.
    pub fn send_outcome(mut self, at: DateTime<Utc>, ok: bool, failures: u32) -> Self {
        self.last_send_attempt_at = Some(at);
        self.last_send_ok = Some(ok);
        if ok {
            self.last_send_success_at = Some(at);
        }
        self.consecutive_failures = Some(failures);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Merge this patch into `record`.
    ///
    /// `last_send_success_at` only ever moves forward.
    pub fn apply_to(&self, record: &mut StaminaRecord) {
        if let Some(obs) = self.last_observation {
            record.last_observation = Some(obs);
        }
        if let Some(enabled) = self.notification_enabled {
            record.notification_enabled = enabled;
        }
        if let Some(email) = &self.notify_email {
            record.notify_email = email.clone();
        }
        if let Some(threshold) = self.threshold {
            record.threshold = threshold;
        }
        if let Some(valid) = self.credential_valid {
            record.credential_valid = Some(valid);
        }
        if let Some(at) = self.last_send_attempt_at {
            record.last_send_attempt_at = Some(at);
        }
        if let Some(ok) = self.last_send_ok {
            record.last_send_ok = Some(ok);
        }
        if let Some(at) = self.last_send_success_at {
            record.last_send_success_at = Some(match record.last_send_success_at {
                Some(prev) if prev > at => prev,
                _ => at,
            });
        }
        if let Some(count) = self.consecutive_failures {
            record.consecutive_failures = count;
        }
    }
}

/// A remote stamina snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub value: u32,
    pub observed_at: DateTime<Utc>,
    /// Maximum stamina reported by the provider, if any.
    pub capacity: Option<u32>,
    /// Provider payload, forwarded to status image renderers.
    pub raw: Option<serde_json::Value>,
}

impl Snapshot {
    pub fn observation(&self) -> Observation {
        Observation::new(self.observed_at, self.value)
    }
}

/// Why a remote fetch failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchFailureKind {
    /// The session token is rejected; the user must log in again.
    InvalidCredential,
    /// Network or provider hiccup; the next sweep will try again.
    Transient,
}

/// A definite snapshot fetch failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    pub kind: FetchFailureKind,
    pub detail: String,
}

impl FetchError {
    pub fn invalid_credential(detail: impl Into<String>) -> Self {
        Self {
            kind: FetchFailureKind::InvalidCredential,
            detail: detail.into(),
        }
    }

    pub fn transient(detail: impl Into<String>) -> Self {
        Self {
            kind: FetchFailureKind::Transient,
            detail: detail.into(),
        }
    }
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.detail)
    }
}

/// Uniform result of one delivery through a gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryResult {
    pub ok: bool,
    pub detail: String,
}

impl DeliveryResult {
    pub fn ok() -> Self {
        Self {
            ok: true,
            detail: "ok".into(),
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            ok: false,
            detail: detail.into(),
        }
    }
}
