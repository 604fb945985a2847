//! Reminder policy — decides, per record, whether a reminder should go out.
//!
//! Gates run cheapest first: record flags, activity, cooldown, a local
//! stamina projection, then the stored credential status. Only a record
//! that survives all of them costs a remote snapshot call, and only a
//! confirmed value at or above the threshold produces a send.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use reminder_core::error::Result;
use reminder_core::traits::{ActivityOracle, CredentialSource, SnapshotFetcher};
use reminder_core::types::{
    FetchError, FetchFailureKind, Observation, RecordPatch, SECS_PER_STAMINA, Snapshot, StaminaRecord,
    THRESHOLD_MAX, THRESHOLD_MIN,
};

/// Why a record produced no reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    SwitchOff,
    NoEmail,
    Suppressed,
    Inactive,
    Cooldown,
    BelowThreshold,
    FetchFailed(FetchFailureKind),
    ConfirmedBelowThreshold,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::SwitchOff => write!(f, "push switched off"),
            SkipReason::NoEmail => write!(f, "no email"),
            SkipReason::Suppressed => write!(f, "too many consecutive failures"),
            SkipReason::Inactive => write!(f, "user inactive"),
            SkipReason::Cooldown => write!(f, "cooldown"),
            SkipReason::BelowThreshold => write!(f, "projected below threshold"),
            SkipReason::FetchFailed(FetchFailureKind::InvalidCredential) => {
                write!(f, "credential invalid")
            }
            SkipReason::FetchFailed(FetchFailureKind::Transient) => write!(f, "fetch failed"),
            SkipReason::ConfirmedBelowThreshold => write!(f, "confirmed below threshold"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Skip(SkipReason),
    Send { threshold: u32, snapshot: Snapshot },
}

/// A decision plus the state changes the caller persists either way.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub decision: Decision,
    pub patch: RecordPatch,
}

impl Evaluation {
    fn skip(reason: SkipReason) -> Self {
        Self {
            decision: Decision::Skip(reason),
            patch: RecordPatch::new(),
        }
    }
}

/// Outcome of the I/O-free gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalVerdict {
    Skip(SkipReason),
    /// Remote confirmation needed. `projected` is `None` without a prior observation.
    NeedsConfirmation { threshold: u32, projected: Option<u32> },
}

/// Clamp an override (or the default) into the accepted range.
pub fn resolve_threshold(override_value: Option<u32>, default: u32) -> u32 {
    override_value
        .unwrap_or(default)
        .clamp(THRESHOLD_MIN, THRESHOLD_MAX)
}

/// Minimum hours between two successful reminders.
pub fn cooldown_hours(threshold: u32) -> i64 {
    (i64::from(threshold) / 10 - 1).max(1)
}

/// Whether enough time has passed since the last successful send.
/// An account that never received a reminder is always cleared.
pub fn cooldown_cleared(record: &StaminaRecord, threshold: u32, now: DateTime<Utc>) -> bool {
    match record.last_send_success_at {
        None => true,
        Some(last) => (now - last).num_seconds() >= cooldown_hours(threshold) * 3600,
    }
}

/// Stamina expected at `now`, one point per 6 minutes, capped at the maximum.
pub fn project_stamina(observation: &Observation, now: DateTime<Utc>) -> u32 {
    let elapsed = (now - observation.observed_at).num_seconds().max(0);
    let regen = u32::try_from(elapsed / SECS_PER_STAMINA).unwrap_or(u32::MAX);
    let cap = THRESHOLD_MAX.max(observation.value);
    observation.value.saturating_add(regen).min(cap)
}

fn record_gate(record: &StaminaRecord) -> Option<SkipReason> {
    if !record.notification_enabled {
        Some(SkipReason::SwitchOff)
    } else if record.email().is_none() {
        Some(SkipReason::NoEmail)
    } else if record.is_suppressed() {
        Some(SkipReason::Suppressed)
    } else {
        None
    }
}

/// Every gate that needs no I/O: flags, threshold, cooldown, projection.
pub fn local_verdict(record: &StaminaRecord, default_threshold: u32, now: DateTime<Utc>) -> LocalVerdict {
    if let Some(reason) = record_gate(record) {
        return LocalVerdict::Skip(reason);
    }

    let threshold = resolve_threshold(record.threshold, default_threshold);
    if !cooldown_cleared(record, threshold, now) {
        return LocalVerdict::Skip(SkipReason::Cooldown);
    }

    let projected = record.last_observation.map(|obs| project_stamina(&obs, now));
    match projected {
        Some(p) if p < threshold => LocalVerdict::Skip(SkipReason::BelowThreshold),
        _ => LocalVerdict::NeedsConfirmation { threshold, projected },
    }
}

/// The reminder policy with its collaborators.
pub struct ReminderPolicy {
    activity: Arc<dyn ActivityOracle>,
    credentials: Arc<dyn CredentialSource>,
    fetcher: Arc<dyn SnapshotFetcher>,
    default_threshold: u32,
    active_user_days: u32,
}

impl ReminderPolicy {
    pub fn new(
        activity: Arc<dyn ActivityOracle>,
        credentials: Arc<dyn CredentialSource>,
        fetcher: Arc<dyn SnapshotFetcher>,
        default_threshold: u32,
        active_user_days: u32,
    ) -> Self {
        Self {
            activity,
            credentials,
            fetcher,
            default_threshold,
            active_user_days,
        }
    }

    pub fn default_threshold(&self) -> u32 {
        self.default_threshold
    }

    /// Evaluate one record at `now`.
    pub async fn evaluate(&self, record: &StaminaRecord, now: DateTime<Utc>) -> Result<Evaluation> {
        if let Some(reason) = record_gate(record) {
            return Ok(Evaluation::skip(reason));
        }

        if self.active_user_days > 0 {
            let id = &record.identity;
            let active = self
                .activity
                .is_active(
                    &id.owner_user_id,
                    &id.bot_channel_id,
                    &id.bot_instance_id,
                    self.active_user_days,
                    now,
                )
                .await?;
            if !active {
                return Ok(Evaluation::skip(SkipReason::Inactive));
            }
        }

        let threshold = match local_verdict(record, self.default_threshold, now) {
            LocalVerdict::Skip(reason) => return Ok(Evaluation::skip(reason)),
            LocalVerdict::NeedsConfirmation { threshold, projected } => {
                tracing::debug!(
                    "🔎 {}: projected {:?} >= threshold {threshold}, confirming via {}",
                    record.identity,
                    projected,
                    self.fetcher.name()
                );
                threshold
            }
        };

        // A token already rejected stays unused until the account is re-bound.
        if record.credential_valid == Some(false) {
            return Ok(Evaluation::skip(SkipReason::FetchFailed(
                FetchFailureKind::InvalidCredential,
            )));
        }

        let id = &record.identity;
        let fetched = match self.credentials.credential(id).await? {
            Some(token) => self.fetcher.fetch(&id.account_uid, &token).await,
            None => Err(FetchError::invalid_credential("no credential bound")),
        };

        let snapshot = match fetched {
            Ok(s) => s,
            Err(e) => {
                let mut patch = RecordPatch::new();
                if e.kind == FetchFailureKind::InvalidCredential {
                    patch = patch.credential_valid(false);
                }
                tracing::debug!("📡 {id}: {e}");
                return Ok(Evaluation {
                    decision: Decision::Skip(SkipReason::FetchFailed(e.kind)),
                    patch,
                });
            }
        };

        let patch = RecordPatch::new()
            .observation(snapshot.observation())
            .credential_valid(true);
        let decision = if snapshot.value < threshold {
            Decision::Skip(SkipReason::ConfirmedBelowThreshold)
        } else {
            Decision::Send {
                threshold,
                snapshot,
            }
        };
        Ok(Evaluation { decision, patch })
    }
}
