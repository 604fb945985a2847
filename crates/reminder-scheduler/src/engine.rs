//! Reconciliation scheduler — the periodic sweep over every tracked account.
//! Uses tokio::interval for ticking; overlapping ticks are dropped, never queued.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use reminder_core::error::Result;
use reminder_core::traits::{
    NotificationContent, NotificationRenderer, RecordStore, StatusImageRenderer,
};
use reminder_core::types::{RecordPatch, StaminaRecord};
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;

use crate::policy::{Decision, ReminderPolicy, SkipReason};
use crate::queue::NotificationQueue;

/// Totals of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub skipped: usize,
    pub sent: usize,
    pub failed: usize,
    pub errored: usize,
}

/// What a call to [`ReconciliationScheduler::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Another sweep holds the run-lock.
    Busy,
    /// Push is switched off globally.
    Disabled,
    Completed(SweepReport),
}

enum RecordOutcome {
    Skipped(SkipReason),
    Sent,
    Failed,
}

/// The ticking orchestrator.
pub struct ReconciliationScheduler {
    policy: ReminderPolicy,
    store: Arc<dyn RecordStore>,
    queue: Arc<NotificationQueue>,
    renderer: Arc<dyn NotificationRenderer>,
    images: Arc<dyn StatusImageRenderer>,
    enabled: bool,
    mail_profile: String,
    run_lock: Mutex<()>,
}

impl ReconciliationScheduler {
    pub fn new(
        policy: ReminderPolicy,
        store: Arc<dyn RecordStore>,
        queue: Arc<NotificationQueue>,
        renderer: Arc<dyn NotificationRenderer>,
        images: Arc<dyn StatusImageRenderer>,
        enabled: bool,
        mail_profile: impl Into<String>,
    ) -> Self {
        Self {
            policy,
            store,
            queue,
            renderer,
            images,
            enabled,
            mail_profile: mail_profile.into(),
            run_lock: Mutex::new(()),
        }
    }

    /// Run one sweep now, unless one is already running.
    pub async fn tick(&self) -> TickOutcome {
        self.tick_at(Utc::now()).await
    }

    /// [`tick`](Self::tick) with an explicit clock.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> TickOutcome {
        let Ok(_guard) = self.run_lock.try_lock() else {
            tracing::debug!("⏳ Sweep still running, tick dropped");
            return TickOutcome::Busy;
        };
        if !self.enabled {
            tracing::debug!("🔕 Stamina push disabled, sweep skipped");
            return TickOutcome::Disabled;
        }
        TickOutcome::Completed(self.sweep_at(now).await)
    }

    async fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();
        let records = match self.store.get_all().await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!("⚠️ Failed to load stamina records: {e}");
                return report;
            }
        };

        for record in records {
            if record.identity.account_uid.trim().is_empty() {
                continue;
            }
            report.examined += 1;

            let outcome = AssertUnwindSafe(self.handle_record(&record, now))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(RecordOutcome::Skipped(reason))) => {
                    tracing::debug!("⏭️ {}: {reason}", record.identity);
                    report.skipped += 1;
                }
                Ok(Ok(RecordOutcome::Sent)) => report.sent += 1,
                Ok(Ok(RecordOutcome::Failed)) => report.failed += 1,
                Ok(Err(e)) => {
                    tracing::warn!("⚠️ {}: {e}", record.identity);
                    report.errored += 1;
                }
                Err(_) => {
                    tracing::error!("💥 {}: record handler panicked", record.identity);
                    report.errored += 1;
                }
            }
        }

        tracing::info!(
            "🔄 Sweep done: examined={} sent={} failed={} skipped={} errored={}",
            report.examined,
            report.sent,
            report.failed,
            report.skipped,
            report.errored
        );
        report
    }

    async fn handle_record(&self, record: &StaminaRecord, now: DateTime<Utc>) -> Result<RecordOutcome> {
        let evaluation = self.policy.evaluate(record, now).await?;
        if !evaluation.patch.is_empty() {
            self.store.upsert(&record.identity, evaluation.patch).await?;
        }

        let (threshold, snapshot) = match evaluation.decision {
            Decision::Skip(reason) => return Ok(RecordOutcome::Skipped(reason)),
            Decision::Send { threshold, snapshot } => (threshold, snapshot),
        };
        let Some(recipient) = record.email() else {
            return Ok(RecordOutcome::Skipped(SkipReason::NoEmail));
        };

        let content = NotificationContent {
            identity: record.identity.clone(),
            current_value: snapshot.value,
            threshold,
            observed_at: snapshot.observed_at,
            status_image: self.images.render(&record.identity, &snapshot),
        };
        let mail = self.renderer.render(&content);

        tracing::debug!(
            "📬 {}: stamina {} >= {threshold}, mailing {recipient}",
            record.identity,
            snapshot.value
        );
        let report = self
            .queue
            .submit(recipient, &mail.subject, &mail.html, &self.mail_profile)
            .await;

        let failures = if report.ok {
            0
        } else {
            record.consecutive_failures.saturating_add(1)
        };
        self.store
            .upsert(
                &record.identity,
                RecordPatch::new().send_outcome(now, report.ok, failures),
            )
            .await?;

        if report.ok {
            tracing::info!("✅ {}: reminder sent to {recipient}", record.identity);
            Ok(RecordOutcome::Sent)
        } else {
            tracing::warn!(
                "❌ {}: reminder to {recipient} failed ({failures} in a row): {}",
                record.identity,
                report.detail
            );
            Ok(RecordOutcome::Failed)
        }
    }
}

/// Spawn-able scheduler loop: one tick every `check_interval_secs`.
///
/// Sweeps run inside this future, so aborting its task also cancels a sweep
/// in progress. Ticks missed while a sweep runs are skipped.
pub async fn spawn_scheduler(scheduler: Arc<ReconciliationScheduler>, check_interval_secs: u64) {
    tracing::info!("⏰ Stamina scheduler started (check every {}s)", check_interval_secs);

    let mut interval =
        tokio::time::interval(std::time::Duration::from_secs(check_interval_secs.max(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        interval.tick().await;
        if let TickOutcome::Busy = scheduler.tick().await {
            tracing::info!("⏳ Previous sweep still running, skipping this tick");
        }
    }
}
