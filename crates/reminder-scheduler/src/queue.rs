//! Notification queue — one consumer, one delivery per interval.
//!
//! Producers `submit` and await their own job's report. A single worker task
//! drains the channel, calls the gateway, counts the outcome and then pauses,
//! which is the global send-rate limit. The worker is supervised: `submit`
//! restarts it if it has died.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use reminder_core::config::QueueConfig;
use reminder_core::traits::DeliveryGateway;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::counters::DailyCounters;

/// One outbound mail waiting for the worker.
pub struct MailJob {
    pub id: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub profile: String,
    reply: oneshot::Sender<DeliveryReport>,
}

/// Resolution of a [`MailJob`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub ok: bool,
    pub detail: String,
    pub finished_at: DateTime<Utc>,
}

impl DeliveryReport {
    fn new(ok: bool, detail: impl Into<String>) -> Self {
        Self {
            ok,
            detail: detail.into(),
            finished_at: Utc::now(),
        }
    }
}

/// Worker lifecycle.
pub enum WorkerState {
    Stopped,
    Running(JoinHandle<()>),
}

/// Everything the drain loop needs, cloned into each spawned worker.
#[derive(Clone)]
struct Worker {
    rx: Arc<Mutex<mpsc::UnboundedReceiver<MailJob>>>,
    gateway: Arc<dyn DeliveryGateway>,
    counters: Arc<DailyCounters>,
    send_interval: Duration,
    job_deadline: Option<Duration>,
}

impl Worker {
    async fn run(self) {
        loop {
            let job = {
                let mut rx = self.rx.lock().await;
                rx.recv().await
            };
            let Some(job) = job else {
                tracing::debug!("📪 Notification queue closed");
                break;
            };

            let report = self.deliver(&job).await;
            if let Err(e) = self.counters.record(report.ok) {
                tracing::warn!("⚠️ Failed to update daily counters: {e}");
            }
            tracing::info!(
                target: "mail",
                "job={} to={} profile={} ok={} detail={}",
                job.id,
                job.recipient,
                job.profile,
                report.ok,
                report.detail
            );
            // The submitter may have given up; nothing else to do then.
            let _ = job.reply.send(report);

            tokio::time::sleep(self.send_interval).await;
        }
    }

    async fn deliver(&self, job: &MailJob) -> DeliveryReport {
        let send = AssertUnwindSafe(self.gateway.send(
            &job.recipient,
            &job.subject,
            &job.body,
            &job.profile,
        ))
        .catch_unwind();

        let outcome = match self.job_deadline {
            Some(deadline) => match tokio::time::timeout(deadline, send).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return DeliveryReport::new(
                        false,
                        format!("delivery timed out after {}s", deadline.as_secs()),
                    );
                }
            },
            None => send.await,
        };

        match outcome {
            Ok(result) => DeliveryReport::new(result.ok, result.detail),
            Err(_) => {
                tracing::error!("💥 Gateway panicked while sending job {}", job.id);
                DeliveryReport::new(false, "delivery panicked")
            }
        }
    }
}

/// Rate-limited, single-consumer delivery queue.
pub struct NotificationQueue {
    tx: mpsc::UnboundedSender<MailJob>,
    worker: Worker,
    state: Mutex<WorkerState>,
}

impl NotificationQueue {
    pub fn new(
        gateway: Arc<dyn DeliveryGateway>,
        counters: Arc<DailyCounters>,
        config: &QueueConfig,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let job_deadline =
            (config.job_deadline_secs > 0).then(|| Duration::from_secs(config.job_deadline_secs));
        Self {
            tx,
            worker: Worker {
                rx: Arc::new(Mutex::new(rx)),
                gateway,
                counters,
                send_interval: Duration::from_millis(config.send_interval_ms),
                job_deadline,
            },
            state: Mutex::new(WorkerState::Stopped),
        }
    }

    /// Start the worker unless one is alive. Returns true when a worker was spawned.
    pub async fn ensure_running(&self) -> bool {
        let mut state = self.state.lock().await;
        match &*state {
            WorkerState::Running(handle) if !handle.is_finished() => return false,
            WorkerState::Running(_) => tracing::warn!("🔁 Mail worker died, restarting"),
            WorkerState::Stopped => tracing::info!("📮 Mail worker started"),
        }
        *state = WorkerState::Running(tokio::spawn(self.worker.clone().run()));
        true
    }

    pub async fn is_running(&self) -> bool {
        matches!(&*self.state.lock().await, WorkerState::Running(h) if !h.is_finished())
    }

    /// Enqueue one mail and wait for its report.
    pub async fn submit(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
        profile: &str,
    ) -> DeliveryReport {
        self.ensure_running().await;

        let (reply, report) = oneshot::channel();
        let job = MailJob {
            id: uuid::Uuid::new_v4().to_string(),
            recipient: recipient.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            profile: profile.to_string(),
            reply,
        };
        let id = job.id.clone();
        if self.tx.send(job).is_err() {
            return DeliveryReport::new(false, "notification queue closed");
        }
        tracing::debug!("📨 Queued mail job {id} for {recipient}");

        report
            .await
            .unwrap_or_else(|_| DeliveryReport::new(false, "delivery dropped before completion"))
    }

    /// Abort the worker. Queued jobs stay queued until the next `submit`.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        if let WorkerState::Running(handle) = std::mem::replace(&mut *state, WorkerState::Stopped) {
            handle.abort();
            tracing::info!("🛑 Mail worker stopped");
        }
    }
}
