//! Fire-and-forget email side effects.
//!
//! Jobs carry primitives only, since they run after the triggering
//! transaction is gone. `dispatch` is the single place where enqueue
//! failures are logged and swallowed.

use crate::error::{AppError, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DispatchJob {
    JoinRequestSubmitted {
        tutor_email: String,
        student_username: String,
        community_name: String,
    },
    JoinRequestResolved {
        student_email: String,
        community_name: String,
        approved: bool,
    },
    ParticipantRemoved {
        student_email: String,
        community_name: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl DispatchJob {
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchJob::JoinRequestSubmitted { .. } => "join_request_submitted",
            DispatchJob::JoinRequestResolved { .. } => "join_request_resolved",
            DispatchJob::ParticipantRemoved { .. } => "participant_removed",
        }
    }

    pub fn render(&self, from: &str) -> Email {
        let (to, subject, body) = match self {
            DispatchJob::JoinRequestSubmitted {
                tutor_email,
                student_username,
                community_name,
            } => (
                tutor_email,
                format!("New join request for {community_name}"),
                format!(
                    "User {student_username} has requested to join your community: {community_name}. \
                     Please review the request in the Tutor dashboard."
                ),
            ),
            DispatchJob::JoinRequestResolved {
                student_email,
                community_name,
                approved: true,
            } => (
                student_email,
                format!("Your join request for {community_name} has been approved"),
                format!(
                    "Your request to join {community_name} has been approved. You can now access the community."
                ),
            ),
            DispatchJob::JoinRequestResolved {
                student_email,
                community_name,
                approved: false,
            } => (
                student_email,
                format!("Your join request for {community_name} has been rejected"),
                format!("Your request to join {community_name} has been rejected by the tutor."),
            ),
            DispatchJob::ParticipantRemoved {
                student_email,
                community_name,
            } => (
                student_email,
                format!("You have been removed from {community_name}"),
                format!("You have been removed from {community_name} by the tutor."),
            ),
        };

        Email {
            from: from.to_string(),
            to: to.clone(),
            subject,
            body,
        }
    }
}

/// Outbound email transport. Delivery mechanics live behind this seam.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> anyhow::Result<()>;
}

/// Writes emails to the log instead of delivering them
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: Email) -> anyhow::Result<()> {
        tracing::info!(to = %email.to, subject = %email.subject, "Email dispatched");
        Ok(())
    }
}

/// Handle used by request paths to enqueue jobs
#[derive(Clone)]
pub struct NotificationDispatcher {
    tx: mpsc::Sender<DispatchJob>,
}

impl NotificationDispatcher {
    /// Bounded queue plus the worker that drains it.
    pub fn new(
        capacity: usize,
        mailer: Arc<dyn Mailer>,
        from: impl Into<String>,
    ) -> (Self, DispatchWorker) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = DispatchWorker {
            rx,
            mailer,
            from: from.into(),
        };
        (Self { tx }, worker)
    }

    /// Creates the dispatcher and runs its worker on the current runtime.
    pub fn spawn(
        capacity: usize,
        mailer: Arc<dyn Mailer>,
        from: impl Into<String>,
    ) -> (Self, JoinHandle<()>) {
        let (dispatcher, worker) = Self::new(capacity, mailer, from);
        let handle = tokio::spawn(worker.run());
        (dispatcher, handle)
    }

    fn enqueue(&self, job: DispatchJob) -> Result<()> {
        self.tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(job) => {
                AppError::DispatchUnavailable(format!("queue full, dropped {}", job.kind()))
            }
            mpsc::error::TrySendError::Closed(job) => {
                AppError::DispatchUnavailable(format!("queue closed, dropped {}", job.kind()))
            }
        })
    }

    /// Never blocks and never fails the caller.
    pub fn dispatch(&self, job: DispatchJob) {
        let kind = job.kind();
        match self.enqueue(job) {
            Ok(()) => tracing::debug!(kind, "Dispatch job enqueued"),
            Err(e) => tracing::warn!(kind, error = %e, "Notification not dispatched"),
        }
    }
}

pub struct DispatchWorker {
    rx: mpsc::Receiver<DispatchJob>,
    mailer: Arc<dyn Mailer>,
    from: String,
}

impl DispatchWorker {
    /// Runs until every dispatcher handle is dropped. Failed sends are
    /// logged and not retried.
    pub async fn run(mut self) {
        while let Some(job) = self.rx.recv().await {
            let email = job.render(&self.from);
            if let Err(e) = self.mailer.send(email).await {
                tracing::warn!(kind = job.kind(), error = %e, "Email delivery failed");
            }
        }
        tracing::debug!("Dispatch worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<Email>>,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, email: Email) -> anyhow::Result<()> {
            self.sent.lock().await.push(email);
            Ok(())
        }
    }

    struct FailingMailer;

    #[async_trait]
    impl Mailer for FailingMailer {
        async fn send(&self, _email: Email) -> anyhow::Result<()> {
            anyhow::bail!("smtp unreachable")
        }
    }

    fn removed() -> DispatchJob {
        DispatchJob::ParticipantRemoved {
            student_email: "s@example.com".to_string(),
            community_name: "Math 101".to_string(),
        }
    }

    #[test]
    fn test_render_resolution_outcomes() {
        let approved = DispatchJob::JoinRequestResolved {
            student_email: "s@example.com".to_string(),
            community_name: "Math 101".to_string(),
            approved: true,
        }
        .render("noreply@classhub.local");
        assert_eq!(approved.to, "s@example.com");
        assert_eq!(approved.subject, "Your join request for Math 101 has been approved");

        let rejected = DispatchJob::JoinRequestResolved {
            student_email: "s@example.com".to_string(),
            community_name: "Math 101".to_string(),
            approved: false,
        }
        .render("noreply@classhub.local");
        assert!(rejected.body.contains("rejected by the tutor"));
    }

    #[tokio::test]
    async fn test_full_queue_is_swallowed() {
        let (dispatcher, _worker) = NotificationDispatcher::new(1, Arc::new(LogMailer), "x");

        assert!(dispatcher.enqueue(removed()).is_ok());
        assert!(matches!(
            dispatcher.enqueue(removed()),
            Err(AppError::DispatchUnavailable(_))
        ));
        // the public boundary never surfaces the failure
        dispatcher.dispatch(removed());
    }

    #[tokio::test]
    async fn test_closed_queue_is_swallowed() {
        let (dispatcher, worker) = NotificationDispatcher::new(4, Arc::new(LogMailer), "x");
        drop(worker);

        assert!(matches!(
            dispatcher.enqueue(removed()),
            Err(AppError::DispatchUnavailable(_))
        ));
        dispatcher.dispatch(removed());
    }

    #[tokio::test]
    async fn test_worker_delivers_rendered_email() {
        let mailer = Arc::new(RecordingMailer::default());
        let (dispatcher, worker) =
            NotificationDispatcher::new(8, mailer.clone(), "noreply@classhub.local");
        let handle = tokio::spawn(worker.run());

        dispatcher.dispatch(removed());
        drop(dispatcher);
        handle.await.unwrap();

        let sent = mailer.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "You have been removed from Math 101");
        assert_eq!(sent[0].from, "noreply@classhub.local");
    }

    #[tokio::test]
    async fn test_worker_survives_mailer_failure() {
        let (dispatcher, worker) = NotificationDispatcher::new(8, Arc::new(FailingMailer), "x");
        let handle = tokio::spawn(worker.run());

        dispatcher.dispatch(removed());
        dispatcher.dispatch(removed());
        drop(dispatcher);

        handle.await.unwrap();
    }
}
