//! Confirmation Poller
//!
//! After the provider redirects back, the success page does not know whether
//! the webhook has landed yet. The poller re-reads the entitlement on a fixed
//! interval until it comes back paid, gives up after a bounded number of
//! attempts, and stops as soon as it is cancelled or its handle is dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crush_core::{Confirmation, EntitlementId};

use crate::api::ConfirmationSource;

/// Interval and attempt bound
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,

    /// Reads before reporting [`PollOutcome::Delayed`]
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            max_attempts: 40,
        }
    }
}

/// How a poll ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// Entitlement is paid; show the share link
    Ready(Confirmation),

    /// Still unpaid after every attempt; payment may be delayed
    Delayed { attempts: u32 },

    /// Caller navigated away
    Cancelled,
}

/// Polls a [`ConfirmationSource`] until paid, exhausted or cancelled
pub struct ConfirmationPoller<S: ConfirmationSource + ?Sized> {
    source: Arc<S>,
    policy: PollPolicy,
}

impl<S: ConfirmationSource + ?Sized + 'static> ConfirmationPoller<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self {
            source,
            policy: PollPolicy::default(),
        }
    }

    #[must_use]
    pub const fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub const fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Poll inline until an outcome is reached
    ///
    /// The first read happens immediately; later reads wait one interval.
    /// Read errors count as attempts.
    pub async fn poll(&self, id: &EntitlementId, mut cancel: watch::Receiver<bool>) -> PollOutcome {
        for attempt in 1..=self.policy.max_attempts {
            if *cancel.borrow() {
                return PollOutcome::Cancelled;
            }

            match self.source.fetch_confirmation(id).await {
                Ok(Some(confirmation)) => {
                    tracing::info!(entitlement_id = %id, attempt, "Payment confirmed");
                    return PollOutcome::Ready(confirmation);
                }
                Ok(None) => {
                    tracing::debug!(entitlement_id = %id, attempt, "Not paid yet");
                }
                Err(e) => {
                    tracing::warn!(entitlement_id = %id, attempt, error = %e, "Confirmation read failed");
                }
            }

            if attempt == self.policy.max_attempts {
                break;
            }

            tokio::select! {
                () = tokio::time::sleep(self.policy.interval) => {}
                changed = cancel.changed() => {
                    // A dropped sender means nobody is waiting for the result
                    if changed.is_err() || *cancel.borrow() {
                        return PollOutcome::Cancelled;
                    }
                }
            }
        }

        tracing::warn!(
            entitlement_id = %id,
            attempts = self.policy.max_attempts,
            "Payment still unconfirmed"
        );
        PollOutcome::Delayed {
            attempts: self.policy.max_attempts,
        }
    }

    /// Poll on a background task
    pub fn spawn(&self, id: EntitlementId) -> PollHandle {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let poller = Self {
            source: Arc::clone(&self.source),
            policy: self.policy,
        };
        let task = tokio::spawn(async move { poller.poll(&id, cancel_rx).await });
        PollHandle {
            cancel: cancel_tx,
            task: Some(task),
        }
    }
}

/// Running background poll; dropping it aborts the poll
#[derive(Debug)]
pub struct PollHandle {
    cancel: watch::Sender<bool>,
    task: Option<JoinHandle<PollOutcome>>,
}

impl PollHandle {
    /// Ask the poll to stop at its next wait
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Wait for the poll to finish
    pub async fn outcome(mut self) -> PollOutcome {
        match self.task.take() {
            Some(task) => task.await.unwrap_or(PollOutcome::Cancelled),
            None => PollOutcome::Cancelled,
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
