use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Handle to a one-shot deferred action.
///
/// The action runs at most once, at `deadline`, unless cancelled first.
/// Cancelling is idempotent and safe after the action has already fired.
#[derive(Debug)]
pub struct ScheduledTask {
    cancel: CancellationToken,
    fired: Arc<AtomicBool>,
    deadline: Instant,
}

impl ScheduledTask {
    /// Spawn `action` to run after `delay`, measured from now.
    pub fn schedule_once<F>(delay: Duration, action: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let fired = Arc::new(AtomicBool::new(false));
        let deadline = Instant::now() + delay;

        let token = cancel.clone();
        let fired_flag = Arc::clone(&fired);
        tokio::spawn(async move {
            tokio::select! {
              _ = token.cancelled() => {}
              _ = tokio::time::sleep_until(deadline) => {
                // A cancel racing the deadline wins if it landed first.
                if token.is_cancelled() {
                    return;
                }
                fired_flag.store(true, Ordering::SeqCst);
                action.await;
              }
            }
        });

        Self {
            cancel,
            fired,
            deadline,
        }
    }

    /// Cancel the action. Returns `true` if this call prevented it from running.
    pub fn cancel(&self) -> bool {
        let pending = !self.cancel.is_cancelled() && !self.has_fired();
        self.cancel.cancel();
        pending
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}
