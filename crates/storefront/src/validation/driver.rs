//! Background task that fires debounce deadlines.

use std::sync::{Arc, Weak};

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::Clock;

/// Something with debounce deadlines to run.
pub trait DebounceTarget: Send + Sync {
    /// Earliest pending deadline, if any.
    fn next_deadline(&self) -> Option<Instant>;

    /// Run every deadline that has passed.
    fn run_due(&self);

    /// Whether the target has been torn down.
    fn is_closed(&self) -> bool;
}

/// Owns the deadline task for one target.
///
/// The task sleeps on the target's clock until the earliest deadline and
/// wakes early whenever the target signals its `Notify`. It holds only a weak reference, so it exits
/// once the target is dropped, closed, or this handle is dropped.
#[derive(Debug)]
pub struct DebounceDriver {
    handle: JoinHandle<()>,
}

impl DebounceDriver {
    /// Spawn the task on the current runtime.
    pub fn spawn<T>(target: Weak<T>, wake: Arc<Notify>, clock: Arc<dyn Clock>) -> Self
    where
        T: DebounceTarget + 'static,
    {
        let handle = tokio::spawn(run(target, wake, clock));
        Self { handle }
    }

    /// Stop the task.
    pub fn abort(&self) {
        self.handle.abort();
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for DebounceDriver {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run<T: DebounceTarget>(target: Weak<T>, wake: Arc<Notify>, clock: Arc<dyn Clock>) {
    loop {
        let deadline = {
            let Some(target) = target.upgrade() else {
                break;
            };
            if target.is_closed() {
                break;
            }
            target.next_deadline()
        };

        match deadline {
            Some(deadline) => {
                tokio::select! {
                    () = clock.sleep_until(deadline) => {
                        let Some(target) = target.upgrade() else {
                            break;
                        };
                        target.run_due();
                    }
                    () = wake.notified() => {}
                }
            }
            None => wake.notified().await,
        }
    }
    tracing::trace!("Debounce driver stopped");
}
