use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A spawned background task with its own cancellation scope.
///
/// Used identically for the transcription feeder, the turn detector, the
/// response generator and the speech streamer.
#[derive(Debug)]
pub struct TaskHandle {
    name: &'static str,
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl TaskHandle {
    /// Spawns `task` with a child of `parent`; cancelling the parent cancels the task.
    pub fn spawn<F, Fut>(name: &'static str, parent: &CancellationToken, task: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = parent.child_token();
        let join = tokio::spawn(task(cancel.clone()));
        debug!(target: "agent", task = name, "Task started");
        Self { name, cancel, join }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Cancels and waits up to `bound` for the task to exit.
    ///
    /// Returns `false` if the bound elapsed; the task is then aborted.
    pub async fn stop(mut self, bound: Duration) -> bool {
        self.cancel.cancel();
        match tokio::time::timeout(bound, &mut self.join).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                if e.is_panic() {
                    warn!(target: "agent", task = self.name, "Task panicked");
                }
                true
            }
            Err(_) => {
                warn!(
                    target: "agent",
                    task = self.name,
                    bound_ms = bound.as_millis() as u64,
                    "Task did not stop in time; aborting"
                );
                self.join.abort();
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn stop_cancels_and_joins() {
        let exited = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&exited);
        let handle = TaskHandle::spawn("test", &CancellationToken::new(), |cancel| async move {
            cancel.cancelled().await;
            flag.store(true, Ordering::SeqCst);
        });
        assert!(handle.stop(Duration::from_secs(1)).await);
        assert!(exited.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_bounded_for_unresponsive_tasks() {
        let handle = TaskHandle::spawn("stuck", &CancellationToken::new(), |_cancel| async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        assert!(!handle.stop(Duration::from_millis(100)).await);
    }

    #[tokio::test]
    async fn parent_cancellation_reaches_task() {
        let parent = CancellationToken::new();
        let handle = TaskHandle::spawn("child", &parent, |cancel| async move {
            cancel.cancelled().await;
        });
        parent.cancel();
        tokio::time::timeout(Duration::from_secs(1), async {
            while !handle.is_finished() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }
}
