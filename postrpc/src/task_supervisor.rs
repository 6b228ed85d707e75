use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use tokio_util::sync::{CancellationToken, DropGuard, WaitForCancellationFuture};

#[derive(Debug, Default)]
struct TaskSupervisorState {
    /// Number of live guards.
    running: AtomicU64,
    /// Cancelled when stop is requested.
    stop: CancellationToken,
    /// Cancelled once stop was requested and the last guard is gone.
    stopped: CancellationToken,
}

/// Admits and tracks the work of one endpoint: a port pump, or the
/// procedures a server is running.
///
/// Every admitted task holds a [`TaskSupervisorGuard`]. After [`stop`],
/// [`admit`] refuses new work and [`all_stopped`] resolves once the admitted
/// work has finished.
///
/// [`stop`]: TaskSupervisor::stop
/// [`admit`]: TaskSupervisor::admit
/// [`all_stopped`]: TaskSupervisor::all_stopped
#[derive(Debug)]
pub struct TaskSupervisor(Arc<TaskSupervisorState>);

/// Keeps its task counted until dropped.
#[derive(Debug)]
pub struct TaskSupervisorGuard(Arc<TaskSupervisorState>);

impl TaskSupervisorState {
    fn finish_async_task(&self) {
        let running = self.running.fetch_sub(1, Ordering::AcqRel) - 1;
        if running == 0 {
            self.stopped.cancel();
        }
    }
}

impl TaskSupervisor {
    /// Creates a supervisor.
    ///
    /// One guard is held by a watcher task until stop is requested, so
    /// `all_stopped` cannot fire while the supervisor is still running.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn create() -> Self {
        let supervisor = Self(Arc::default());

        let guard = supervisor.track();
        tokio::spawn(async move {
            guard.stopped().await;
        });

        supervisor
    }

    /// Requests stop. Running tasks are left to finish.
    pub fn stop(&self) {
        self.0.stop.cancel();
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.stop.is_cancelled()
    }

    /// Returns a guard that calls `stop()` when dropped.
    #[must_use]
    pub fn drop_guard(&self) -> DropGuard {
        self.0.stop.clone().drop_guard()
    }

    /// Resolves once stop was requested and every admitted task is done.
    pub fn all_stopped(&self) -> WaitForCancellationFuture<'_> {
        self.0.stopped.cancelled()
    }

    /// Number of tracked tasks, the watcher included while running.
    #[must_use]
    pub fn running(&self) -> u64 {
        self.0.running.load(Ordering::Acquire)
    }

    /// Admits one more task, or returns `None` once stop was requested.
    #[must_use]
    pub fn admit(&self) -> Option<TaskSupervisorGuard> {
        // count first, so a concurrent stop cannot see zero and fire early.
        let guard = self.track();
        if self.is_stopped() {
            return None;
        }
        Some(guard)
    }

    fn track(&self) -> TaskSupervisorGuard {
        self.0.running.fetch_add(1, Ordering::AcqRel);
        TaskSupervisorGuard(self.0.clone())
    }
}

impl Drop for TaskSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl TaskSupervisorGuard {
    /// Resolves when the supervisor is asked to stop.
    pub fn stopped(&self) -> WaitForCancellationFuture<'_> {
        self.0.stop.cancelled()
    }
}

impl Drop for TaskSupervisorGuard {
    fn drop(&mut self) {
        self.0.finish_async_task();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_stop_without_tasks() {
        let supervisor = TaskSupervisor::create();
        assert_eq!(supervisor.running(), 1);
        assert!(!supervisor.is_stopped());

        supervisor.stop();
        supervisor.all_stopped().await;
        assert!(supervisor.is_stopped());
        assert_eq!(supervisor.running(), 0);
    }

    #[tokio::test]
    async fn test_all_stopped_waits_for_guards() {
        let supervisor = TaskSupervisor::create();
        let guard = supervisor.admit().unwrap();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            drop(guard);
        });

        supervisor.stop();
        supervisor.all_stopped().await;
        assert_eq!(supervisor.running(), 0);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_admit_refused_after_stop() {
        let supervisor = TaskSupervisor::create();
        let guard = supervisor.admit().unwrap();
        assert_eq!(supervisor.running(), 2);

        supervisor.stop();
        assert!(supervisor.admit().is_none());
        assert_eq!(supervisor.running(), 2);

        let mut all_stopped = Box::pin(supervisor.all_stopped());
        tokio::task::yield_now().await;
        assert!(futures_util::poll!(&mut all_stopped).is_pending());

        drop(guard);
        all_stopped.await;
        assert_eq!(supervisor.running(), 0);
    }
}
