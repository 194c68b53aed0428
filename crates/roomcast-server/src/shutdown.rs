//! Coordinated teardown of the relay's long-running tasks.
//!
//! One `CancellationToken` roots the whole relay: sessions run on child
//! tokens, and the accept loop and the reaper watch clones. Stopping the
//! relay means cancelling the root and then waiting a bounded time for the
//! tasks to drain.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Root of the relay's cancellation tree.
#[derive(Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Token for a task that must stop when the relay does.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Request shutdown. Idempotent.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Request shutdown and wait for `tasks` to finish, up to `grace`.
    ///
    /// Tasks still running when the grace period lapses are left to die with
    /// the process.
    pub async fn drain(&self, tasks: Vec<JoinHandle<()>>, grace: Duration) {
        self.shutdown();
        let all = futures::future::join_all(tasks);
        if tokio::time::timeout(grace, all).await.is_err() {
            warn!(
                grace_secs = grace.as_secs(),
                "tasks still running after grace period"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelling_reaches_every_token() {
        let coordinator = ShutdownCoordinator::new();
        let watcher = coordinator.token();
        let other = coordinator.token();
        assert!(!watcher.is_cancelled());

        coordinator.shutdown();
        assert!(watcher.is_cancelled());
        assert!(other.is_cancelled());
    }

    #[test]
    fn shutdown_twice_is_harmless() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.shutdown();
        coordinator.shutdown();
        assert!(coordinator.token().is_cancelled());
    }

    #[tokio::test]
    async fn drain_waits_for_cooperative_tasks() {
        let coordinator = ShutdownCoordinator::new();
        let token = coordinator.token();
        let task = tokio::spawn(async move { token.cancelled().await });

        coordinator.drain(vec![task], Duration::from_secs(5)).await;
        assert!(coordinator.token().is_cancelled());
    }

    #[tokio::test]
    async fn drain_gives_up_after_the_grace_period() {
        let coordinator = ShutdownCoordinator::new();
        // Ignores cancellation entirely.
        let stuck = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(600)).await;
        });

        let started = std::time::Instant::now();
        coordinator
            .drain(vec![stuck], Duration::from_millis(50))
            .await;
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
