//! The injected worker-pool resource shared by compounds.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Handle to the worker pool all compounds schedule onto.
///
/// Created once by the top-level driver and passed (in an `Arc`) to every
/// controller, so many compounds share one pool. Orchestration tasks go to
/// the async pool; component entry points, which are synchronous, run on the
/// blocking pool, which grows on demand and caches idle threads.
///
/// `shutdown` cancels the root token; every round token is a child of it, so
/// all in-flight rounds observe the cancellation at their next safe point.
/// A shut-down scheduler stays shut down: create a fresh one to execute
/// again.
#[derive(Debug, Default)]
pub struct Scheduler {
  root: CancellationToken,
}

impl Scheduler {
  pub fn new() -> Self {
    Self::default()
  }

  /// Hard stop: cancel every round currently in flight.
  pub fn shutdown(&self) {
    self.root.cancel();
  }

  pub fn is_shutdown(&self) -> bool {
    self.root.is_cancelled()
  }

  /// Token under which one round runs.
  pub(crate) fn round_token(&self) -> CancellationToken {
    self.root.child_token()
  }

  /// Spawn an orchestration task.
  pub(crate) fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
  where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
  {
    tokio::spawn(future)
  }

  /// Run a synchronous component entry point on the blocking pool.
  pub(crate) async fn run_blocking<F, R>(&self, work: F) -> Result<R, tokio::task::JoinError>
  where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
  {
    tokio::task::spawn_blocking(work).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn shutdown_cancels_child_round_tokens() {
    let scheduler = Scheduler::new();
    let token = scheduler.round_token();
    assert!(!token.is_cancelled());
    scheduler.shutdown();
    assert!(scheduler.is_shutdown());
    assert!(token.is_cancelled());
  }

  #[test]
  fn a_fresh_scheduler_replaces_a_shut_down_one() {
    let scheduler = Scheduler::new();
    scheduler.shutdown();
    let replacement = Scheduler::new();
    assert!(!replacement.is_shutdown());
  }
}
