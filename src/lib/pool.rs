//! Bounded dispatch of remote calls.
//!
//! All tasks run on the calling task; "concurrency" is the number of calls in
//! flight at once. Each task takes a semaphore permit before it starts, every
//! task after the first waits a fixed stagger while holding its permit, and
//! permits are granted in input order.

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Semaphore;

#[cfg(feature = "tracing")]
use tracing::trace;

use crate::store::FatalError;

/// Calls allowed in flight at once.
pub const POOL_WIDTH: usize = 3;

/// Delay before each dispatched task except the first.
pub const STAGGER: Duration = Duration::from_millis(50);

/// Outcome of one pooled remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemResult {
  pub success: bool,
  /// Full parameter path the call targeted.
  pub parameter: String,
  pub error: Option<String>,
}

impl ItemResult {
  pub fn succeeded(parameter: impl Into<String>) -> Self {
    Self {
      success: true,
      parameter: parameter.into(),
      error: None,
    }
  }

  pub fn failed(parameter: impl Into<String>, error: impl Into<String>) -> Self {
    Self {
      success: false,
      parameter: parameter.into(),
      error: Some(error.into()),
    }
  }
}

/// Counts `(succeeded, failed)`.
pub fn tally(results: &[ItemResult]) -> (usize, usize) {
  let succeeded = results.iter().filter(|r| r.success).count();
  (succeeded, results.len() - succeeded)
}

/// Semaphore-bounded executor for batches of remote calls.
#[derive(Debug)]
pub struct BoundedPool {
  semaphore: Semaphore,
  stagger: Duration,
}

impl Default for BoundedPool {
  fn default() -> Self {
    Self::new(POOL_WIDTH, STAGGER)
  }
}

impl BoundedPool {
  pub fn new(width: usize, stagger: Duration) -> Self {
    Self {
      semaphore: Semaphore::new(width.max(1)),
      stagger,
    }
  }

  /// Runs `op` over every item and returns the outputs in input order.
  ///
  /// An `Err` from any task ends the batch at once: tasks still waiting for a
  /// permit or sitting in their stagger are dropped without being started.
  pub async fn run<T, R, F, Fut>(&self, items: Vec<T>, op: F) -> Result<Vec<R>, FatalError>
  where
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<R, FatalError>>,
  {
    let total = items.len();
    let op = &op;

    let mut pending: FuturesUnordered<_> = items
      .into_iter()
      .enumerate()
      .map(|(index, item)| async move {
        // The semaphore is private and never closed, so acquiring always succeeds.
        let Ok(_permit) = self.semaphore.acquire().await else {
          unreachable!("pool semaphore closed");
        };
        if index > 0 {
          tokio::time::sleep(self.stagger).await;
        }

        #[cfg(feature = "tracing")]
        trace!(index, "Dispatching task");

        (index, op(item).await)
      })
      .collect();

    let mut slots: Vec<Option<R>> = std::iter::repeat_with(|| None).take(total).collect();
    while let Some((index, outcome)) = pending.next().await {
      slots[index] = Some(outcome?);
    }

    Ok(slots.into_iter().flatten().collect())
  }
}
