//! Usage: Single-flight primitive: concurrent callers share one in-progress future and its outcome.

use crate::shared::mutex_ext::MutexExt;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

type SharedOutcome<T> = Shared<BoxFuture<'static, T>>;

struct InFlight<T> {
    id: u64,
    outcome: SharedOutcome<T>,
}

/// At most one execution is in progress at a time; every caller that arrives while it runs
/// parks on the same shared future and observes the same (cloned) outcome.
pub(crate) struct SingleFlight<T>
where
    T: Clone,
{
    slot: Arc<Mutex<Option<InFlight<T>>>>,
    next_id: AtomicU64,
}

impl<T> Default for SingleFlight<T>
where
    T: Clone,
{
    fn default() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn is_in_flight(&self) -> bool {
        self.slot.lock_or_recover().is_some()
    }

    /// Joins the in-flight execution if there is one, otherwise starts `make()`.
    ///
    /// The marker is cleared by the execution itself as soon as it settles, whatever the outcome,
    /// so the next call after settlement starts a fresh attempt.
    pub(crate) async fn run<F, Fut>(&self, make: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let outcome = {
            let mut slot = self.slot.lock_or_recover();
            match slot.as_ref() {
                Some(in_flight) => {
                    tracing::debug!(flight_id = in_flight.id, "joining in-flight execution");
                    in_flight.outcome.clone()
                }
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let work = make();
                    let release = Arc::clone(&self.slot);
                    let outcome = async move {
                        let result = work.await;
                        let mut slot = release.lock_or_recover();
                        if slot.as_ref().is_some_and(|current| current.id == id) {
                            *slot = None;
                        }
                        result
                    }
                    .boxed()
                    .shared();
                    *slot = Some(InFlight {
                        id,
                        outcome: outcome.clone(),
                    });
                    outcome
                }
            }
        };
        outcome.await
    }
}
