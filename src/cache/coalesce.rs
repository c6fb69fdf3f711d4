//! Request coalescing.
//!
//! At most one origin load runs per `LoadToken`. Callers arriving while a load
//! is in flight attach to it and receive a clone of its terminal result; their
//! own load closures are dropped unexecuted.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::{BoxFuture, FutureExt, Shared};
use metrics::counter;
use thiserror::Error;
use tracing::debug;

use super::keys::LoadToken;

const SOURCE: &str = "cache::coalesce";

pub(crate) const METRIC_ORIGIN_LOAD: &str = "userline_origin_load_total";
pub(crate) const METRIC_COALESCED_WAIT: &str = "userline_coalesced_wait_total";

type SharedLoad<V, E> = Shared<BoxFuture<'static, Result<V, E>>>;

struct InFlight<V, E> {
    generation: u64,
    load: SharedLoad<V, E>,
}

/// The shared load ended without producing a result (it panicked or was
/// cancelled by runtime shutdown).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("coalesced load `{token}` aborted: {reason}")]
pub struct LoadAborted {
    pub token: String,
    pub reason: String,
}

pub struct RequestCoalescer<V, E> {
    inflight: Arc<DashMap<LoadToken, InFlight<V, E>>>,
    generation: AtomicU64,
}

impl<V, E> Default for RequestCoalescer<V, E> {
    fn default() -> Self {
        Self {
            inflight: Arc::new(DashMap::new()),
            generation: AtomicU64::new(0),
        }
    }
}

impl<V, E> RequestCoalescer<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + From<LoadAborted> + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `load` unless a load for `token` is already in flight, in which
    /// case wait for that one instead.
    ///
    /// The load runs on its own task, so it completes even if every waiting
    /// caller gives up. Its registration is removed when it finishes; the next
    /// call with the same token starts a fresh load.
    pub async fn run<F, Fut>(&self, token: LoadToken, load: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let shared = match self.inflight.entry(token) {
            Entry::Occupied(entry) => {
                counter!(METRIC_COALESCED_WAIT, "operation" => token.operation).increment(1);
                debug!(target = SOURCE, token = %token, "attaching to in-flight load");
                entry.get().load.clone()
            }
            Entry::Vacant(entry) => {
                counter!(METRIC_ORIGIN_LOAD, "operation" => token.operation).increment(1);
                let generation = self.generation.fetch_add(1, Ordering::Relaxed);
                let shared = self.spawn_load(token, generation, load());
                entry.insert(InFlight {
                    generation,
                    load: shared.clone(),
                });
                shared
            }
        };

        shared.await
    }

    /// Number of loads currently registered.
    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }

    fn spawn_load<Fut>(&self, token: LoadToken, generation: u64, load: Fut) -> SharedLoad<V, E>
    where
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let guard = LoadGuard {
            token,
            generation,
            inflight: Arc::clone(&self.inflight),
        };
        let handle = tokio::spawn(async move {
            let _guard = guard;
            load.await
        });

        async move {
            match handle.await {
                Ok(result) => result,
                Err(join_error) => Err(E::from(LoadAborted {
                    token: token.to_string(),
                    reason: join_error.to_string(),
                })),
            }
        }
        .boxed()
        .shared()
    }
}

/// Removes the registration of one load when its task ends, including by
/// panic or abort.
struct LoadGuard<V, E> {
    token: LoadToken,
    generation: u64,
    inflight: Arc<DashMap<LoadToken, InFlight<V, E>>>,
}

impl<V, E> Drop for LoadGuard<V, E> {
    fn drop(&mut self) {
        let generation = self.generation;
        self.inflight
            .remove_if(&self.token, |_, current| current.generation == generation);
    }
}
