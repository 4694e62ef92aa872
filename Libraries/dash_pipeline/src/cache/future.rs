use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::cache::CachedSegment;

struct InFlight {
    id: u64,
    token: CancellationToken,
}

#[derive(Default)]
struct Inner {
    ready: HashMap<usize, Arc<CachedSegment>>,
    in_flight: HashMap<usize, InFlight>,
    next_id: u64,
}

/// Claim on an in-flight fetch of one segment number.
///
/// Handed out by [`FutureCache::begin`]; the holder must finish it with
/// [`FutureCache::complete`] or [`FutureCache::fail`].
#[derive(Debug, Clone)]
pub struct FetchTicket {
    pub number: usize,
    id: u64,
    token: CancellationToken,
}

impl FetchTicket {
    /// Cancelled when the cache is invalidated.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// Segments fetched ahead of playback, plus the fetches still running for it.
///
/// At most one fetch per segment number is in flight. Consumers that need a number being fetched
/// wait on [`FutureCache::wait_for`] instead of issuing a second request.
#[derive(Default)]
pub struct FutureCache {
    inner: Mutex<Inner>,
    changed: Notify,
}

impl FutureCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers a fetch for `number`, unless it is already ready or in flight.
    pub fn begin(&self, number: usize) -> Option<FetchTicket> {
        let mut inner = self.lock();
        if inner.ready.contains_key(&number) || inner.in_flight.contains_key(&number) {
            return None;
        }
        let id = inner.next_id;
        inner.next_id += 1;
        let token = CancellationToken::new();
        inner.in_flight.insert(
            number,
            InFlight {
                id,
                token: token.clone(),
            },
        );
        Some(FetchTicket { number, id, token })
    }

    /// Installs the result of `ticket`. Returns `false` when the ticket was invalidated in the
    /// meantime; the segment is then dropped instead.
    pub fn complete(&self, ticket: &FetchTicket, segment: Arc<CachedSegment>) -> bool {
        let mut inner = self.lock();
        let current = inner
            .in_flight
            .get(&ticket.number)
            .is_some_and(|in_flight| in_flight.id == ticket.id);
        if !current {
            trace!(number = ticket.number, "Discarding stale fetch result");
            return false;
        }
        inner.in_flight.remove(&ticket.number);
        inner.ready.insert(ticket.number, segment);
        drop(inner);
        self.changed.notify_waiters();
        true
    }

    /// Drops the in-flight record of a failed fetch and wakes anyone waiting on it.
    pub fn fail(&self, ticket: &FetchTicket) {
        let mut inner = self.lock();
        if inner
            .in_flight
            .get(&ticket.number)
            .is_some_and(|in_flight| in_flight.id == ticket.id)
        {
            inner.in_flight.remove(&ticket.number);
        }
        drop(inner);
        self.changed.notify_waiters();
    }

    /// Removes and returns segment `number` if it is ready.
    pub fn take(&self, number: usize) -> Option<Arc<CachedSegment>> {
        self.lock().ready.remove(&number)
    }

    /// Waits until no fetch for `number` is in flight anymore.
    ///
    /// Returns the segment (removed from the cache) if the fetch succeeded, `None` if it failed,
    /// was cancelled or was never started.
    pub async fn wait_for(&self, number: usize) -> Option<Arc<CachedSegment>> {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = self.lock();
                if let Some(segment) = inner.ready.remove(&number) {
                    return Some(segment);
                }
                if !inner.in_flight.contains_key(&number) {
                    return None;
                }
            }

            trace!(number, "Waiting for in-flight segment");
            notified.await;
        }
    }

    /// Cancels every in-flight fetch and drops every ready segment.
    /// Returns the number of ready segments discarded.
    pub fn invalidate(&self) -> usize {
        let mut inner = self.lock();
        for in_flight in inner.in_flight.values() {
            in_flight.token.cancel();
        }
        let cancelled = inner.in_flight.len();
        inner.in_flight.clear();
        let discarded = inner.ready.len();
        inner.ready.clear();
        drop(inner);

        if cancelled > 0 || discarded > 0 {
            debug!(cancelled, discarded, "Invalidated future cache");
        }
        self.changed.notify_waiters();
        discarded
    }

    pub fn contains(&self, number: usize) -> bool {
        self.lock().ready.contains_key(&number)
    }

    pub fn is_in_flight(&self, number: usize) -> bool {
        self.lock().in_flight.contains_key(&number)
    }

    /// Number of ready segments.
    pub fn len(&self) -> usize {
        self.lock().ready.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().ready.is_empty()
    }

    pub fn in_flight_len(&self) -> usize {
        self.lock().in_flight.len()
    }
}
