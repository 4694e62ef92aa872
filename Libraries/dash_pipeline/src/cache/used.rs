use std::sync::{Arc, Mutex, MutexGuard};

use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::cache::CachedSegment;

struct Inner {
    /// Least recently used first.
    entries: IndexMap<usize, Arc<CachedSegment>>,
    size: u64,
    capacity: u64,
}

impl Inner {
    fn remove_index(&mut self, index: usize) -> Option<Arc<CachedSegment>> {
        let (_, segment) = self.entries.shift_remove_index(index)?;
        self.size -= segment.size();
        Some(segment)
    }

    fn trim(&mut self) {
        while self.size > self.capacity {
            match self.remove_index(0) {
                Some(evicted) => debug!(
                    number = evicted.number,
                    bytes = evicted.size(),
                    "Evicted segment from used cache"
                ),
                None => break,
            }
        }
    }
}

/// LRU of played segments keyed by segment number, bounded by total file size.
///
/// Evicted segments are dropped inside the critical section, which deletes their file unless the
/// playback driver still holds the same segment.
pub struct UsedCache {
    inner: Mutex<Inner>,
}

impl UsedCache {
    /// `capacity_bytes` is clamped to at least one byte.
    pub fn new(capacity_bytes: u64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: IndexMap::new(),
                size: 0,
                capacity: capacity_bytes.max(1),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns segment `number` and marks it most recently used.
    pub fn get(&self, number: usize) -> Option<Arc<CachedSegment>> {
        let mut inner = self.lock();
        let index = inner.entries.get_index_of(&number)?;
        let last = inner.entries.len() - 1;
        inner.entries.move_index(index, last);
        inner.entries.get_index(last).map(|(_, segment)| segment.clone())
    }

    pub fn put(&self, segment: Arc<CachedSegment>) {
        let mut inner = self.lock();

        if let Some(index) = inner.entries.get_index_of(&segment.number) {
            let same = inner
                .entries
                .get_index(index)
                .is_some_and(|(_, existing)| Arc::ptr_eq(existing, &segment));
            if same {
                let last = inner.entries.len() - 1;
                inner.entries.move_index(index, last);
                return;
            }
            inner.remove_index(index);
        }

        if segment.size() > inner.capacity {
            trace!(
                number = segment.number,
                bytes = segment.size(),
                capacity = inner.capacity,
                "Segment larger than used cache, dropping"
            );
            return;
        }

        inner.size += segment.size();
        inner.entries.insert(segment.number, segment);
        inner.trim();
    }

    /// Changes the byte budget, evicting as needed. Clamped to at least one byte.
    pub fn set_capacity(&self, capacity_bytes: u64) {
        let mut inner = self.lock();
        inner.capacity = capacity_bytes.max(1);
        inner.trim();
    }

    pub fn capacity(&self) -> u64 {
        self.lock().capacity
    }

    /// Total size of the cached files in bytes.
    pub fn size(&self) -> u64 {
        self.lock().size
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Membership test that does not touch the recency order.
    pub fn contains(&self, number: usize) -> bool {
        self.lock().entries.contains_key(&number)
    }
}
