use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use circular_buffer::CircularBuffer;
use tracing::{debug, trace};

use crate::adaptation::AdaptationLogic;
use crate::error::CacheStateError;
use crate::mpd::{AdaptationSet, Representation, Segment};

/// Number of downloads the running average covers.
pub const BANDWIDTH_WINDOW: usize = 10;

/// Sustained headroom required before an upgrade, in microseconds.
const UPGRADE_HORIZON_US: u64 = 10_000_000;

/// Running mean of the instantaneous bandwidth of the last [`BANDWIDTH_WINDOW`] downloads.
pub struct BandwidthMeter {
    samples: CircularBuffer<BANDWIDTH_WINDOW, f64>,
    sum: f64,
}

impl Default for BandwidthMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl BandwidthMeter {
    pub fn new() -> Self {
        Self {
            samples: CircularBuffer::new(),
            sum: 0.0,
        }
    }

    /**
     * Records the number of bytes downloaded and the time it took.
     * Zero-length downloads carry no throughput information and are ignored.
     */
    pub fn record(&mut self, bytes: u64, duration: Duration) {
        let seconds = duration.as_secs_f64();
        if seconds <= 0.0 {
            return;
        }
        let sample = bytes as f64 * 8.0 / seconds;

        if self.samples.is_full() {
            if let Some(evicted) = self.samples.pop_front() {
                self.sum -= evicted;
            }
        }
        self.samples.push_back(sample);
        self.sum += sample;
    }

    /**
     * Returns the average bandwidth in bits per second, or 0 before the first sample.
     */
    pub fn average(&self) -> f64 {
        if self.samples.is_empty() {
            0.0
        } else {
            self.sum / self.samples.len() as f64
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Per adaptation set decision state.
struct AdaptationState {
    current: Arc<Representation>,
    vote: u64,
}

#[derive(Default)]
struct Inner {
    meter: BandwidthMeter,
    states: HashMap<usize, AdaptationState>,
}

/// Throughput driven selection with upgrade hysteresis.
///
/// Downgrades happen as soon as the average bandwidth no longer covers the current
/// representation. Upgrades need one vote per recommendation until roughly ten seconds worth of
/// segments agreed on it.
#[derive(Default)]
pub struct RateBasedAdaptation {
    inner: Mutex<Inner>,
}

impl RateBasedAdaptation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn average_bandwidth(&self) -> f64 {
        self.lock().meter.average()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn pick_candidate(set: &AdaptationSet, average: f64) -> Result<Arc<Representation>, CacheStateError> {
    set.representations
        .iter()
        .filter(|rep| rep.bandwidth as f64 <= average)
        .max_by_key(|rep| rep.bandwidth)
        .or_else(|| set.lowest())
        .cloned()
        .ok_or(CacheStateError::EmptyAdaptationSet(set.key))
}

impl AdaptationLogic for RateBasedAdaptation {
    fn initialize(&self, set: &AdaptationSet) -> Result<Arc<Representation>, CacheStateError> {
        self.recommended_representation(set)
    }

    fn report_segment_download(
        &self,
        set: &AdaptationSet,
        representation: &Representation,
        _segment: &Segment,
        byte_size: u64,
        download_time: Duration,
    ) {
        let mut inner = self.lock();
        inner.meter.record(byte_size, download_time);
        trace!(
            set = set.key,
            representation = %representation.id,
            byte_size,
            download_ms = download_time.as_millis() as u64,
            average_bps = inner.meter.average(),
            "Recorded segment download"
        );
    }

    fn recommended_representation(
        &self,
        set: &AdaptationSet,
    ) -> Result<Arc<Representation>, CacheStateError> {
        let mut inner = self.lock();
        let average = inner.meter.average();
        let candidate = pick_candidate(set, average)?;

        let state = match inner.states.entry(set.key) {
            Entry::Vacant(entry) => {
                debug!(set = set.key, representation = %candidate.id, "Initial representation");
                entry.insert(AdaptationState {
                    current: candidate.clone(),
                    vote: 0,
                });
                return Ok(candidate);
            }
            Entry::Occupied(entry) => entry.into_mut(),
        };

        if candidate.bandwidth < state.current.bandwidth {
            debug!(
                set = set.key,
                from = %state.current.id,
                to = %candidate.id,
                average_bps = average,
                "Downgrading representation"
            );
            state.current = candidate;
            state.vote = 0;
        } else if candidate.bandwidth > state.current.bandwidth {
            state.vote += 1;
            let required = (UPGRADE_HORIZON_US / state.current.segment_duration_us.max(1)).max(1);
            if state.vote >= required {
                debug!(
                    set = set.key,
                    from = %state.current.id,
                    to = %candidate.id,
                    average_bps = average,
                    "Upgrading representation"
                );
                state.current = candidate;
                state.vote = 0;
            }
        } else {
            state.vote = 0;
        }

        Ok(state.current.clone())
    }
}
