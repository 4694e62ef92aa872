//! Stream chaining state machine.
//!
//! [`DashPlayer`] turns the segment list of one adaptation set into a continuous sequence of
//! playable files. The playback driver owns the player and calls
//! [`DashPlayer::advance_to_next_segment`] whenever the current segment is exhausted, or
//! [`DashPlayer::seek`] on user request. Both suspend until their target segment is resolved.
//! Meanwhile background tasks fill the future cache up to the minimum buffer time ahead.

use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::adaptation::AdaptationLogic;
use crate::cache::{CachedSegment, FetchTicket, FutureCache, UsedCache};
use crate::config::PlayerConfig;
use crate::error::{CacheStateError, DashError, DashResult, TransportError};
use crate::mpd::{AdaptationSet, Presentation, Representation};
use crate::segment::SegmentFetcher;
use crate::{DashEvent, SegmentCallback};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Playing { index: usize },
    EndOfStream,
    Released,
}

/// Result of [`DashPlayer::advance_to_next_segment`].
#[derive(Debug, Clone)]
pub enum Advance {
    Segment(Arc<CachedSegment>),
    EndOfStream,
}

#[derive(Debug, Clone)]
pub struct SeekOutcome {
    pub index: usize,
    /// Presentation timestamp of the start of `segment`. The consumer subtracts it from the seek
    /// target to seek inside the segment.
    pub pts_offset_us: i64,
    pub segment: Arc<CachedSegment>,
    /// False when the target fell inside the current segment and nothing changed.
    pub moved: bool,
}

/// State shared with background prefetch tasks.
struct Shared {
    set: Arc<AdaptationSet>,
    logic: Arc<dyn AdaptationLogic>,
    fetcher: SegmentFetcher,
    future: FutureCache,
    used: UsedCache,
    callback: Option<SegmentCallback>,
}

impl Shared {
    fn emit(&self, event: DashEvent) {
        if let Some(callback) = &self.callback {
            callback(event);
        }
    }
}

pub struct DashPlayer {
    presentation: Arc<Presentation>,
    shared: Arc<Shared>,
    active: Arc<Representation>,
    current: Option<Arc<CachedSegment>>,
    index: usize,
    min_buffer_us: u64,
    state: PlaybackState,
    representation_changed: bool,
}

impl DashPlayer {
    /// Picks the initial representation, resolves segment 0 and starts prefetching.
    pub async fn open(
        presentation: Arc<Presentation>,
        set: Arc<AdaptationSet>,
        logic: Arc<dyn AdaptationLogic>,
        fetcher: SegmentFetcher,
        config: &PlayerConfig,
        callback: Option<SegmentCallback>,
    ) -> DashResult<Self> {
        let active = logic.initialize(&set)?;
        if active.segments.is_empty() {
            return Err(CacheStateError::EmptyRepresentation(active.id.clone()).into());
        }

        let min_buffer_us = config.effective_min_buffer_us(presentation.min_buffer_time_us);
        info!(
            representation = %active.id,
            bandwidth = active.bandwidth,
            segments = active.segments.len(),
            min_buffer_us,
            "Opening stream"
        );

        let shared = Arc::new(Shared {
            set,
            logic,
            fetcher,
            future: FutureCache::new(),
            used: UsedCache::new(config.used_cache_capacity_bytes),
            callback,
        });

        let mut player = Self {
            presentation,
            shared,
            active: active.clone(),
            current: None,
            index: 0,
            min_buffer_us,
            state: PlaybackState::Playing { index: 0 },
            representation_changed: false,
        };

        let segment = player.resolve(0, &active).await?;
        player.install(segment);
        player.prefetch(&active);
        Ok(player)
    }

    /// Moves to the next segment, or reports the end of the stream.
    ///
    /// On error the player stays on the current segment and the call can be retried.
    pub async fn advance_to_next_segment(&mut self) -> DashResult<Advance> {
        self.ensure_live()?;
        if self.state == PlaybackState::EndOfStream {
            return Ok(Advance::EndOfStream);
        }

        let next = self.index + 1;
        if next >= self.active.segment_count() {
            info!(index = self.index, "Reached end of stream");
            self.state = PlaybackState::EndOfStream;
            self.shared.emit(DashEvent::EndOfStream);
            return Ok(Advance::EndOfStream);
        }

        let recommended = self
            .shared
            .logic
            .recommended_representation(&self.shared.set)?;
        let segment = self.resolve(next, &recommended).await?;

        self.retire_current();
        self.index = next;
        self.install(segment.clone());
        self.prefetch(&recommended);
        Ok(Advance::Segment(segment))
    }

    /// Schedules background fetches for the segments following the current one, up to the
    /// minimum buffer time. Indices already cached or in flight are skipped.
    /// Returns how many fetches were started.
    pub fn prefetch(&self, target: &Arc<Representation>) -> usize {
        if self.state == PlaybackState::Released {
            return 0;
        }

        let segment_duration_us = self.active.segment_duration_us.max(1);
        let count = self.min_buffer_us.div_ceil(segment_duration_us) as usize;
        let first = self.index + 1;
        let end = (first + count).min(target.segment_count());

        let mut started = 0;
        for number in first..end {
            if self.shared.used.contains(number) {
                continue;
            }
            let Some(ticket) = self.shared.future.begin(number) else {
                continue;
            };
            spawn_prefetch(self.shared.clone(), target.clone(), ticket);
            started += 1;
        }

        if started > 0 {
            debug!(
                representation = %target.id,
                first,
                end,
                started,
                "Prefetching segments"
            );
        }
        started
    }

    /// Repositions playback to the segment covering `target_us`.
    pub async fn seek(&mut self, target_us: u64) -> DashResult<SeekOutcome> {
        self.ensure_live()?;
        let target = self
            .active
            .segment_index_at(target_us)
            .ok_or_else(|| CacheStateError::EmptyRepresentation(self.active.id.clone()))?;

        if let Some(current) = self.current.clone() {
            if target == self.index {
                trace!(target_us, index = target, "Seek inside current segment");
                self.state = PlaybackState::Playing { index: target };
                return Ok(SeekOutcome {
                    index: target,
                    pts_offset_us: current.pts_offset_us,
                    segment: current,
                    moved: false,
                });
            }
        }

        info!(target_us, from = self.index, to = target, "Seeking");
        self.shared.future.invalidate();

        // Position and current segment only change once the target is available.
        let active = self.active.clone();
        let segment = match self.resolve(target, &active).await {
            Ok(segment) => segment,
            Err(err) => {
                warn!(target_us, index = self.index, error = %err, "Seek failed");
                self.prefetch(&active);
                return Err(err);
            }
        };

        self.retire_current();
        self.index = target;
        self.install(segment.clone());
        self.prefetch(&self.active.clone());

        Ok(SeekOutcome {
            index: target,
            pts_offset_us: segment.pts_offset_us,
            segment,
            moved: true,
        })
    }

    /// Approximate playback time buffered ahead: ready segments × segment duration.
    pub fn cached_duration_us(&self) -> u64 {
        self.shared.future.len() as u64 * self.active.segment_duration_us
    }

    /// True once the last segment is buffered or being played.
    pub fn has_reached_cache_end_of_stream(&self) -> bool {
        match self.active.last_index() {
            Some(last) => self.index >= last || self.shared.future.contains(last),
            None => true,
        }
    }

    /// One-shot: true exactly once after the current segment switched representation.
    pub fn take_representation_changed(&mut self) -> bool {
        std::mem::take(&mut self.representation_changed)
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn current_index(&self) -> usize {
        self.index
    }

    pub fn current_segment(&self) -> Option<&Arc<CachedSegment>> {
        self.current.as_ref()
    }

    pub fn active_representation(&self) -> &Arc<Representation> {
        &self.active
    }

    pub fn presentation(&self) -> &Arc<Presentation> {
        &self.presentation
    }

    pub fn min_buffer_us(&self) -> u64 {
        self.min_buffer_us
    }

    pub fn set_used_cache_capacity(&self, capacity_bytes: u64) {
        self.shared.used.set_capacity(capacity_bytes);
    }

    /// Stops prefetching and drops every unplayed segment. Later calls fail with
    /// [`CacheStateError::Released`].
    pub fn release(&mut self) {
        if self.state == PlaybackState::Released {
            return;
        }
        self.shared.future.invalidate();
        self.current = None;
        self.state = PlaybackState::Released;
        info!(index = self.index, "Released player");
    }

    fn ensure_live(&self) -> Result<(), CacheStateError> {
        if self.state == PlaybackState::Released {
            Err(CacheStateError::Released)
        } else {
            Ok(())
        }
    }

    /// Cache lookup order: future cache, used cache, in-flight fetch, then an inline fetch
    /// against `representation`.
    async fn resolve(
        &self,
        number: usize,
        representation: &Arc<Representation>,
    ) -> DashResult<Arc<CachedSegment>> {
        if let Some(segment) = self.shared.future.take(number) {
            trace!(number, "Future cache hit");
            return Ok(segment);
        }
        if let Some(segment) = self.shared.used.get(number) {
            trace!(number, "Used cache hit");
            return Ok(segment);
        }
        if let Some(segment) = self.shared.future.wait_for(number).await {
            trace!(number, "Resolved by in-flight fetch");
            return Ok(segment);
        }

        debug!(number, representation = %representation.id, "Cache miss, fetching inline");
        let segment = self
            .shared
            .fetcher
            .fetch_segment(
                &self.shared.set,
                representation,
                number,
                self.shared.logic.as_ref(),
            )
            .await?;
        Ok(Arc::new(segment))
    }

    fn install(&mut self, segment: Arc<CachedSegment>) {
        if segment.representation.id != self.active.id {
            info!(
                from = %self.active.id,
                to = %segment.representation.id,
                index = self.index,
                "Representation changed"
            );
            self.shared.emit(DashEvent::RepresentationChanged {
                from: self.active.id.clone(),
                to: segment.representation.id.clone(),
            });
            self.active = segment.representation.clone();
            self.representation_changed = true;
        }

        self.state = PlaybackState::Playing { index: self.index };
        self.shared.emit(DashEvent::SegmentReady {
            number: segment.number,
            representation_id: segment.representation.id.clone(),
            path: segment.path().to_path_buf(),
            pts_offset_us: segment.pts_offset_us,
        });
        self.current = Some(segment);
    }

    /// Hands the played segment over to the used cache.
    fn retire_current(&mut self) {
        if let Some(segment) = self.current.take() {
            self.shared.used.put(segment);
        }
    }
}

impl Drop for DashPlayer {
    fn drop(&mut self) {
        self.shared.future.invalidate();
    }
}

fn spawn_prefetch(shared: Arc<Shared>, representation: Arc<Representation>, ticket: FetchTicket) {
    tokio::spawn(async move {
        let number = ticket.number;
        let token = ticket.token().clone();
        let result = tokio::select! {
            _ = token.cancelled() => Err(DashError::Transport(TransportError::Cancelled(
                format!("segment {number} of {}", representation.id),
            ))),
            result = shared.fetcher.fetch_segment(
                &shared.set,
                &representation,
                number,
                shared.logic.as_ref(),
            ) => result,
        };

        match result {
            Ok(segment) => {
                if shared.future.complete(&ticket, Arc::new(segment)) {
                    trace!(number, representation = %representation.id, "Prefetched segment");
                }
            }
            Err(DashError::Transport(TransportError::Cancelled(reason))) => {
                shared.future.fail(&ticket);
                debug!(%reason, "Prefetch cancelled");
            }
            Err(err) => {
                let url = representation
                    .segments
                    .get(number)
                    .map(|segment| segment.url.to_string())
                    .unwrap_or_default();
                warn!(number, representation = %representation.id, error = %err, "Prefetch failed");
                shared.emit(DashEvent::DownloadError {
                    url,
                    reason: err.to_string(),
                });
                shared.future.fail(&ticket);
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adaptation::ConstantAdaptation;
    use crate::cache::CacheDirectory;
    use crate::segment::fetcher::tests::{presentation, ScriptedTransport};
    use crate::segment::Mp4Remuxer;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    struct Harness {
        presentation: Arc<Presentation>,
        set: Arc<AdaptationSet>,
        transport: Arc<ScriptedTransport>,
        events: Arc<Mutex<Vec<DashEvent>>>,
        dir: Arc<CacheDirectory>,
    }

    impl Harness {
        /// 10 segments of 2 s per representation, min buffer 10 s.
        fn new(bandwidths: &[u64], duration_us: u64) -> Self {
            let presentation = Arc::new(presentation(bandwidths, duration_us, 10_000_000));
            let set = presentation.periods[0].adaptation_sets[0].clone();
            let transport = Arc::new(ScriptedTransport::default());
            for rep in &set.representations {
                transport.serve_representation(rep, 64);
            }
            Self {
                presentation,
                set,
                transport,
                events: Arc::new(Mutex::new(Vec::new())),
                dir: Arc::new(CacheDirectory::temporary().unwrap()),
            }
        }

        async fn open(&self, logic: Arc<dyn AdaptationLogic>) -> DashResult<DashPlayer> {
            let fetcher = SegmentFetcher::new(
                self.transport.clone(),
                Arc::new(Mp4Remuxer),
                self.dir.clone(),
            );
            let events = self.events.clone();
            let callback: SegmentCallback = Arc::new(move |event: DashEvent| events.lock().unwrap().push(event));
            DashPlayer::open(
                self.presentation.clone(),
                self.set.clone(),
                logic,
                fetcher,
                &PlayerConfig::default(),
                Some(callback),
            )
            .await
        }

        fn rep(&self, i: usize) -> &Arc<Representation> {
            &self.set.representations[i]
        }

        fn events(&self) -> Vec<DashEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    async fn settle(player: &DashPlayer) {
        for _ in 0..400 {
            if player.shared.future.in_flight_len() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("prefetch did not settle");
    }

    /// Recommends whatever representation index is stored in `choice`.
    struct ScriptedLogic {
        choice: AtomicUsize,
    }

    impl AdaptationLogic for ScriptedLogic {
        fn initialize(&self, set: &AdaptationSet) -> Result<Arc<Representation>, CacheStateError> {
            self.recommended_representation(set)
        }

        fn report_segment_download(
            &self,
            _set: &AdaptationSet,
            _representation: &Representation,
            _segment: &crate::mpd::Segment,
            _byte_size: u64,
            _download_time: Duration,
        ) {
        }

        fn recommended_representation(
            &self,
            set: &AdaptationSet,
        ) -> Result<Arc<Representation>, CacheStateError> {
            Ok(set.representations[self.choice.load(Ordering::SeqCst)].clone())
        }
    }

    #[tokio::test]
    async fn test_open_prefetches_min_buffer_on_highest() {
        let harness = Harness::new(&[100_000, 500_000, 1_000_000], 20_000_000);
        let player = harness.open(Arc::new(ConstantAdaptation::highest())).await.unwrap();
        settle(&player).await;

        let high = harness.rep(2);
        assert_eq!(player.active_representation().id, high.id);
        assert_eq!(player.current_segment().unwrap().number, 0);
        for index in 1..=5 {
            assert!(player.shared.future.contains(index), "index {index} not prefetched");
            assert_eq!(harness.transport.count(&high.segments[index].url), 1);
        }
        assert!(!player.shared.future.contains(6));
        assert_eq!(harness.transport.count(&high.segments[6].url), 0);

        let fetched = harness.transport.fetches();
        assert!(fetched.iter().all(|url| url.contains("/v2/")), "{fetched:?}");
        assert_eq!(player.cached_duration_us(), 10_000_000);
        assert_eq!(player.min_buffer_us(), 10_000_000);
    }

    #[tokio::test]
    async fn test_advance_uses_cache_and_extends_prefetch() {
        let harness = Harness::new(&[100_000, 500_000, 1_000_000], 20_000_000);
        let mut player = harness.open(Arc::new(ConstantAdaptation::highest())).await.unwrap();
        settle(&player).await;
        let first_path = player.current_segment().unwrap().path().to_path_buf();

        let Advance::Segment(segment) = player.advance_to_next_segment().await.unwrap() else {
            panic!("expected a segment");
        };
        assert_eq!(segment.number, 1);
        assert_eq!(player.state(), PlaybackState::Playing { index: 1 });
        assert_eq!(harness.transport.count(&harness.rep(2).segments[1].url), 1);
        assert!(player.shared.used.contains(0));
        assert!(first_path.exists());
        assert!(!player.take_representation_changed());

        settle(&player).await;
        assert!(player.shared.future.contains(6));
        assert_eq!(harness.transport.count(&harness.rep(2).segments[6].url), 1);
    }

    #[tokio::test]
    async fn test_seek_within_segment_is_local() {
        let harness = Harness::new(&[100_000, 500_000, 1_000_000], 20_000_000);
        let mut player = harness.open(Arc::new(ConstantAdaptation::highest())).await.unwrap();
        settle(&player).await;
        let fetches = harness.transport.fetches().len();

        let outcome = player.seek(500_000).await.unwrap();
        assert!(!outcome.moved);
        assert_eq!(outcome.index, 0);
        assert_eq!(outcome.pts_offset_us, 0);
        let outcome = player.seek(1_999_999).await.unwrap();
        assert!(!outcome.moved);

        assert_eq!(harness.transport.fetches().len(), fetches);
        assert_eq!(player.shared.future.len(), 5);
    }

    #[tokio::test]
    async fn test_seek_invalidates_future_cache() {
        let harness = Harness::new(&[100_000, 500_000, 1_000_000], 20_000_000);
        let mut player = harness.open(Arc::new(ConstantAdaptation::highest())).await.unwrap();
        settle(&player).await;
        assert_eq!(player.shared.future.len(), 5);

        let outcome = player.seek(15_000_000).await.unwrap();
        assert!(outcome.moved);
        assert_eq!(outcome.index, 7);
        assert_eq!(outcome.pts_offset_us, 14_000_000);
        assert_eq!(player.current_index(), 7);
        assert!(!player.shared.future.contains(1));
        assert!(player.shared.used.contains(0));

        settle(&player).await;
        assert!(player.shared.future.contains(8) && player.shared.future.contains(9));
        assert_eq!(player.shared.future.len(), 2);
        assert!(player.has_reached_cache_end_of_stream());

        // back to a played segment: served from the used cache
        let fetches = harness.transport.fetches().len();
        let outcome = player.seek(0).await.unwrap();
        assert_eq!(outcome.index, 0);
        assert_eq!(harness.transport.count(&harness.rep(2).segments[0].url), 1);
        settle(&player).await;
        assert!(harness.transport.fetches().len() > fetches);
    }

    #[tokio::test]
    async fn test_seek_past_end_clamps_to_last_segment() {
        let harness = Harness::new(&[100_000], 20_000_000);
        let mut player = harness.open(Arc::new(ConstantAdaptation::lowest())).await.unwrap();
        let outcome = player.seek(300_000_000).await.unwrap();
        assert_eq!(outcome.index, 9);
        assert!(player.has_reached_cache_end_of_stream());
        assert!(matches!(
            player.advance_to_next_segment().await.unwrap(),
            Advance::EndOfStream
        ));
    }

    #[tokio::test]
    async fn test_end_of_stream() {
        let harness = Harness::new(&[100_000], 6_000_000);
        let mut player = harness.open(Arc::new(ConstantAdaptation::lowest())).await.unwrap();
        settle(&player).await;
        assert!(player.has_reached_cache_end_of_stream());

        assert!(matches!(player.advance_to_next_segment().await.unwrap(), Advance::Segment(_)));
        assert!(matches!(player.advance_to_next_segment().await.unwrap(), Advance::Segment(_)));
        assert!(matches!(player.advance_to_next_segment().await.unwrap(), Advance::EndOfStream));
        assert_eq!(player.state(), PlaybackState::EndOfStream);
        assert!(matches!(player.advance_to_next_segment().await.unwrap(), Advance::EndOfStream));

        let events = harness.events();
        assert_eq!(events.iter().filter(|e| **e == DashEvent::EndOfStream).count(), 1);
        let ready = events
            .iter()
            .filter(|e| matches!(e, DashEvent::SegmentReady { .. }))
            .count();
        assert_eq!(ready, 3);
    }

    #[tokio::test]
    async fn test_representation_switch_is_one_shot() {
        let harness = Harness::new(&[100_000, 500_000, 1_000_000], 20_000_000);
        let logic = Arc::new(ScriptedLogic {
            choice: AtomicUsize::new(0),
        });
        let mut player = harness.open(logic.clone()).await.unwrap();
        settle(&player).await;

        // Indices 1..=5 are already buffered on v0; the new recommendation only reaches index 6.
        logic.choice.store(2, Ordering::SeqCst);
        for expected in 1..=5 {
            let Advance::Segment(segment) = player.advance_to_next_segment().await.unwrap() else {
                panic!("expected a segment");
            };
            assert_eq!(segment.number, expected);
            assert_eq!(segment.representation.id, "v0");
            assert!(!player.take_representation_changed());
        }

        let Advance::Segment(segment) = player.advance_to_next_segment().await.unwrap() else {
            panic!("expected a segment");
        };
        assert_eq!(segment.representation.id, "v2");
        assert_eq!(player.active_representation().id, "v2");
        assert!(player.take_representation_changed());
        assert!(!player.take_representation_changed());

        assert!(harness.events().contains(&DashEvent::RepresentationChanged {
            from: "v0".to_string(),
            to: "v2".to_string(),
        }));
    }

    #[tokio::test]
    async fn test_in_flight_fetch_is_awaited_not_duplicated() {
        let harness = Harness::new(&[100_000], 20_000_000);
        let slow = harness.rep(0).segments[1].url.clone();
        harness.transport.delay(&slow, Duration::from_millis(150));

        let mut player = harness.open(Arc::new(ConstantAdaptation::lowest())).await.unwrap();
        assert!(player.shared.future.is_in_flight(1));

        let Advance::Segment(segment) = player.advance_to_next_segment().await.unwrap() else {
            panic!("expected a segment");
        };
        assert_eq!(segment.number, 1);
        assert_eq!(harness.transport.count(&slow), 1);
    }

    #[tokio::test]
    async fn test_failed_prefetch_falls_back_to_inline_fetch() {
        let harness = Harness::new(&[100_000], 20_000_000);
        let flaky = harness.rep(0).segments[2].url.clone();
        harness.transport.fail_times(&flaky, 1);

        let mut player = harness.open(Arc::new(ConstantAdaptation::lowest())).await.unwrap();
        settle(&player).await;
        assert!(!player.shared.future.contains(2));
        assert!(harness
            .events()
            .iter()
            .any(|e| matches!(e, DashEvent::DownloadError { url, .. } if *url == flaky.to_string())));

        player.advance_to_next_segment().await.unwrap();
        let Advance::Segment(segment) = player.advance_to_next_segment().await.unwrap() else {
            panic!("expected a segment");
        };
        assert_eq!(segment.number, 2);
        assert_eq!(harness.transport.count(&flaky), 2);
    }

    #[tokio::test]
    async fn test_blocking_fetch_error_propagates() {
        let harness = Harness::new(&[100_000], 20_000_000);
        let broken = harness.rep(0).segments[1].url.clone();
        harness.transport.fail(&broken);

        let mut player = harness.open(Arc::new(ConstantAdaptation::lowest())).await.unwrap();
        settle(&player).await;

        let err = player.advance_to_next_segment().await.unwrap_err();
        assert!(matches!(err, DashError::Transport(TransportError::Status { .. })));
        assert_eq!(player.state(), PlaybackState::Playing { index: 0 });
        assert_eq!(player.current_segment().unwrap().number, 0);
    }

    #[tokio::test]
    async fn test_failed_seek_keeps_position() {
        let harness = Harness::new(&[100_000], 20_000_000);
        let broken = harness.rep(0).segments[7].url.clone();
        harness.transport.fail_times(&broken, 1);

        let mut player = harness.open(Arc::new(ConstantAdaptation::lowest())).await.unwrap();
        settle(&player).await;

        let err = player.seek(15_000_000).await.unwrap_err();
        assert!(matches!(err, DashError::Transport(TransportError::Status { .. })));
        assert_eq!(player.current_index(), 0);
        assert_eq!(player.state(), PlaybackState::Playing { index: 0 });
        assert_eq!(player.current_segment().unwrap().number, 0);

        // prefetch resumes from the unchanged position
        settle(&player).await;
        assert!(player.shared.future.contains(1));

        let Advance::Segment(next) = player.advance_to_next_segment().await.unwrap() else {
            panic!("expected a segment");
        };
        assert_eq!(next.number, 1);

        // the retried seek lands on the segment that failed before
        let outcome = player.seek(15_000_000).await.unwrap();
        assert_eq!(outcome.index, 7);
        assert_eq!(outcome.segment.number, 7);
        assert_eq!(harness.transport.count(&broken), 2);
    }

    #[tokio::test]
    async fn test_open_fails_when_first_segment_unavailable() {
        let harness = Harness::new(&[100_000], 20_000_000);
        harness.transport.fail(&harness.rep(0).segments[0].url);
        assert!(harness.open(Arc::new(ConstantAdaptation::lowest())).await.is_err());
    }

    #[tokio::test]
    async fn test_release() {
        let harness = Harness::new(&[100_000], 20_000_000);
        let mut player = harness.open(Arc::new(ConstantAdaptation::lowest())).await.unwrap();
        settle(&player).await;
        let current = player.current_segment().unwrap().path().to_path_buf();

        player.release();
        assert_eq!(player.state(), PlaybackState::Released);
        assert!(player.shared.future.is_empty());
        assert!(!current.exists());
        assert_eq!(player.prefetch(&harness.rep(0).clone()), 0);
        assert!(matches!(
            player.advance_to_next_segment().await,
            Err(DashError::CacheState(CacheStateError::Released))
        ));
        assert!(matches!(
            player.seek(0).await,
            Err(DashError::CacheState(CacheStateError::Released))
        ));
    }

    #[tokio::test]
    async fn test_used_cache_capacity_is_runtime_configurable() {
        let harness = Harness::new(&[100_000], 20_000_000);
        let mut player = harness.open(Arc::new(ConstantAdaptation::lowest())).await.unwrap();
        settle(&player).await;

        player.advance_to_next_segment().await.unwrap();
        player.advance_to_next_segment().await.unwrap();
        assert_eq!(player.shared.used.len(), 2);

        player.set_used_cache_capacity(1);
        assert!(player.shared.used.is_empty());
    }
}
