pub mod adaptation;
pub mod cache;
pub mod config;
pub mod error;
pub mod mpd;
pub mod player;
pub mod segment;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use url::Url;

use crate::error::DashResult;
use crate::mpd::Presentation;
use crate::segment::Transport;

/// Events emitted by the player
#[derive(Debug, Clone, PartialEq)]
pub enum DashEvent {
    /// A segment became the current playable unit.
    SegmentReady {
        number: usize,
        representation_id: String,
        path: PathBuf,
        pts_offset_us: i64,
    },
    /// The current segment belongs to a different representation than the previous one.
    RepresentationChanged { from: String, to: String },
    EndOfStream,
    /// A background prefetch failed. Playback continues.
    DownloadError { url: String, reason: String },
}

pub type SegmentCallback = Arc<dyn Fn(DashEvent) + Send + Sync>;

/// Downloads and parses the manifest at `url`.
pub async fn fetch_presentation(transport: &dyn Transport, url: &Url) -> DashResult<Presentation> {
    let response = transport.fetch(url, None).await?;
    let presentation = mpd::parser::parse_mpd(&response.body, url)?;
    info!(
        %url,
        duration_us = presentation.duration_us,
        adaptation_sets = presentation.periods.iter().map(|p| p.adaptation_sets.len()).sum::<usize>(),
        "Loaded presentation"
    );
    Ok(presentation)
}

pub use adaptation::{AdaptationLogic, ConstantAdaptation, RateBasedAdaptation};
pub use cache::{CacheDirectory, CachedSegment};
pub use config::PlayerConfig;
pub use error::{CacheStateError, DashError, ParseError, RemuxError, TransportError};
pub use player::{Advance, DashPlayer, PlaybackState, SeekOutcome};
pub use segment::{HttpTransport, Mp4Remuxer, SegmentFetcher};
