//! Representation selection strategies.

pub mod constant;
pub mod rate_based;

use std::sync::Arc;
use std::time::Duration;

use crate::error::CacheStateError;
use crate::mpd::{AdaptationSet, Representation, Segment};

pub use constant::ConstantAdaptation;
pub use rate_based::{BandwidthMeter, RateBasedAdaptation};

/// Picks a representation of an adaptation set.
///
/// Implementations are shared between the playback driver and background fetch tasks, so every
/// method takes `&self` and any bookkeeping lives behind interior mutability.
pub trait AdaptationLogic: Send + Sync {
    /// Representation to start playback with.
    fn initialize(&self, set: &AdaptationSet) -> Result<Arc<Representation>, CacheStateError>;

    /// Feeds one completed media segment download into the strategy.
    fn report_segment_download(
        &self,
        set: &AdaptationSet,
        representation: &Representation,
        segment: &Segment,
        byte_size: u64,
        download_time: Duration,
    );

    /// Representation the next fetches should target.
    fn recommended_representation(
        &self,
        set: &AdaptationSet,
    ) -> Result<Arc<Representation>, CacheStateError>;
}
