use std::sync::Arc;
use std::time::Duration;

use crate::adaptation::AdaptationLogic;
use crate::error::CacheStateError;
use crate::mpd::{AdaptationSet, Representation, Segment};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    Lowest,
    Highest,
}

/// Always selects the first or the last representation of the set.
#[derive(Debug, Clone, Copy)]
pub struct ConstantAdaptation {
    quality: Quality,
}

impl ConstantAdaptation {
    pub fn new(quality: Quality) -> Self {
        Self { quality }
    }

    pub fn lowest() -> Self {
        Self::new(Quality::Lowest)
    }

    pub fn highest() -> Self {
        Self::new(Quality::Highest)
    }
}

impl AdaptationLogic for ConstantAdaptation {
    fn initialize(&self, set: &AdaptationSet) -> Result<Arc<Representation>, CacheStateError> {
        self.recommended_representation(set)
    }

    fn report_segment_download(
        &self,
        _set: &AdaptationSet,
        _representation: &Representation,
        _segment: &Segment,
        _byte_size: u64,
        _download_time: Duration,
    ) {
    }

    fn recommended_representation(
        &self,
        set: &AdaptationSet,
    ) -> Result<Arc<Representation>, CacheStateError> {
        let representation = match self.quality {
            Quality::Lowest => set.lowest(),
            Quality::Highest => set.highest(),
        };
        representation
            .cloned()
            .ok_or(CacheStateError::EmptyAdaptationSet(set.key))
    }
}
