//! DASH manifest data structures.
//! These represent a parsed static MPD, down to the concrete list of media segments of every
//! representation. The model is immutable once [`parser::parse_mpd`] returns it.

pub mod builder;
pub mod parser;
pub mod template;

use std::sync::Arc;

use url::Url;

use crate::error::ParseError;

/// The whole presentation described by one MPD.
#[derive(Debug, Clone)]
pub struct Presentation {
    /// `MPD@mediaPresentationDuration` in microseconds. Always > 0.
    pub duration_us: u64,
    /// `MPD@minBufferTime` in microseconds (0 when absent).
    pub min_buffer_time_us: u64,
    /// Base URL after applying `MPD/BaseURL` to the manifest location.
    pub base_url: Url,
    pub periods: Vec<Period>,
}

impl Presentation {
    pub fn first_period(&self) -> Option<&Period> {
        self.periods.first()
    }

    /// Looks an adaptation set up by its presentation-unique key.
    pub fn adaptation_set(&self, key: usize) -> Option<&Arc<AdaptationSet>> {
        self.periods
            .iter()
            .flat_map(|p| p.adaptation_sets.iter())
            .find(|set| set.key == key)
    }
}

#[derive(Debug, Clone)]
pub struct Period {
    pub id: Option<String>,
    pub start_us: u64,
    pub duration_us: Option<u64>,
    /// Adaptation sets in manifest order.
    pub adaptation_sets: Vec<Arc<AdaptationSet>>,
}

impl Period {
    /// First adaptation set whose mime type, or the mime type of any of its representations,
    /// starts with `media_type` (e.g. `"video/"`).
    pub fn find_adaptation_set(&self, media_type: &str) -> Option<&Arc<AdaptationSet>> {
        self.adaptation_sets.iter().find(|set| {
            set.mime_type
                .as_deref()
                .is_some_and(|mime| mime.starts_with(media_type))
                || set.representations.iter().any(|rep| {
                    rep.mime_type
                        .as_deref()
                        .is_some_and(|mime| mime.starts_with(media_type))
                })
        })
    }

    pub fn video_set(&self) -> Option<&Arc<AdaptationSet>> {
        self.find_adaptation_set("video/")
    }

    pub fn audio_set(&self) -> Option<&Arc<AdaptationSet>> {
        self.find_adaptation_set("audio/")
    }
}

/// Representations of the same content at different qualities.
///
/// `representations` keeps manifest order. Adaptation logic treats that order as ascending
/// bandwidth and does not verify it.
#[derive(Debug, Clone)]
pub struct AdaptationSet {
    /// Unique across the presentation, assigned in document order.
    pub key: usize,
    pub group: Option<u32>,
    pub mime_type: Option<String>,
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
    /// `@par` override of the picture aspect ratio.
    pub par: Option<f64>,
    pub representations: Vec<Arc<Representation>>,
}

impl AdaptationSet {
    pub fn lowest(&self) -> Option<&Arc<Representation>> {
        self.representations.first()
    }

    pub fn highest(&self) -> Option<&Arc<Representation>> {
        self.representations.last()
    }

    pub fn representation(&self, id: &str) -> Option<&Arc<Representation>> {
        self.representations.iter().find(|rep| rep.id == id)
    }

    /// `@par` when the manifest sets one, otherwise derived from the representation.
    pub fn picture_aspect_ratio(&self, representation: &Representation) -> Option<f64> {
        self.par.or_else(|| representation.picture_aspect_ratio())
    }
}

/// A single video/audio quality level with its concrete segment list.
#[derive(Debug, Clone)]
pub struct Representation {
    pub id: String,
    pub codecs: Option<String>,
    pub mime_type: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Storage aspect ratio (`@sar`).
    pub sar: Option<f64>,
    /// Bits per second.
    pub bandwidth: u64,
    /// Duration of one media segment in microseconds.
    pub segment_duration_us: u64,
    pub init_segment: Segment,
    pub segments: Vec<Segment>,
}

impl Representation {
    /// (width / height) × (sar or 1).
    pub fn picture_aspect_ratio(&self) -> Option<f64> {
        let (width, height) = (self.width?, self.height?);
        if height == 0 {
            return None;
        }
        Some(width as f64 / height as f64 * self.sar.unwrap_or(1.0))
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn last_index(&self) -> Option<usize> {
        self.segments.len().checked_sub(1)
    }

    /// Index of the segment covering `time_us`, clamped to the last segment.
    pub fn segment_index_at(&self, time_us: u64) -> Option<usize> {
        let last = self.last_index()?;
        if self.segment_duration_us == 0 {
            return Some(0);
        }
        Some(((time_us / self.segment_duration_us) as usize).min(last))
    }
}

/// A URL plus an optional byte range. No range means the whole resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub url: Url,
    pub range: Option<ByteRange>,
}

impl Segment {
    pub fn new(url: Url, range: Option<ByteRange>) -> Self {
        Self { url, range }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub offset: u64,
    pub length: Option<u64>,
}

impl ByteRange {
    pub fn new(offset: u64, length: Option<u64>) -> Self {
        Self { offset, length }
    }

    /// Parses a `"first-last"` byte-range-spec (RFC 7233 2.1). `last` may be omitted.
    pub fn parse(value: &str) -> Result<Self, ParseError> {
        let invalid = || ParseError::InvalidValue {
            attribute: "range",
            value: value.to_string(),
        };

        let (start, end) = value.trim().split_once('-').ok_or_else(invalid)?;
        let first_byte_pos = start.parse::<u64>().map_err(|_| invalid())?;
        let last_byte_pos = match end {
            "" => None,
            end => Some(end.parse::<u64>().map_err(|_| invalid())?),
        };

        match last_byte_pos {
            Some(last) if last < first_byte_pos => Err(invalid()),
            // 0-500 means 501 bytes
            last => Ok(Self::new(
                first_byte_pos,
                last.map(|last| last - first_byte_pos + 1),
            )),
        }
    }

    pub fn to_http_range(&self) -> String {
        if let Some(length) = self.length {
            format!("bytes={}-{}", self.offset, self.offset + length - 1)
        } else {
            format!("bytes={}-", self.offset)
        }
    }
}

/// `time / timescale` in microseconds, rounded in double precision.
pub fn scale_to_us(time: u64, timescale: u64) -> u64 {
    let timescale = timescale.max(1) as f64;
    (time as f64 / timescale * 1_000_000.0).round() as u64
}

/// Inverse of [`scale_to_us`].
pub fn scale_from_us(time_us: u64, timescale: u64) -> u64 {
    (time_us as f64 / 1_000_000.0 * timescale.max(1) as f64).round() as u64
}

/// Parses an `xs:duration` (`PT#H#M#.#S`) into microseconds.
pub fn parse_xs_duration_us(value: &str) -> Result<u64, ParseError> {
    let invalid = || ParseError::InvalidValue {
        attribute: "duration",
        value: value.to_string(),
    };

    let iso = iso8601_duration::Duration::parse(value.trim()).map_err(|_| invalid())?;
    let duration = iso.to_std().ok_or_else(invalid)?;
    Ok(duration.as_micros() as u64)
}

/// Parses `"w:h"` ratios such as `@par="16:9"` or `@sar="1:1"`.
pub fn parse_ratio(attribute: &'static str, value: &str) -> Result<f64, ParseError> {
    let invalid = || ParseError::InvalidValue {
        attribute,
        value: value.to_string(),
    };

    let (w, h) = value.split_once(':').ok_or_else(invalid)?;
    let w = w.trim().parse::<f64>().map_err(|_| invalid())?;
    let h = h.trim().parse::<f64>().map_err(|_| invalid())?;
    if h == 0.0 {
        return Err(invalid());
    }
    Ok(w / h)
}
