use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RANGE};
use reqwest::{Client, StatusCode};
use tokio::sync::Mutex;
use tracing::{debug, trace};
use url::Url;

use crate::adaptation::AdaptationLogic;
use crate::cache::{CacheDirectory, CachedSegment};
use crate::error::{CacheStateError, DashError, RemuxError, TransportError};
use crate::mpd::{AdaptationSet, ByteRange, Representation};

/// A completed HTTP exchange with the timing needed for throughput estimation.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub request_sent_at: Instant,
    pub headers_received_at: Instant,
    pub completed_at: Instant,
}

impl FetchResponse {
    /// Time from dispatching the request until the response headers arrived. Throughput is
    /// measured against this, body transfer excluded.
    pub fn response_time(&self) -> Duration {
        self.headers_received_at.duration_since(self.request_sent_at)
    }

    /// Time spent receiving the body only.
    pub fn transfer_time(&self) -> Duration {
        self.completed_at.duration_since(self.headers_received_at)
    }
}

/// Fetches a resource, optionally restricted to a byte range.
///
/// Awaiting it inline is the blocking variant; spawning it on a task is the async one.
/// Implementations must turn non-2xx responses into [`TransportError::Status`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(
        &self,
        url: &Url,
        range: Option<ByteRange>,
    ) -> Result<FetchResponse, TransportError>;
}

pub struct HttpTransport {
    client: Client,
    headers: HeaderMap,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            headers: HeaderMap::new(),
        }
    }

    /// Attaches `headers` to every request.
    pub fn with_headers(headers: &BTreeMap<String, String>) -> Result<Self, TransportError> {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| TransportError::InvalidHeader(name.clone()))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| TransportError::InvalidHeader(name.as_str().to_string()))?;
            map.insert(name, value);
        }
        Ok(Self {
            client: Client::new(),
            headers: map,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(
        &self,
        url: &Url,
        range: Option<ByteRange>,
    ) -> Result<FetchResponse, TransportError> {
        let mut request = self.client.get(url.clone()).headers(self.headers.clone());
        if let Some(range) = range {
            request = request.header(RANGE, range.to_http_range());
        }

        let request_sent_at = Instant::now();
        let response = request.send().await?;
        let headers_received_at = Instant::now();

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status,
            });
        }

        let headers = response.headers().clone();
        let body = response.bytes().await?;
        let completed_at = Instant::now();
        trace!(%url, bytes = body.len(), "Fetched resource");

        Ok(FetchResponse {
            status,
            headers,
            body,
            request_sent_at,
            headers_received_at,
            completed_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct RemuxOutput {
    pub data: Bytes,
    /// Presentation timestamp of the first sample, if the container reveals it.
    pub pts_offset_us: Option<i64>,
}

/// Joins an initialization segment with a media segment into one playable file.
pub trait Remuxer: Send + Sync {
    fn merge(&self, init: &[u8], media: &[u8]) -> Result<RemuxOutput, RemuxError>;
}

/// Fragmented MP4: the playable file is the init segment followed by the media segment.
#[derive(Debug, Default, Clone, Copy)]
pub struct Mp4Remuxer;

impl Remuxer for Mp4Remuxer {
    fn merge(&self, init: &[u8], media: &[u8]) -> Result<RemuxOutput, RemuxError> {
        if media.is_empty() {
            return Err(RemuxError("empty media segment".to_string()));
        }
        let mut data = BytesMut::with_capacity(init.len() + media.len());
        data.extend_from_slice(init);
        data.extend_from_slice(media);
        Ok(RemuxOutput {
            data: data.freeze(),
            pts_offset_us: mp4_box::presentation_offset_us(init, media),
        })
    }
}

/// Downloads media segments, merges them with their init segment and stores the result in the
/// cache directory.
pub struct SegmentFetcher {
    transport: Arc<dyn Transport>,
    remuxer: Arc<dyn Remuxer>,
    directory: Arc<CacheDirectory>,
    init_segments: Mutex<HashMap<String, Bytes>>,
}

impl SegmentFetcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        remuxer: Arc<dyn Remuxer>,
        directory: Arc<CacheDirectory>,
    ) -> Self {
        Self {
            transport,
            remuxer,
            directory,
            init_segments: Mutex::new(HashMap::new()),
        }
    }

    /// Init segment of `representation`, downloaded once and kept for the fetcher's lifetime.
    pub async fn init_segment(&self, representation: &Representation) -> Result<Bytes, DashError> {
        // Held across the download so concurrent callers share one request.
        let mut inits = self.init_segments.lock().await;
        if let Some(init) = inits.get(&representation.id) {
            return Ok(init.clone());
        }

        let init = &representation.init_segment;
        let response = self.transport.fetch(&init.url, init.range).await?;
        debug!(
            representation = %representation.id,
            bytes = response.body.len(),
            "Downloaded initialization segment"
        );
        inits.insert(representation.id.clone(), response.body.clone());
        Ok(response.body)
    }

    /// Fetches media segment `number` of `representation` and reports the download to `logic`.
    pub async fn fetch_segment(
        &self,
        set: &AdaptationSet,
        representation: &Arc<Representation>,
        number: usize,
        logic: &dyn AdaptationLogic,
    ) -> Result<CachedSegment, DashError> {
        let segment = representation.segments.get(number).ok_or_else(|| {
            CacheStateError::SegmentOutOfRange {
                representation: representation.id.clone(),
                number,
            }
        })?;

        let init = self.init_segment(representation).await?;
        let response = self.transport.fetch(&segment.url, segment.range).await?;
        let byte_size = response.body.len() as u64;
        logic.report_segment_download(
            set,
            representation,
            segment,
            byte_size,
            response.response_time(),
        );

        let output = self.remuxer.merge(&init, &response.body)?;
        let pts_offset_us = output
            .pts_offset_us
            .unwrap_or(number as i64 * representation.segment_duration_us as i64);
        let file = self
            .directory
            .write_segment(&format!("{}-{number}-", representation.id), &output.data)?;

        debug!(
            representation = %representation.id,
            number,
            bytes = byte_size,
            response_ms = response.response_time().as_millis() as u64,
            transfer_ms = response.transfer_time().as_millis() as u64,
            pts_offset_us,
            "Fetched segment"
        );

        Ok(CachedSegment::new(
            number,
            segment.clone(),
            representation.clone(),
            pts_offset_us,
            file,
            output.data.len() as u64,
        ))
    }
}
