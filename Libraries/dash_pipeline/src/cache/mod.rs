//! Two-tier segment cache.
//!
//! [`FutureCache`] holds segments fetched ahead of playback and tracks fetches still in flight.
//! [`UsedCache`] keeps already played segments around, bounded by the size of their files.
//! Both hand out `Arc<CachedSegment>`; the backing file disappears when the last holder drops it.

pub mod future;
pub mod used;

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::{TempDir, TempPath};
use tracing::debug;

use crate::mpd::{Representation, Segment};

pub use future::{FetchTicket, FutureCache};
pub use used::UsedCache;

/// A fetched and remuxed media segment backed by a file in the cache directory.
#[derive(Debug)]
pub struct CachedSegment {
    /// Zero-based index within the representation.
    pub number: usize,
    pub segment: Segment,
    pub representation: Arc<Representation>,
    /// Presentation timestamp of the first sample, in microseconds.
    pub pts_offset_us: i64,
    size: u64,
    file: TempPath,
}

impl CachedSegment {
    pub fn new(
        number: usize,
        segment: Segment,
        representation: Arc<Representation>,
        pts_offset_us: i64,
        file: TempPath,
        size: u64,
    ) -> Self {
        Self {
            number,
            segment,
            representation,
            pts_offset_us,
            size,
            file,
        }
    }

    pub fn path(&self) -> &Path {
        &self.file
    }

    /// Size of the backing file in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }
}

/// Owner of the on-disk segment store.
///
/// Create exactly one per process (or per test) and share it; creating it wipes whatever a
/// previous run left behind.
#[derive(Debug)]
pub struct CacheDirectory {
    root: PathBuf,
    _temp: Option<TempDir>,
}

impl CacheDirectory {
    pub fn create(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        if root.exists() {
            for entry in fs::read_dir(&root)? {
                let path = entry?.path();
                if path.is_dir() {
                    fs::remove_dir_all(&path)?;
                } else {
                    fs::remove_file(&path)?;
                }
            }
        } else {
            fs::create_dir_all(&root)?;
        }
        debug!(path = %root.display(), "Initialized segment cache directory");
        Ok(Self { root, _temp: None })
    }

    /// A private directory removed again when this owner is dropped.
    pub fn temporary() -> io::Result<Self> {
        let temp = tempfile::Builder::new().prefix("dash-cache-").tempdir()?;
        Ok(Self {
            root: temp.path().to_path_buf(),
            _temp: Some(temp),
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Writes `data` to a new uniquely named file and returns its deleting handle.
    pub fn write_segment(&self, prefix: &str, data: &[u8]) -> io::Result<TempPath> {
        let prefix: String = prefix
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        let mut file = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".mp4")
            .tempfile_in(&self.root)?;
        file.write_all(data)?;
        file.flush()?;
        Ok(file.into_temp_path())
    }
}
