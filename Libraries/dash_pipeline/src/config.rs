use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Minimum buffer depth the player aims for, regardless of the manifest.
pub const DEFAULT_MIN_BUFFER_FLOOR_US: u64 = 10_000_000;

pub const DEFAULT_USED_CACHE_CAPACITY_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct PlayerConfig {
    /// Lower bound for the effective minimum buffer time, in microseconds.
    pub min_buffer_floor_us: u64,
    /// Byte budget of the used segment cache. 1 effectively disables it.
    pub used_cache_capacity_bytes: u64,
    /// Extra headers sent with every manifest and segment request.
    pub request_headers: BTreeMap<String, String>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            min_buffer_floor_us: DEFAULT_MIN_BUFFER_FLOOR_US,
            used_cache_capacity_bytes: DEFAULT_USED_CACHE_CAPACITY_BYTES,
            request_headers: BTreeMap::new(),
        }
    }
}

impl PlayerConfig {
    pub fn with_min_buffer_floor_us(mut self, us: u64) -> Self {
        self.min_buffer_floor_us = us;
        self
    }

    pub fn with_used_cache_capacity(mut self, bytes: u64) -> Self {
        self.used_cache_capacity_bytes = bytes.max(1);
        self
    }

    pub fn with_request_header(mut self, name: &str, value: &str) -> Self {
        self.request_headers.insert(name.to_string(), value.to_string());
        self
    }

    /// max(manifest minBufferTime, configured floor)
    pub fn effective_min_buffer_us(&self, manifest_min_buffer_us: u64) -> u64 {
        manifest_min_buffer_us.max(self.min_buffer_floor_us)
    }
}
