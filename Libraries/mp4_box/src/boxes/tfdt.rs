use crate::{format_fourcc, read_u32_be, read_u64_be, read_version_and_flags, write_version_and_flags};

use super::generic::{full_box_payload, Mp4Box};

// The `TfdtBox` struct represents a Track Fragment Decode Time Box.
// It gives the decode time of the first sample of a track fragment, in the track timescale.
//
// Fields:
// - `version`: 0 stores the decode time in 32 bits, 1 in 64 bits.
// - `base_decode_time`: Timeline position of the first sample in timescale units.
#[derive(Default, Clone, PartialEq, Eq)]
pub struct TfdtBox {
    pub version: u8,
    pub flags: u32,
    pub base_decode_time: u64,
}

impl std::fmt::Debug for TfdtBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TfdtBox")
            .field("box_size", &self.box_size())
            .field("box_type", &format_fourcc(&self.box_type()))
            .field("version", &self.version)
            .field("flags", &self.flags)
            .field("base_decode_time", &self.base_decode_time)
            .finish()
    }
}

impl Mp4Box for TfdtBox {
    fn box_type(&self) -> [u8; 4] {
        *b"tfdt"
    }

    // 8 header + 4 version/flags + decode time (32 or 64 bits)
    fn box_size(&self) -> u32 {
        8 + 4 + if self.version == 1 { 8 } else { 4 }
    }

    fn write_box(&self, buffer: &mut Vec<u8>) {
        buffer.extend_from_slice(&self.box_size().to_be_bytes());
        buffer.extend_from_slice(&self.box_type());
        write_version_and_flags(buffer, self.version, self.flags);
        if self.version == 1 {
            buffer.extend_from_slice(&self.base_decode_time.to_be_bytes());
        } else {
            buffer.extend_from_slice(&(self.base_decode_time as u32).to_be_bytes());
        }
    }

    fn read_box(data: &[u8]) -> Result<(Self, usize), String> {
        let (size, payload) = full_box_payload(data, b"tfdt")?;
        let (version, flags) = read_version_and_flags(payload)?;

        let base_decode_time = match version {
            0 => read_u32_be(payload, 4)? as u64,
            1 => read_u64_be(payload, 4)?,
            other => return Err(format!("Unsupported TFDT version: {}", other)),
        };

        Ok((
            TfdtBox {
                version,
                flags,
                base_decode_time,
            },
            size,
        ))
    }
}
