use crate::{format_fourcc, read_u32_be, read_u64_be, read_version_and_flags, write_version_and_flags};

use super::generic::{full_box_payload, Mp4Box};

// The `MdhdBox` struct represents a Media Header Box.
// Only the timescale matters for segment timing; the remaining fields are kept so the box can
// be written back unchanged.
//
// Fields:
// - `timescale`: Number of time units per second for this track.
// - `duration`: Duration of the media in timescale units (32 bits in version 0, 64 in version 1).
// - `language`: ISO 639-2/T language code, packed as three 5-bit characters.
#[derive(Clone, PartialEq, Eq)]
pub struct MdhdBox {
    pub version: u8,
    pub flags: u32,
    pub creation_time: u64,
    pub modification_time: u64,
    pub timescale: u32,
    pub duration: u64,
    pub language: String,
}

impl Default for MdhdBox {
    fn default() -> Self {
        MdhdBox {
            version: 0,
            flags: 0,
            creation_time: 0,
            modification_time: 0,
            timescale: 1000,
            duration: 0,
            language: "und".to_string(),
        }
    }
}

impl std::fmt::Debug for MdhdBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MdhdBox")
            .field("box_size", &self.box_size())
            .field("box_type", &format_fourcc(&self.box_type()))
            .field("version", &self.version)
            .field("timescale", &self.timescale)
            .field("duration", &self.duration)
            .field("language", &self.language)
            .finish()
    }
}

fn pack_language(language: &str) -> u16 {
    language
        .bytes()
        .chain(std::iter::repeat(b'a'))
        .take(3)
        .fold(0u16, |packed, c| (packed << 5) | (c.saturating_sub(0x60) as u16 & 0x1F))
}

fn unpack_language(packed: u16) -> String {
    [10u16, 5, 0]
        .iter()
        .map(|shift| (((packed >> shift) & 0x1F) as u8 + 0x60) as char)
        .collect()
}

impl Mp4Box for MdhdBox {
    fn box_type(&self) -> [u8; 4] {
        *b"mdhd"
    }

    // header + version/flags + times + language (2) + pre_defined (2)
    fn box_size(&self) -> u32 {
        let times = if self.version == 1 { 28 } else { 16 };
        8 + 4 + times + 4
    }

    fn write_box(&self, buffer: &mut Vec<u8>) {
        buffer.extend_from_slice(&self.box_size().to_be_bytes());
        buffer.extend_from_slice(&self.box_type());
        write_version_and_flags(buffer, self.version, self.flags);
        if self.version == 1 {
            buffer.extend_from_slice(&self.creation_time.to_be_bytes());
            buffer.extend_from_slice(&self.modification_time.to_be_bytes());
            buffer.extend_from_slice(&self.timescale.to_be_bytes());
            buffer.extend_from_slice(&self.duration.to_be_bytes());
        } else {
            buffer.extend_from_slice(&(self.creation_time as u32).to_be_bytes());
            buffer.extend_from_slice(&(self.modification_time as u32).to_be_bytes());
            buffer.extend_from_slice(&self.timescale.to_be_bytes());
            buffer.extend_from_slice(&(self.duration as u32).to_be_bytes());
        }
        buffer.extend_from_slice(&pack_language(&self.language).to_be_bytes());
        buffer.extend_from_slice(&[0, 0]);
    }

    fn read_box(data: &[u8]) -> Result<(Self, usize), String> {
        let (size, payload) = full_box_payload(data, b"mdhd")?;
        let (version, flags) = read_version_and_flags(payload)?;

        let (creation_time, modification_time, timescale, duration, language_at) = match version {
            0 => (
                read_u32_be(payload, 4)? as u64,
                read_u32_be(payload, 8)? as u64,
                read_u32_be(payload, 12)?,
                read_u32_be(payload, 16)? as u64,
                20,
            ),
            1 => (
                read_u64_be(payload, 4)?,
                read_u64_be(payload, 12)?,
                read_u32_be(payload, 20)?,
                read_u64_be(payload, 24)?,
                32,
            ),
            other => return Err(format!("Unsupported MDHD version: {}", other)),
        };

        let language = payload
            .get(language_at..language_at + 2)
            .map(|b| unpack_language(u16::from_be_bytes([b[0], b[1]])))
            .ok_or("Out of bounds while reading MDHD language")?;

        Ok((
            MdhdBox {
                version,
                flags,
                creation_time,
                modification_time,
                timescale,
                duration,
                language,
            },
            size,
        ))
    }
}
