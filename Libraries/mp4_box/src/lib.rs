//! # Minimal ISO-BMFF reader
//!
//! Fragmented MP4 media segments delivered over DASH consist of a sequence of **boxes**
//! (also called atoms). Each box starts with a header holding its size and a four character
//! type, followed by a payload that is either raw data or further nested boxes.
//!
//! ## What this crate reads
//! Only what a segment pipeline needs to place a media segment on the presentation timeline:
//! - `moov/trak/mdia/mdhd` in the initialization segment gives the track **timescale**.
//! - `moof/traf/tfdt` in the media segment gives the **base media decode time** of its first
//!   sample, expressed in that timescale.
//!
//! Combining both yields the presentation timestamp offset of a segment in microseconds, see
//! [`presentation_offset_us`].

pub mod boxes;
pub mod reader;

use boxes::{generic::Mp4Box, mdhd::MdhdBox, tfdt::TfdtBox};

pub fn format_fourcc(fourcc: &[u8; 4]) -> String {
    std::str::from_utf8(fourcc).unwrap_or("????").to_string()
}

pub fn read_u32_be(data: &[u8], offset: usize) -> Result<u32, String> {
    data.get(offset..offset + 4)
        .and_then(|bytes| bytes.try_into().ok())
        .map(u32::from_be_bytes)
        .ok_or_else(|| "Out of bounds while reading u32".into())
}

pub fn read_u64_be(data: &[u8], offset: usize) -> Result<u64, String> {
    data.get(offset..offset + 8)
        .and_then(|bytes| bytes.try_into().ok())
        .map(u64::from_be_bytes)
        .ok_or_else(|| "Out of bounds while reading u64".into())
}

pub fn read_version_and_flags(data: &[u8]) -> Result<(u8, u32), String> {
    let bytes = data
        .get(0..4)
        .ok_or("Out of bounds while reading version and flags")?;
    let flags = ((bytes[1] as u32) << 16) | ((bytes[2] as u32) << 8) | bytes[3] as u32;
    Ok((bytes[0], flags))
}

pub fn write_version_and_flags(buffer: &mut Vec<u8>, version: u8, flags: u32) {
    buffer.push(version);
    buffer.extend_from_slice(&flags.to_be_bytes()[1..4]);
}

/// Presentation timestamp offset (microseconds) of `media`, using the track timescale found in
/// `init`. Returns `None` when either box is missing or malformed.
pub fn presentation_offset_us(init: &[u8], media: &[u8]) -> Option<i64> {
    let mdhd = reader::find_box(init, &[b"moov", b"trak", b"mdia", b"mdhd"])
        .ok()
        .flatten()?;
    let (mdhd, _) = MdhdBox::read_box(mdhd).ok()?;

    let tfdt = reader::find_box(media, &[b"moof", b"traf", b"tfdt"])
        .ok()
        .flatten()?;
    let (tfdt, _) = TfdtBox::read_box(tfdt).ok()?;

    if mdhd.timescale == 0 {
        return None;
    }
    let seconds = tfdt.base_decode_time as f64 / mdhd.timescale as f64;
    Some((seconds * 1_000_000.0).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrap(box_type: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(&(8 + payload.len() as u32).to_be_bytes());
        buffer.extend_from_slice(box_type);
        buffer.extend_from_slice(payload);
        buffer
    }

    fn init_segment(timescale: u32) -> Vec<u8> {
        let mut mdhd = Vec::new();
        MdhdBox {
            timescale,
            ..Default::default()
        }
        .write_box(&mut mdhd);
        let mdia = wrap(b"mdia", &mdhd);
        let trak = wrap(b"trak", &mdia);
        let mut init = wrap(b"ftyp", b"iso6\0\0\0\0");
        init.extend(wrap(b"moov", &trak));
        init
    }

    fn media_segment(base_decode_time: u64) -> Vec<u8> {
        let mut tfdt = Vec::new();
        TfdtBox {
            version: 1,
            flags: 0,
            base_decode_time,
        }
        .write_box(&mut tfdt);
        let traf = wrap(b"traf", &tfdt);
        let mut media = wrap(b"styp", b"msdh\0\0\0\0");
        media.extend(wrap(b"moof", &traf));
        media.extend(wrap(b"mdat", &[0u8; 16]));
        media
    }

    #[test]
    fn test_presentation_offset() {
        let init = init_segment(90_000);
        let media = media_segment(180_000);
        assert_eq!(presentation_offset_us(&init, &media), Some(2_000_000));
    }

    #[test]
    fn test_presentation_offset_missing_boxes() {
        let init = init_segment(1000);
        assert_eq!(presentation_offset_us(&init, b"garbage"), None);
        assert_eq!(presentation_offset_us(&[], &media_segment(10)), None);
    }

    #[test]
    fn test_version_and_flags() {
        let mut buffer = Vec::new();
        write_version_and_flags(&mut buffer, 1, 0x020304);
        assert_eq!(buffer, vec![1, 2, 3, 4]);
        assert_eq!(read_version_and_flags(&buffer), Ok((1, 0x020304)));
        assert!(read_version_and_flags(&buffer[..2]).is_err());
    }
}
