use crate::{format_fourcc, read_u32_be, read_u64_be};

/// Header of a single box: its type, total size (header included) and header length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxHeader {
    pub box_type: [u8; 4],
    pub size: usize,
    pub header_len: usize,
}

pub fn read_box_header(data: &[u8]) -> Result<BoxHeader, String> {
    if data.len() < 8 {
        return Err("Buffer too small for MP4 box header".into());
    }

    let size32 = read_u32_be(data, 0)?;
    let box_type: [u8; 4] = [data[4], data[5], data[6], data[7]];

    let (size, header_len) = match size32 {
        // Box extends to the end of the buffer
        0 => (data.len(), 8),
        // 64-bit largesize follows the type
        1 => (read_u64_be(data, 8)? as usize, 16),
        size => (size as usize, 8),
    };

    if size < header_len {
        return Err(format!(
            "Corrupted MP4 box size of box {}: reported size {}",
            format_fourcc(&box_type),
            size
        ));
    }
    if size > data.len() {
        return Err(format!(
            "Incomplete box {}: reported size {}, available {}",
            format_fourcc(&box_type),
            size,
            data.len()
        ));
    }

    Ok(BoxHeader {
        box_type,
        size,
        header_len,
    })
}

/// Iterates the sibling boxes in `data`, yielding each header with the full box bytes.
pub struct BoxIter<'a> {
    data: &'a [u8],
}

impl<'a> Iterator for BoxIter<'a> {
    type Item = Result<(BoxHeader, &'a [u8]), String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.is_empty() {
            return None;
        }
        match read_box_header(self.data) {
            Ok(header) => {
                let (current, rest) = self.data.split_at(header.size);
                self.data = rest;
                Some(Ok((header, current)))
            }
            Err(err) => {
                self.data = &[];
                Some(Err(err))
            }
        }
    }
}

pub fn iter_boxes(data: &[u8]) -> BoxIter<'_> {
    BoxIter { data }
}

/// Finds the first box reached by following `path` from the top level, descending into each
/// matched box as a container. Returns the complete bytes of the last box in the path.
pub fn find_box<'a>(data: &'a [u8], path: &[&[u8; 4]]) -> Result<Option<&'a [u8]>, String> {
    let Some((target, rest)) = path.split_first() else {
        return Ok(None);
    };

    for item in iter_boxes(data) {
        let (header, bytes) = item?;
        if &header.box_type != *target {
            continue;
        }
        if rest.is_empty() {
            return Ok(Some(bytes));
        }
        if let Some(found) = find_box(&bytes[header.header_len..], rest)? {
            return Ok(Some(found));
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_large_size_header() {
        let mut data = Vec::new();
        data.extend_from_slice(&1u32.to_be_bytes());
        data.extend_from_slice(b"mdat");
        data.extend_from_slice(&20u64.to_be_bytes());
        data.extend_from_slice(&[0u8; 4]);

        let header = read_box_header(&data).unwrap();
        assert_eq!(header.box_type, *b"mdat");
        assert_eq!(header.size, 20);
        assert_eq!(header.header_len, 16);
    }

    #[test]
    fn test_incomplete_box() {
        let mut data = Vec::new();
        data.extend_from_slice(&64u32.to_be_bytes());
        data.extend_from_slice(b"moof");
        assert!(read_box_header(&data).is_err());
        assert!(find_box(&data, &[b"moof"]).is_err());
    }

    #[test]
    fn test_find_nested_box() {
        let mut inner = Vec::new();
        inner.extend_from_slice(&12u32.to_be_bytes());
        inner.extend_from_slice(b"tfdt");
        inner.extend_from_slice(&[0u8; 4]);
        let mut outer = Vec::new();
        outer.extend_from_slice(&(8 + inner.len() as u32).to_be_bytes());
        outer.extend_from_slice(b"traf");
        outer.extend_from_slice(&inner);

        assert_eq!(find_box(&outer, &[b"traf", b"tfdt"]).unwrap(), Some(&inner[..]));
        assert_eq!(find_box(&outer, &[b"traf", b"trun"]).unwrap(), None);
        assert_eq!(iter_boxes(&outer).count(), 1);
    }
}
