// The `Mp4Box` trait defines a generic interface for MP4 boxes.
//
// Required Methods:
// - `box_type`: Returns the 4-byte type identifier of the box.
// - `box_size`: Calculates the total size of the box in bytes, including the header.
// - `write_box`: Serializes the box into a buffer.
// - `read_box`: Parses the box from the start of a byte slice.
pub trait Mp4Box {
    fn box_type(&self) -> [u8; 4];

    fn box_size(&self) -> u32;

    fn write_box(&self, buffer: &mut Vec<u8>);

    /// Reads a box from the given byte slice.
    /// Returns a tuple of (BoxInstance, bytes_consumed).
    fn read_box(data: &[u8]) -> Result<(Self, usize), String>
    where
        Self: Sized;
}

/// Validates the header of a full box of type `expected` and returns (size, payload).
pub(crate) fn full_box_payload<'a>(
    data: &'a [u8],
    expected: &[u8; 4],
) -> Result<(usize, &'a [u8]), String> {
    let header = crate::reader::read_box_header(data)?;
    if &header.box_type != expected {
        return Err(format!(
            "Not a {} box, found {}",
            crate::format_fourcc(expected),
            crate::format_fourcc(&header.box_type)
        ));
    }
    Ok((header.size, &data[header.header_len..header.size]))
}
