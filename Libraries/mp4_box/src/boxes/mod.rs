// Box types needed to place a fragmented MP4 media segment on the presentation timeline.
//
// - `generic`: Contains the `Mp4Box` trait, the common interface for all boxes.
// - `mdhd`: Defines the Media Header Box, which carries the track timescale.
// - `tfdt`: Defines the Track Fragment Decode Time Box, which carries the decode time of the
//   first sample of a track fragment.

pub mod generic;
pub mod mdhd;
pub mod tfdt;
