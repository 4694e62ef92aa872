pub mod fetcher;

pub use fetcher::{
    FetchResponse, HttpTransport, Mp4Remuxer, RemuxOutput, Remuxer, SegmentFetcher, Transport,
};
