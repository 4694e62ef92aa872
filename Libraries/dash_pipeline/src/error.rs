use thiserror::Error;

/// Manifest load failure. No partial presentation survives one of these.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error(transparent)]
    Xml(#[from] quick_xml::Error),

    #[error(transparent)]
    Attribute(#[from] quick_xml::events::attributes::AttrError),

    #[error("Missing mandatory attribute {attribute} on <{element}>")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },

    #[error("Missing element <{0}>")]
    MissingElement(&'static str),

    #[error("Invalid value for {attribute}: {value:?}")]
    InvalidValue {
        attribute: &'static str,
        value: String,
    },

    #[error("Unsupported SegmentTimeline: {0}")]
    UnsupportedTimeline(String),

    #[error("Unsupported presentation type: {0}")]
    UnsupportedPresentationType(String),

    #[error("Malformed manifest: {0}")]
    Malformed(String),

    #[error(transparent)]
    Url(#[from] url::ParseError),
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP error {status} for {url}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error(transparent)]
    Request(#[from] reqwest::Error),

    #[error("Request cancelled: {0}")]
    Cancelled(String),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),
}

/// Programming or manifest-integrity errors. Not recoverable.
#[derive(Error, Debug)]
pub enum CacheStateError {
    #[error("Adaptation set {0} has no representations")]
    EmptyAdaptationSet(usize),

    #[error("Representation {0} has no segments")]
    EmptyRepresentation(String),

    #[error("Segment {number} is out of range for representation {representation}")]
    SegmentOutOfRange {
        representation: String,
        number: usize,
    },

    #[error("Player has been released")]
    Released,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
#[error("Remux failed: {0}")]
pub struct RemuxError(pub String);

#[derive(Error, Debug)]
pub enum DashError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    CacheState(#[from] CacheStateError),

    #[error(transparent)]
    Remux(#[from] RemuxError),
}

impl From<std::io::Error> for DashError {
    fn from(err: std::io::Error) -> Self {
        DashError::CacheState(CacheStateError::Io(err))
    }
}

pub type DashResult<T> = Result<T, DashError>;
