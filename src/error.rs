use thiserror::Error;

/// Errors produced while locating or materializing an object.
#[derive(Error, Debug)]
pub enum OdbError {
    #[error("object not found")]
    NotFound,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("bad magic number")]
    BadMagic,

    #[error("bad version: {0}")]
    BadVersion(u32),

    #[error("unsupported pack-index version: {0}")]
    UnsupportedVersion(u32),

    #[error("pack index uses a 64-bit offset, which this reader does not support")]
    LargeOffsetUnsupported,

    #[error("variable-length size header exceeded the continuation-byte budget")]
    HeaderOverflow,

    #[error("malformed delta: {0}")]
    MalformedDelta(String),

    #[error("malformed object: {0}")]
    MalformedObject(String),

    #[error("expected a standard object at the base of a delta chain, found {0}")]
    UnexpectedBaseType(String),

    #[error("delta chain does not strictly decrease in pack offset")]
    DeltaCycle,

    #[error("delta chain exceeded the maximum supported depth of {0}")]
    DeltaTooDeep(usize),

    #[error("unknown object type code: {0}")]
    UnknownType(u8),
}

pub type Result<T> = std::result::Result<T, OdbError>;
