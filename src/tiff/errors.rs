//! Custom error types for TIFF processing

use std::fmt;
use std::io;

/// TIFF-specific error types, matching the error kinds a reader/writer may
/// surface to a caller. A Reader/Writer instance is poisoned by the first
/// fatal error: subsequent calls on the same instance return the same kind
/// until the caller releases it.
#[derive(Debug)]
pub enum TiffError {
    /// The stream is not a recognizable TIFF/BigTIFF container (bad magic,
    /// bad version, or too short to hold a header).
    NotTiff,
    /// An IFD entry or chain is structurally invalid: out-of-range field
    /// type, disallowed zero count, duplicate tag, truncated external
    /// payload, or predictor/codec mismatch.
    MalformedIFD(String),
    /// The compression code in tag 259 has no registered codec.
    UnsupportedCompression(u64),
    /// A bit width or sample format cannot be represented by this engine.
    UnsupportedFormat(String),
    /// A decoded payload or bitstream is inconsistent with its declared
    /// size, or a tile body could not be decoded to the expected length
    /// under a lossless codec.
    CorruptedData(String),
    /// An underlying codec reported a failure while encoding/decoding.
    CodecFailure(String),
    /// An operation would allocate or expand memory beyond a configured
    /// defensive cap.
    ResourceLimit(String),
    /// I/O error from the underlying stream.
    IoError(io::Error),
    /// The owning Reader/Writer was dropped or released between tiles;
    /// the next operation on it surfaces this instead of continuing.
    Cancelled,

    // --- finer-grained header diagnostics ---
    /// Invalid TIFF header
    InvalidHeader,
    /// Invalid byte order marker
    InvalidByteOrder(u16),
    /// Invalid BigTIFF header
    InvalidBigTIFFHeader,
    /// Unsupported TIFF version
    UnsupportedVersion(u16),
    /// Tag not found
    TagNotFound(u16),
    /// Unsupported field type
    UnsupportedFieldType(u16),
    /// Image dimensions not found
    MissingDimensions,
    /// Generic error with message, used for conditions with no dedicated
    /// variant above (e.g. programmer-facing configuration mistakes).
    GenericError(String),
}

impl fmt::Display for TiffError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TiffError::NotTiff => write!(f, "not a TIFF or BigTIFF file"),
            TiffError::MalformedIFD(msg) => write!(f, "malformed IFD: {}", msg),
            TiffError::UnsupportedCompression(c) => write!(f, "unsupported compression code: {}", c),
            TiffError::UnsupportedFormat(msg) => write!(f, "unsupported format: {}", msg),
            TiffError::CorruptedData(msg) => write!(f, "corrupted data: {}", msg),
            TiffError::CodecFailure(msg) => write!(f, "codec failure: {}", msg),
            TiffError::ResourceLimit(msg) => write!(f, "resource limit exceeded: {}", msg),
            TiffError::IoError(e) => write!(f, "I/O error: {}", e),
            TiffError::Cancelled => write!(f, "operation cancelled"),
            TiffError::InvalidHeader => write!(f, "invalid TIFF header"),
            TiffError::InvalidByteOrder(v) => write!(f, "invalid byte order marker: {:#06x}", v),
            TiffError::InvalidBigTIFFHeader => write!(f, "invalid BigTIFF header"),
            TiffError::UnsupportedVersion(v) => write!(f, "unsupported TIFF version: {}", v),
            TiffError::TagNotFound(tag) => write!(f, "tag not found: {}", tag),
            TiffError::UnsupportedFieldType(ft) => write!(f, "unsupported field type: {}", ft),
            TiffError::MissingDimensions => write!(f, "image dimensions not found"),
            TiffError::GenericError(msg) => write!(f, "TIFF error: {}", msg),
        }
    }
}

impl std::error::Error for TiffError {}

impl From<io::Error> for TiffError {
    fn from(error: io::Error) -> Self {
        TiffError::IoError(error)
    }
}

impl From<String> for TiffError {
    fn from(msg: String) -> Self {
        TiffError::GenericError(msg)
    }
}

/// Result type for TIFF operations
pub type TiffResult<T> = Result<T, TiffError>;
