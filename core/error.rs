// Error taxonomy shared by all transports
use thiserror::Error;

/// Failure modes of the transport layer.
///
/// `Io` carries channel-level read errors verbatim; in particular an
/// interrupted blocking read surfaces as `Io` with
/// `ErrorKind::Interrupted` and is never reclassified as a decode
/// failure, regardless of strict/lenient mode.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Zero-length read on a stream channel. Fatal to the current call,
    /// never retried internally.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// Malformed bytes where structure was expected.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Channel-level write failure. Stream transports propagate this;
    /// the raw-capture transport logs and swallows it instead.
    #[error("send failed: {0}")]
    Send(#[source] std::io::Error),

    /// The partial buffer outgrew the record size limit while still
    /// undecodable.
    #[error("buffered record of {size} bytes exceeds limit of {limit}")]
    RecordTooLarge { size: usize, limit: usize },

    /// Operation on a handle that has already been closed.
    #[error("transport is closed")]
    Closed,

    /// Operation the transport flavor cannot perform.
    #[error("{0} is not supported on this transport")]
    Unsupported(&'static str),

    /// Raw send needs a destination address on the frame.
    #[error("frame has no destination address")]
    NoDestination,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Decoder failure: the bytes did not form a complete, well-formed frame.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Not enough bytes for the structure the decoder expected. In a
    /// buffered context this usually means the record is still arriving.
    #[error("truncated input: need {needed} bytes, have {have}")]
    Truncated { needed: usize, have: usize },

    #[error("malformed {layer} layer: {reason}")]
    Malformed { layer: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, TransportError>;
