// Decoder capability: the single seam between transports and dissection
use crate::error::DecodeError;
use crate::frame::Frame;

/// Turns wire bytes into a structured frame.
///
/// Decoders are stateless and swappable per transport instance. A
/// decoder claims as many leading bytes as form one complete frame and
/// marks everything after that as a trailing padding chain; the framing
/// transports rely on that chain to compute how many bytes to consume
/// from the channel.
pub trait Decoder: Send + Sync {
    fn name(&self) -> &'static str;

    fn decode(&self, bytes: &[u8]) -> Result<Frame, DecodeError>;
}

/// Default decoder: wraps the input in a single opaque layer. Never fails.
pub struct RawDecoder;

impl Decoder for RawDecoder {
    fn name(&self) -> &'static str {
        "raw"
    }

    fn decode(&self, bytes: &[u8]) -> Result<Frame, DecodeError> {
        Ok(Frame::raw(bytes))
    }
}

/// Bytes consumed from a channel after decoding `total` input bytes:
/// everything except the frame's trailing padding.
pub fn consumed_len(frame: &mut Frame, total: usize) -> usize {
    total - frame.trim_padding()
}
