// Boundary inference over a stream connection: peek, decode, then
// consume exactly one frame's worth of bytes
use crate::sys;
use crate::traits::Transport;
use framelink_core::{consumed_len, Decoder, Frame, RawDecoder, Result, TransportError};
use std::io::Write;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::Arc;
use std::time::SystemTime;

/// Transport over a connection whose byte stream carries no frame
/// boundaries, for channels that can peek a whole frame in one call.
///
/// Each `receive` peeks the pending bytes non-destructively, decodes
/// them, and only then reads the decoded frame's length off the
/// channel, so a decode failure never loses bytes. Trailing bytes the
/// decoder marked as padding stay queued for the next call.
pub struct StreamTransport<S: AsRawFd + Write + Send> {
    sock: Option<S>,
    decoder: Arc<dyn Decoder>,
}

impl<S: AsRawFd + Write + Send> StreamTransport<S> {
    pub fn new(sock: S) -> Self {
        Self::with_decoder(sock, Arc::new(RawDecoder))
    }

    pub fn with_decoder(sock: S, decoder: Arc<dyn Decoder>) -> Self {
        StreamTransport {
            sock: Some(sock),
            decoder,
        }
    }
}

impl<S: AsRawFd + Write + Send> Transport for StreamTransport<S> {
    fn send(&mut self, frame: &mut Frame) -> Result<usize> {
        let sock = self.sock.as_mut().ok_or(TransportError::Closed)?;
        let bytes = frame.to_bytes();
        frame.sent_at = Some(SystemTime::now());
        sock.write_all(&bytes).map_err(TransportError::Send)?;
        Ok(bytes.len())
    }

    fn receive(&mut self, max_size: usize) -> Result<Option<Frame>> {
        let sock = self.sock.as_ref().ok_or(TransportError::Closed)?;
        let fd = sock.as_raw_fd();
        let mut buf = vec![0u8; max_size];
        let peeked = sys::peek(fd, &mut buf)?;
        if peeked == 0 {
            return Err(TransportError::ConnectionClosed);
        }
        let mut frame = self.decoder.decode(&buf[..peeked])?;
        let consumed = consumed_len(&mut frame, peeked);
        if consumed > 0 {
            // the peek above proved these bytes are already queued
            sys::recv(fd, &mut buf[..consumed])?;
        }
        Ok(Some(frame))
    }

    fn close(&mut self) {
        self.sock.take();
    }

    fn raw_fd(&self) -> Option<RawFd> {
        self.sock.as_ref().map(|s| s.as_raw_fd())
    }
}

impl<S: AsRawFd + Write + Send> Drop for StreamTransport<S> {
    fn drop(&mut self) {
        self.close();
    }
}
