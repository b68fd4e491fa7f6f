// Cross-call record reassembly: one physical read may carry zero, one
// or several records, and a record may straddle reads in either way
use crate::traits::Transport;
use framelink_core::{consumed_len, Decoder, Frame, RawDecoder, Result, TransportError, SNAP_LEN};
use std::io::{Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::Arc;
use std::time::SystemTime;

/// Transport for channels that cannot peek a whole record in one call.
///
/// Unconsumed bytes persist in a partial buffer between calls. After
/// any successful `receive` the buffer holds only bytes of records not
/// yet returned, never bytes of the record just handed out. A decode
/// failure on buffered leftovers is read as "record still arriving";
/// once fresh bytes have been appended a failure is real and surfaces,
/// as [`TransportError::RecordTooLarge`] when the buffer has outgrown
/// the record limit.
pub struct BufferedTransport<S: Read + Write + AsRawFd + Send> {
    sock: Option<S>,
    decoder: Arc<dyn Decoder>,
    pending: Vec<u8>,
    max_record: usize,
}

impl<S: Read + Write + AsRawFd + Send> BufferedTransport<S> {
    pub fn new(sock: S) -> Self {
        Self::with_decoder(sock, Arc::new(RawDecoder))
    }

    pub fn with_decoder(sock: S, decoder: Arc<dyn Decoder>) -> Self {
        Self::with_limits(sock, decoder, SNAP_LEN)
    }

    pub fn with_limits(sock: S, decoder: Arc<dyn Decoder>, max_record: usize) -> Self {
        BufferedTransport {
            sock: Some(sock),
            decoder,
            pending: Vec::new(),
            max_record,
        }
    }

    /// Bytes currently parked for records not yet returned.
    pub fn buffered_len(&self) -> usize {
        self.pending.len()
    }

    fn try_buffered(&self) -> Option<Frame> {
        if self.pending.is_empty() {
            return None;
        }
        // failure means the buffered prefix is not a whole record yet
        self.decoder.decode(&self.pending).ok()
    }

    fn read_and_decode(&mut self, max_size: usize) -> Result<Frame> {
        let sock = self.sock.as_mut().ok_or(TransportError::Closed)?;
        let mut chunk = vec![0u8; max_size];
        let n = sock.read(&mut chunk)?;
        if n == 0 {
            return Err(TransportError::ConnectionClosed);
        }
        self.pending.extend_from_slice(&chunk[..n]);
        match self.decoder.decode(&self.pending) {
            Ok(frame) => Ok(frame),
            Err(_) if self.pending.len() > self.max_record => Err(TransportError::RecordTooLarge {
                size: self.pending.len(),
                limit: self.max_record,
            }),
            Err(e) => Err(e.into()),
        }
    }
}

impl<S: Read + Write + AsRawFd + Send> Transport for BufferedTransport<S> {
    fn send(&mut self, frame: &mut Frame) -> Result<usize> {
        let sock = self.sock.as_mut().ok_or(TransportError::Closed)?;
        let bytes = frame.to_bytes();
        frame.sent_at = Some(SystemTime::now());
        sock.write_all(&bytes).map_err(TransportError::Send)?;
        Ok(bytes.len())
    }

    fn receive(&mut self, max_size: usize) -> Result<Option<Frame>> {
        if self.sock.is_none() {
            return Err(TransportError::Closed);
        }
        let mut frame = match self.try_buffered() {
            Some(frame) => frame,
            None => self.read_and_decode(max_size)?,
        };
        let consumed = consumed_len(&mut frame, self.pending.len());
        self.pending.drain(..consumed);
        Ok(Some(frame))
    }

    fn close(&mut self) {
        self.sock.take();
    }

    fn raw_fd(&self) -> Option<RawFd> {
        self.sock.as_ref().map(|s| s.as_raw_fd())
    }
}

impl<S: Read + Write + AsRawFd + Send> Drop for BufferedTransport<S> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framelink_core::DecodeError;
    use std::os::unix::net::UnixStream;

    struct NeverDecoder;

    impl Decoder for NeverDecoder {
        fn name(&self) -> &'static str {
            "never"
        }

        fn decode(&self, bytes: &[u8]) -> std::result::Result<Frame, DecodeError> {
            Err(DecodeError::Truncated {
                needed: bytes.len() + 1,
                have: bytes.len(),
            })
        }
    }

    #[test]
    fn zero_length_read_is_connection_closed() {
        let (ours, theirs) = UnixStream::pair().unwrap();
        drop(theirs);
        let mut t = BufferedTransport::new(ours);
        assert!(matches!(
            t.receive(SNAP_LEN),
            Err(TransportError::ConnectionClosed)
        ));
    }

    #[test]
    fn undecodable_buffer_past_limit_is_record_too_large() {
        let (ours, mut theirs) = UnixStream::pair().unwrap();
        let mut t = BufferedTransport::with_limits(ours, Arc::new(NeverDecoder), 8);
        theirs.write_all(&[0u8; 20]).unwrap();
        match t.receive(SNAP_LEN) {
            Err(TransportError::RecordTooLarge { size, limit }) => {
                assert_eq!(size, 20);
                assert_eq!(limit, 8);
            }
            other => panic!("expected RecordTooLarge, got {:?}", other.map(|_| ())),
        }
        // the bytes are still buffered; nothing was lost
        assert_eq!(t.buffered_len(), 20);
    }

    #[test]
    fn undecodable_buffer_under_limit_surfaces_decode_error() {
        let (ours, mut theirs) = UnixStream::pair().unwrap();
        let mut t = BufferedTransport::with_limits(ours, Arc::new(NeverDecoder), 64);
        theirs.write_all(&[0u8; 20]).unwrap();
        assert!(matches!(
            t.receive(SNAP_LEN),
            Err(TransportError::Decode(_))
        ));
    }

    #[test]
    fn close_twice_then_receive_fails_predictably() {
        let (ours, _theirs) = UnixStream::pair().unwrap();
        let mut t = BufferedTransport::new(ours);
        t.close();
        t.close();
        assert!(t.raw_fd().is_none());
        assert!(matches!(t.receive(SNAP_LEN), Err(TransportError::Closed)));
    }
}
