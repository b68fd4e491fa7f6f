// External capture pipeline: argument mapping for the capture program
// plus a reader for the self-framing pcap stream it writes
use crate::traits::Transport;
use framelink_core::{DecodeError, Frame, Result, TransportError, SNAP_LEN};
use std::io::Read;
use std::os::unix::io::{AsRawFd, RawFd};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::time::{Duration, UNIX_EPOCH};

/// Capture program invoked when none is configured.
pub const DEFAULT_PROGRAM: &str = "tcpdump";

// pcap stream magics, microsecond and nanosecond flavors
const MAGIC_US: u32 = 0xa1b2_c3d4;
const MAGIC_NS: u32 = 0xa1b2_3c4d;
const GLOBAL_HEADER_LEN: usize = 24;
const RECORD_HEADER_LEN: usize = 16;

/// Construction parameters for an external capture pipeline.
///
/// `except_filter` is the process-wide exclusion filter: combined with
/// a caller filter as `(filter) and not (except)`, or applied alone as
/// `not (except)`. `program` overrides the capture executable.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub interface: Option<String>,
    pub promiscuous: bool,
    pub filter: Option<String>,
    pub except_filter: Option<String>,
    pub program: Option<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        CaptureConfig {
            interface: None,
            promiscuous: true,
            filter: None,
            except_filter: None,
            program: None,
        }
    }
}

impl CaptureConfig {
    pub fn effective_filter(&self) -> Option<String> {
        match (&self.filter, &self.except_filter) {
            (Some(filter), Some(except)) => Some(format!("({}) and not ({})", filter, except)),
            (None, Some(except)) => Some(format!("not ({})", except)),
            (Some(filter), None) => Some(filter.clone()),
            (None, None) => None,
        }
    }

    /// Argument list for the capture program: write pcap to stdout,
    /// snapshot capped at the link MTU ceiling.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "-w".to_string(),
            "-".to_string(),
            "-s".to_string(),
            SNAP_LEN.to_string(),
        ];
        if let Some(ref iface) = self.interface {
            args.push("-i".to_string());
            args.push(iface.clone());
        }
        if !self.promiscuous {
            args.push("-p".to_string());
        }
        if let Some(filter) = self.effective_filter() {
            args.push(filter);
        }
        args
    }
}

/// Reader collaborator over a self-framing capture byte stream.
pub trait CaptureStream: Send {
    fn read_frame(&mut self, max_size: usize) -> Result<Option<Frame>>;

    fn raw_fd(&self) -> Option<RawFd>;
}

/// Reads the pcap stream a capture program emits on stdout.
///
/// Handles both byte orders and both timestamp resolutions. Every
/// record becomes an opaque frame stamped with the record timestamp;
/// boundary inference is unnecessary because the stream frames itself.
pub struct PcapStreamReader<R: Read> {
    src: R,
    swapped: bool,
    nanos: bool,
}

impl<R: Read> PcapStreamReader<R> {
    /// Consumes the 24-byte global header before returning.
    pub fn new(mut src: R) -> Result<Self> {
        let mut header = [0u8; GLOBAL_HEADER_LEN];
        src.read_exact(&mut header)?;
        let magic = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let (swapped, nanos) = if magic == MAGIC_US {
            (false, false)
        } else if magic == MAGIC_NS {
            (false, true)
        } else if magic == MAGIC_US.swap_bytes() {
            (true, false)
        } else if magic == MAGIC_NS.swap_bytes() {
            (true, true)
        } else {
            return Err(DecodeError::Malformed {
                layer: "pcap",
                reason: format!("unrecognized magic {:#010x}", magic),
            }
            .into());
        };
        Ok(PcapStreamReader {
            src,
            swapped,
            nanos,
        })
    }

    fn field(&self, bytes: &[u8], off: usize) -> u32 {
        let v = u32::from_le_bytes([bytes[off], bytes[off + 1], bytes[off + 2], bytes[off + 3]]);
        if self.swapped {
            v.swap_bytes()
        } else {
            v
        }
    }

    /// Next record, truncated to `max_size` bytes of payload. EOF at a
    /// record boundary means the pipeline has ended.
    pub fn next_record(&mut self, max_size: usize) -> Result<Option<Frame>> {
        let mut header = [0u8; RECORD_HEADER_LEN];
        if let Err(e) = self.src.read_exact(&mut header) {
            return Err(if e.kind() == std::io::ErrorKind::UnexpectedEof {
                TransportError::ConnectionClosed
            } else {
                TransportError::Io(e)
            });
        }
        let ts_sec = self.field(&header, 0);
        let ts_frac = self.field(&header, 4);
        let incl_len = self.field(&header, 8) as usize;
        if incl_len > SNAP_LEN {
            return Err(DecodeError::Malformed {
                layer: "pcap",
                reason: format!("record of {} bytes exceeds snapshot limit", incl_len),
            }
            .into());
        }
        let mut data = vec![0u8; incl_len];
        self.src.read_exact(&mut data)?;
        let take = incl_len.min(max_size);
        let mut frame = Frame::raw(&data[..take]);
        let nanos = if self.nanos {
            ts_frac
        } else {
            ts_frac.saturating_mul(1000)
        };
        frame.ts = Some(UNIX_EPOCH + Duration::new(ts_sec as u64, nanos));
        Ok(Some(frame))
    }
}

impl<R: Read + AsRawFd + Send> CaptureStream for PcapStreamReader<R> {
    fn read_frame(&mut self, max_size: usize) -> Result<Option<Frame>> {
        self.next_record(max_size)
    }

    fn raw_fd(&self) -> Option<RawFd> {
        Some(self.src.as_raw_fd())
    }
}

/// Thin adapter putting an external capture pipeline behind the uniform
/// contract. Receive-only: the pipeline has no usable output channel.
pub struct ExternalCaptureTransport<R: CaptureStream> {
    reader: Option<R>,
    child: Option<Child>,
}

impl<R: CaptureStream> ExternalCaptureTransport<R> {
    /// Wrap an externally managed capture stream.
    pub fn new(reader: R) -> Self {
        ExternalCaptureTransport {
            reader: Some(reader),
            child: None,
        }
    }
}

impl ExternalCaptureTransport<PcapStreamReader<ChildStdout>> {
    /// Run the configured capture program and read its pcap stream.
    pub fn spawn(config: &CaptureConfig) -> Result<Self> {
        let program = config.program.as_deref().unwrap_or(DEFAULT_PROGRAM);
        let mut child = Command::new(program)
            .args(config.to_args())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        let stdout = child.stdout.take().ok_or_else(|| {
            TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "capture program has no stdout",
            ))
        })?;
        let reader = PcapStreamReader::new(stdout)?;
        Ok(ExternalCaptureTransport {
            reader: Some(reader),
            child: Some(child),
        })
    }
}

impl<R: CaptureStream> Transport for ExternalCaptureTransport<R> {
    fn send(&mut self, _frame: &mut Frame) -> Result<usize> {
        Err(TransportError::Unsupported("send on capture pipeline"))
    }

    fn receive(&mut self, max_size: usize) -> Result<Option<Frame>> {
        let reader = self.reader.as_mut().ok_or(TransportError::Closed)?;
        reader.read_frame(max_size)
    }

    fn close(&mut self) {
        self.reader.take();
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }

    fn raw_fd(&self) -> Option<RawFd> {
        self.reader.as_ref().and_then(|r| r.raw_fd())
    }
}

impl<R: CaptureStream> Drop for ExternalCaptureTransport<R> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::Cursor;

    fn push_u32(out: &mut Vec<u8>, v: u32, swapped: bool) {
        let v = if swapped { v.swap_bytes() } else { v };
        out.extend_from_slice(&v.to_le_bytes());
    }

    fn pcap_stream(swapped: bool, nanos: bool, records: &[(u32, u32, &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
        let magic = if nanos { MAGIC_NS } else { MAGIC_US };
        push_u32(&mut out, magic, swapped);
        push_u32(&mut out, 0x0004_0002u32, swapped); // version 2.4
        push_u32(&mut out, 0, swapped); // thiszone
        push_u32(&mut out, 0, swapped); // sigfigs
        push_u32(&mut out, SNAP_LEN as u32, swapped);
        push_u32(&mut out, 1, swapped); // linktype
        for &(sec, frac, data) in records {
            push_u32(&mut out, sec, swapped);
            push_u32(&mut out, frac, swapped);
            push_u32(&mut out, data.len() as u32, swapped);
            push_u32(&mut out, data.len() as u32, swapped);
            out.extend_from_slice(data);
        }
        out
    }

    #[test]
    fn default_args_request_pcap_on_stdout() {
        let config = CaptureConfig::default();
        assert_eq!(config.to_args(), vec!["-w", "-", "-s", "65535"]);
    }

    #[test]
    fn args_cover_interface_and_non_promiscuous_mode() {
        let config = CaptureConfig {
            interface: Some("eth0".into()),
            promiscuous: false,
            ..Default::default()
        };
        assert_eq!(
            config.to_args(),
            vec!["-w", "-", "-s", "65535", "-i", "eth0", "-p"]
        );
    }

    #[test]
    fn filters_combine_with_the_exclusion_filter() {
        let mut config = CaptureConfig {
            filter: Some("tcp port 80".into()),
            except_filter: Some("host 10.0.0.1".into()),
            ..Default::default()
        };
        assert_eq!(
            config.effective_filter().unwrap(),
            "(tcp port 80) and not (host 10.0.0.1)"
        );
        config.filter = None;
        assert_eq!(config.effective_filter().unwrap(), "not (host 10.0.0.1)");
        config.except_filter = None;
        assert_eq!(config.effective_filter(), None);
    }

    #[test]
    fn reads_records_with_timestamps() {
        let bytes = pcap_stream(false, false, &[(100, 250_000, b"abcd"), (101, 0, b"xyz")]);
        let mut reader = PcapStreamReader::new(Cursor::new(bytes)).unwrap();
        let first = reader.next_record(SNAP_LEN).unwrap().unwrap();
        assert_eq!(first.to_bytes(), b"abcd");
        assert_eq!(
            first.ts.unwrap(),
            UNIX_EPOCH + Duration::new(100, 250_000_000)
        );
        let second = reader.next_record(SNAP_LEN).unwrap().unwrap();
        assert_eq!(second.to_bytes(), b"xyz");
        assert!(matches!(
            reader.next_record(SNAP_LEN),
            Err(TransportError::ConnectionClosed)
        ));
    }

    #[test]
    fn reads_swapped_and_nanosecond_streams() {
        let bytes = pcap_stream(true, true, &[(7, 42, b"pq")]);
        let mut reader = PcapStreamReader::new(Cursor::new(bytes)).unwrap();
        let frame = reader.next_record(SNAP_LEN).unwrap().unwrap();
        assert_eq!(frame.to_bytes(), b"pq");
        assert_eq!(frame.ts.unwrap(), UNIX_EPOCH + Duration::new(7, 42));
    }

    #[test]
    fn rejects_unknown_magic() {
        let mut bytes = pcap_stream(false, false, &[]);
        bytes[0] = 0xff;
        assert!(matches!(
            PcapStreamReader::new(Cursor::new(bytes)),
            Err(TransportError::Decode(_))
        ));
    }

    struct QueueStream {
        frames: VecDeque<Frame>,
    }

    impl CaptureStream for QueueStream {
        fn read_frame(&mut self, _max_size: usize) -> Result<Option<Frame>> {
            match self.frames.pop_front() {
                Some(frame) => Ok(Some(frame)),
                None => Err(TransportError::ConnectionClosed),
            }
        }

        fn raw_fd(&self) -> Option<RawFd> {
            None
        }
    }

    #[test]
    fn delegates_receive_and_rejects_send() {
        let frames = VecDeque::from(vec![Frame::raw(b"one"), Frame::raw(b"two")]);
        let mut t = ExternalCaptureTransport::new(QueueStream { frames });
        let mut outgoing = Frame::raw(b"nope");
        assert!(matches!(
            t.send(&mut outgoing),
            Err(TransportError::Unsupported(_))
        ));
        assert_eq!(t.receive(SNAP_LEN).unwrap().unwrap().to_bytes(), b"one");
        assert_eq!(t.receive(SNAP_LEN).unwrap().unwrap().to_bytes(), b"two");
        assert!(matches!(
            t.receive(SNAP_LEN),
            Err(TransportError::ConnectionClosed)
        ));
        t.close();
        assert!(matches!(t.receive(SNAP_LEN), Err(TransportError::Closed)));
    }
}
