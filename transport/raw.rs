// Raw socket pair: capture on an AF_PACKET socket, inject through an
// AF_INET raw socket carrying caller-built headers
use crate::sys;
use crate::traits::Transport;
use framelink_core::{
    CaptureMeta, Direction, Dispatch, DispatchTable, Frame, Result, TransportError,
};
use nix::sys::socket::{setsockopt, sockopt};
use std::net::IpAddr;
use std::os::unix::io::{AsRawFd, OwnedFd, RawFd};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{error, warn};

/// Ethertype accepted by default (ETH_P_IP).
pub const ETH_P_IP: u16 = 0x0800;

const RCV_BUF_SIZE: usize = 65536;

/// Transport over a raw link-layer capture socket and a raw
/// network-layer injection socket.
///
/// `receive` dispatches each captured packet through the injected
/// [`DispatchTable`]: a registered link-type decoder is unwrapped down
/// to its payload, a registered protocol-family decoder is returned
/// as-is, and an unknown code pair degrades to the table's default
/// decoder with one warning per read. Self-originated packets yield
/// `Ok(None)`.
pub struct RawCaptureTransport {
    ins: Option<OwnedFd>,
    outs: Option<OwnedFd>,
    table: Arc<DispatchTable>,
    strict: bool,
    closed: bool,
}

impl RawCaptureTransport {
    /// Open with defaults: promiscuous, lenient decoding, shared table.
    pub fn open(protocol: u16, iface: Option<&str>) -> Result<Self> {
        Self::open_with(protocol, iface, true, false, DispatchTable::shared())
    }

    pub fn open_with(
        protocol: u16,
        iface: Option<&str>,
        promisc: bool,
        strict: bool,
        table: Arc<DispatchTable>,
    ) -> Result<Self> {
        let outs = sys::packet::raw_ip_socket()?;
        let ins = sys::packet::capture_socket(protocol)?;
        let _ = setsockopt(&ins, sockopt::RcvBuf, &RCV_BUF_SIZE);
        if let Some(name) = iface {
            let ifindex = nix::net::if_::if_nametoindex(name).map_err(std::io::Error::from)?;
            sys::packet::bind_iface(ins.as_raw_fd(), ifindex, protocol)?;
            if promisc {
                sys::packet::join_promisc(ins.as_raw_fd(), ifindex)?;
            }
        }
        Ok(RawCaptureTransport {
            ins: Some(ins),
            outs: Some(outs),
            table,
            strict,
            closed: false,
        })
    }
}

/// Decode one captured packet according to the dispatch table.
///
/// Lenient mode degrades any decode failure to an opaque raw frame; a
/// degraded result is never unwrapped, since no link header was
/// recognized in it. Interrupted reads never reach this point - they
/// surface from the read itself.
fn decode_captured(
    table: &DispatchTable,
    meta: &CaptureMeta,
    raw: &[u8],
    strict: bool,
) -> Result<Frame> {
    let (decoder, link_level) = match table.resolve(meta) {
        Dispatch::Link(decoder) => (decoder, true),
        Dispatch::Network(decoder) => (decoder, false),
        Dispatch::Fallback(decoder) => {
            warn!(
                ifindex = meta.ifindex,
                protocol = meta.protocol,
                link_type = meta.link_type,
                default = decoder.name(),
                "no decoder registered for captured frame"
            );
            (decoder, false)
        }
    };
    match decoder.decode(raw) {
        Ok(frame) if link_level => Ok(frame.into_payload()),
        Ok(frame) => Ok(frame),
        Err(e) if strict => Err(TransportError::Decode(e)),
        Err(_) => Ok(Frame::raw(raw)),
    }
}

impl Transport for RawCaptureTransport {
    /// Fire-and-forget by design: a channel-level send failure is
    /// logged and swallowed (the call returns `Ok(0)`), matching the
    /// conventional behavior of raw injection sockets. Missing or
    /// non-IPv4 destinations still fail before any write is attempted.
    fn send(&mut self, frame: &mut Frame) -> Result<usize> {
        let outs = self.outs.as_ref().ok_or(TransportError::Closed)?;
        let dst = match frame.dst {
            Some(IpAddr::V4(addr)) => addr,
            Some(IpAddr::V6(_)) => return Err(TransportError::Unsupported("ipv6 destination")),
            None => return Err(TransportError::NoDestination),
        };
        let bytes = frame.to_bytes();
        frame.sent_at = Some(SystemTime::now());
        match sys::packet::send_to_ipv4(outs.as_raw_fd(), &bytes, dst) {
            Ok(n) => Ok(n),
            Err(e) => {
                error!(dst = %dst, err = %e, "raw send failed");
                Ok(0)
            }
        }
    }

    fn receive(&mut self, max_size: usize) -> Result<Option<Frame>> {
        let ins = self.ins.as_ref().ok_or(TransportError::Closed)?;
        let mut buf = vec![0u8; max_size];
        let (n, meta) = sys::packet::recv_with_meta(ins.as_raw_fd(), &mut buf)?;
        if meta.direction == Direction::Outgoing {
            // our own transmissions echo back on the capture socket
            return Ok(None);
        }
        let mut frame = decode_captured(&self.table, &meta, &buf[..n], self.strict)?;
        frame.ts = sys::packet::last_packet_time(ins.as_raw_fd()).ok();
        Ok(Some(frame))
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        // output first, then input; fd ownership closes each at most once
        self.outs.take();
        self.ins.take();
    }

    fn raw_fd(&self) -> Option<RawFd> {
        self.ins.as_ref().map(|fd| fd.as_raw_fd())
    }
}

impl Drop for RawCaptureTransport {
    fn drop(&mut self) {
        self.close();
    }
}
