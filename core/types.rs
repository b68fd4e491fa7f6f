// Capture metadata accompanying every read from a raw link-layer socket
use std::fmt;

/// Link MTU ceiling: largest payload read in one call and the fixed
/// snapshot length handed to external capture programs.
pub const SNAP_LEN: usize = 65535;

// Packet-type codes from linux/if_packet.h
const PACKET_HOST: u8 = 0;
const PACKET_OUTGOING: u8 = 4;

/// Direction of a captured packet relative to this host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Incoming,
    /// Sent by this host; capture reads flagged this way yield no frame.
    Outgoing,
    Other,
}

impl Direction {
    pub fn from_raw(pkttype: u8) -> Self {
        match pkttype {
            PACKET_HOST => Direction::Incoming,
            PACKET_OUTGOING => Direction::Outgoing,
            _ => Direction::Other,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Direction::Incoming => write!(f, "incoming"),
            Direction::Outgoing => write!(f, "outgoing"),
            Direction::Other => write!(f, "other"),
        }
    }
}

/// Link-level metadata for one capture read.
#[derive(Debug, Clone, Copy)]
pub struct CaptureMeta {
    /// Interface the packet arrived on.
    pub ifindex: u32,
    /// Protocol family code (ethertype), host byte order.
    pub protocol: u16,
    pub direction: Direction,
    /// Hardware/link type code (ARPHRD_*).
    pub link_type: u16,
}
