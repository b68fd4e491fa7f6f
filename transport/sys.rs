// Thin safe wrappers over the raw socket syscalls the transports need
use std::io;
use std::os::unix::io::RawFd;

/// Non-destructive read: fills `buf` without advancing the socket
/// cursor. Returns the byte count available (0 on a closed peer).
pub(crate) fn peek(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    let n = unsafe {
        libc::recv(
            fd,
            buf.as_mut_ptr() as *mut libc::c_void,
            buf.len(),
            libc::MSG_PEEK,
        )
    };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(n as usize)
}

/// Destructive read of up to `buf.len()` bytes.
pub(crate) fn recv(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    let n = unsafe { libc::recv(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len(), 0) };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(n as usize)
}

#[cfg(target_os = "linux")]
pub(crate) mod packet {
    use framelink_core::{CaptureMeta, Direction};
    use std::io;
    use std::mem;
    use std::net::Ipv4Addr;
    use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    // `SIOCGSTAMP` (from <linux/sockios.h>) is not exported by the `libc`
    // version in use; supply its fixed Linux value so the ioctl call below
    // keeps its original meaning.
    const SIOCGSTAMP: libc::c_ulong = 0x8906;

    fn check(rc: libc::c_int) -> io::Result<libc::c_int> {
        if rc < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(rc)
        }
    }

    /// AF_PACKET capture socket filtered to one ethertype.
    pub fn capture_socket(protocol: u16) -> io::Result<OwnedFd> {
        let fd = check(unsafe {
            libc::socket(libc::AF_PACKET, libc::SOCK_RAW, protocol.to_be() as libc::c_int)
        })?;
        Ok(unsafe { OwnedFd::from_raw_fd(fd) })
    }

    /// AF_INET raw socket in header-inclusion mode: the caller supplies
    /// complete network-level headers.
    pub fn raw_ip_socket() -> io::Result<OwnedFd> {
        let fd = check(unsafe { libc::socket(libc::AF_INET, libc::SOCK_RAW, libc::IPPROTO_RAW) })?;
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };
        let one: libc::c_int = 1;
        check(unsafe {
            libc::setsockopt(
                fd.as_raw_fd(),
                libc::IPPROTO_IP,
                libc::IP_HDRINCL,
                &one as *const _ as *const libc::c_void,
                mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        })?;
        Ok(fd)
    }

    /// Restrict a capture socket to one interface and ethertype.
    pub fn bind_iface(fd: RawFd, ifindex: u32, protocol: u16) -> io::Result<()> {
        let mut sa: libc::sockaddr_ll = unsafe { mem::zeroed() };
        sa.sll_family = libc::AF_PACKET as libc::c_ushort;
        sa.sll_protocol = protocol.to_be();
        sa.sll_ifindex = ifindex as libc::c_int;
        check(unsafe {
            libc::bind(
                fd,
                &sa as *const _ as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        })?;
        Ok(())
    }

    /// Enable promiscuous membership on one interface.
    pub fn join_promisc(fd: RawFd, ifindex: u32) -> io::Result<()> {
        let mut req: libc::packet_mreq = unsafe { mem::zeroed() };
        req.mr_ifindex = ifindex as libc::c_int;
        req.mr_type = libc::PACKET_MR_PROMISC as libc::c_ushort;
        check(unsafe {
            libc::setsockopt(
                fd,
                libc::SOL_PACKET,
                libc::PACKET_ADD_MEMBERSHIP,
                &req as *const _ as *const libc::c_void,
                mem::size_of::<libc::packet_mreq>() as libc::socklen_t,
            )
        })?;
        Ok(())
    }

    /// One capture read: payload bytes plus the link-level metadata the
    /// kernel attaches to the source address.
    pub fn recv_with_meta(fd: RawFd, buf: &mut [u8]) -> io::Result<(usize, CaptureMeta)> {
        let mut sa: libc::sockaddr_ll = unsafe { mem::zeroed() };
        let mut sa_len = mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t;
        let n = unsafe {
            libc::recvfrom(
                fd,
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
                0,
                &mut sa as *mut _ as *mut libc::sockaddr,
                &mut sa_len,
            )
        };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        let meta = CaptureMeta {
            ifindex: sa.sll_ifindex as u32,
            protocol: u16::from_be(sa.sll_protocol),
            direction: Direction::from_raw(sa.sll_pkttype),
            link_type: sa.sll_hatype,
        };
        Ok((n as usize, meta))
    }

    /// Kernel receive timestamp of the last packet read from `fd`.
    pub fn last_packet_time(fd: RawFd) -> io::Result<SystemTime> {
        let mut tv: libc::timeval = unsafe { mem::zeroed() };
        check(unsafe { libc::ioctl(fd, SIOCGSTAMP as _, &mut tv) })?;
        Ok(UNIX_EPOCH + Duration::new(tv.tv_sec as u64, (tv.tv_usec as u32) * 1000))
    }

    /// Raw network-level send addressed to `dst` with no port component.
    pub fn send_to_ipv4(fd: RawFd, bytes: &[u8], dst: Ipv4Addr) -> io::Result<usize> {
        let mut sa: libc::sockaddr_in = unsafe { mem::zeroed() };
        sa.sin_family = libc::AF_INET as libc::sa_family_t;
        sa.sin_port = 0;
        sa.sin_addr = libc::in_addr {
            s_addr: u32::from_ne_bytes(dst.octets()),
        };
        let n = unsafe {
            libc::sendto(
                fd,
                bytes.as_ptr() as *const libc::c_void,
                bytes.len(),
                0,
                &sa as *const _ as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
            )
        };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(n as usize)
    }
}
