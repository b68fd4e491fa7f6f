// Uniform transport contract - every channel flavor implements this
use framelink_core::{Frame, Result};
use std::os::unix::io::RawFd;
use std::time::Duration;

/// One send/receive contract over raw sockets, stream connections,
/// buffered record channels and external capture pipelines.
///
/// Handles are OPEN from construction and CLOSED terminally by
/// `close()`; `send` and `receive` on a closed handle fail with
/// `TransportError::Closed`. A handle is single-threaded: calling into
/// it from several threads without external synchronization is not
/// supported. `receive` blocks with the channel's native semantics and
/// never times out on its own - poll `raw_fd()` first to layer timeouts
/// on top.
pub trait Transport: Send {
    /// Serialize one frame, stamp its send time and write it out,
    /// returning the byte count written.
    fn send(&mut self, frame: &mut Frame) -> Result<usize>;

    /// Block until one frame is available and return it. `None` is
    /// reserved for reads that yield no frame by design (self-originated
    /// capture traffic); channel teardown is always an error.
    fn receive(&mut self, max_size: usize) -> Result<Option<Frame>>;

    /// Close the underlying channels. Idempotent; never fails. The
    /// output channel goes first when it is distinct from the input.
    fn close(&mut self);

    /// Pollable descriptor of the input channel, `None` once closed.
    fn raw_fd(&self) -> Option<RawFd>;
}

/// Block until `fd` is readable or the timeout expires. `None` waits
/// forever. Returns whether the descriptor became readable.
pub fn wait_readable(fd: RawFd, timeout: Option<Duration>) -> std::io::Result<bool> {
    let mut pollfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    let ms = timeout.map_or(-1, |t| t.as_millis().min(i32::MAX as u128) as libc::c_int);
    let rc = unsafe { libc::poll(&mut pollfd, 1, ms) };
    if rc < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(rc > 0 && pollfd.revents & libc::POLLIN != 0)
}
