//! Cross-thread wakeup primitive. A producer raises it when a queue goes
//! non-empty; the consumer observes it through `poll(2)` and drains it
//! once per emptying of the queue. Raises coalesce: the primitive carries
//! one bit of state, and the queue length under the mutex is
//! authoritative.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

/// The seam between the queue and the platform wakeup object. One
/// implementation per target platform; POSIX gets the self-pipe below.
pub trait Wakeup {
    /// Moves the primitive to "raised". Idempotent: raising an already
    /// raised signal is indistinguishable from raising it once.
    fn raise(&self) -> io::Result<()>;

    /// Consumes one pending raise. Returns false when there was nothing
    /// pending, which is harmless: a raise racing a drain either leaves
    /// the signal raised (the next drain finds nothing queued) or is
    /// re-raised immediately after.
    fn drain(&self) -> io::Result<bool>;

    /// The descriptor a consumer multiplexes in its blocking wait.
    fn wait_fd(&self) -> RawFd;
}

/// Self-pipe wakeup: write a byte to raise, read a byte to drain, wait on
/// the read end. Both ends are nonblocking and close-on-exec; teardown is
/// drop-driven.
pub struct PipeSignal {
    rx: OwnedFd,
    tx: OwnedFd,
}

impl PipeSignal {
    pub fn new() -> io::Result<PipeSignal> {
        let mut fds = [0 as libc::c_int; 2];
        if unsafe { libc::pipe(fds.as_mut_ptr()) } < 0 {
            return Err(io::Error::last_os_error());
        }
        let rx = unsafe { OwnedFd::from_raw_fd(fds[0]) };
        let tx = unsafe { OwnedFd::from_raw_fd(fds[1]) };
        set_nonblocking_cloexec(rx.as_raw_fd())?;
        set_nonblocking_cloexec(tx.as_raw_fd())?;
        Ok(PipeSignal { rx, tx })
    }
}

impl Wakeup for PipeSignal {
    fn raise(&self) -> io::Result<()> {
        loop {
            let n = unsafe { libc::write(self.tx.as_raw_fd(), b"!".as_ptr().cast(), 1) };
            if n == 1 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR) => continue,
                // A token is already pending; raises coalesce.
                Some(libc::EAGAIN) => return Ok(()),
                _ => return Err(err),
            }
        }
    }

    fn drain(&self) -> io::Result<bool> {
        let mut buf = [0u8; 1];
        loop {
            let n = unsafe { libc::read(self.rx.as_raw_fd(), buf.as_mut_ptr().cast(), 1) };
            if n == 1 {
                return Ok(true);
            }
            if n == 0 {
                return Ok(false);
            }
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR) => continue,
                Some(libc::EAGAIN) => return Ok(false),
                _ => return Err(err),
            }
        }
    }

    fn wait_fd(&self) -> RawFd {
        self.rx.as_raw_fd()
    }
}

fn set_nonblocking_cloexec(fd: RawFd) -> io::Result<()> {
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 {
            return Err(io::Error::last_os_error());
        }
        if libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(io::Error::last_os_error());
        }
        let fd_flags = libc::fcntl(fd, libc::F_GETFD);
        if fd_flags < 0 {
            return Err(io::Error::last_os_error());
        }
        if libc::fcntl(fd, libc::F_SETFD, fd_flags | libc::FD_CLOEXEC) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}
