//! The shutdown manager's wakeup fd (§3 control block, §4.9, §9).
//!
//! A signal handler cannot safely touch a channel, a mutex, or the
//! allocator, so the only portable way to wake a sleeping consumer from
//! inside one is the classic self-pipe trick: `write(2)` one byte to a
//! pipe whose read end someone else is blocked on. [`WakeupPipe::notify`]
//! is the only operation this type performs from signal-handler context;
//! everything else (`wait`) runs on an ordinary thread.

use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

/// A non-blocking self-pipe: `write_fd` is written to from anywhere
/// (including a signal handler); `read_fd` is polled by the shutdown
/// loop to wake up promptly instead of waiting out a full tick.
pub struct WakeupPipe {
    read_fd: RawFd,
    write_fd: RawFd,
}

impl WakeupPipe {
    pub fn new() -> io::Result<Self> {
        let mut fds = [0; 2];
        if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
            return Err(io::Error::last_os_error());
        }
        let read_fd = fds[0];
        let write_fd = fds[1];
        for fd in [read_fd, write_fd] {
            let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
            unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
        }
        Ok(Self { read_fd, write_fd })
    }

    #[must_use]
    pub fn read_fd(&self) -> RawFd {
        self.read_fd
    }

    #[must_use]
    pub fn write_fd(&self) -> RawFd {
        self.write_fd
    }

    /// Writes a single wakeup byte. Async-signal-safe: only calls
    /// `write(2)`, ignores the result (a full pipe already means a
    /// wakeup is pending), and never allocates.
    pub fn notify(&self) {
        let byte = 1u8;
        unsafe {
            let _ = libc::write(self.write_fd, std::ptr::addr_of!(byte).cast(), 1);
        }
    }

    /// Blocks up to `timeout` for a wakeup byte, draining any bytes that
    /// arrived. Returns `true` if a wakeup was observed.
    #[must_use]
    pub fn wait(&self, timeout: Duration) -> bool {
        let mut pfd = libc::pollfd {
            fd: self.read_fd,
            events: libc::POLLIN,
            revents: 0,
        };
        let millis = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        let rc = unsafe { libc::poll(std::ptr::addr_of_mut!(pfd), 1, millis) };
        if rc <= 0 {
            return false;
        }
        let mut buf = [0u8; 64];
        loop {
            let n = unsafe { libc::read(self.read_fd, buf.as_mut_ptr().cast(), buf.len()) };
            if n <= 0 {
                break;
            }
        }
        true
    }
}

impl Drop for WakeupPipe {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.read_fd);
            libc::close(self.write_fd);
        }
    }
}

// SAFETY: the two raw fds are only ever used through `read`/`write`/`poll`
// on their own file descriptor numbers; there is no shared mutable state
// beyond what the kernel already serializes for pipe fds.
unsafe impl Send for WakeupPipe {}
unsafe impl Sync for WakeupPipe {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_then_wait_observes_a_wakeup() {
        let pipe = WakeupPipe::new().unwrap();
        assert!(!pipe.wait(Duration::from_millis(5)));
        pipe.notify();
        assert!(pipe.wait(Duration::from_millis(200)));
    }

    #[test]
    fn repeated_notify_before_wait_collapses_to_one_wakeup() {
        let pipe = WakeupPipe::new().unwrap();
        pipe.notify();
        pipe.notify();
        pipe.notify();
        assert!(pipe.wait(Duration::from_millis(200)));
        assert!(!pipe.wait(Duration::from_millis(5)));
    }
}
