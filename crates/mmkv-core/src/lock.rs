//! Advisory file locking for multi-process instances.
//!
//! Uses `flock` on Unix. Elsewhere the guard is a no-op and multi-process
//! instances degrade to single-process safety.

use std::fs::File;
use std::io;

#[derive(Debug, Clone, Copy)]
pub(crate) enum LockKind {
    Shared,
    Exclusive,
}

/// Holds an advisory lock on the data file; released on drop.
pub(crate) struct FileLock {
    #[cfg(unix)]
    fd: std::os::unix::io::RawFd,
    locked: bool,
}

impl FileLock {
    #[cfg(unix)]
    pub(crate) fn acquire(file: &File, kind: LockKind) -> io::Result<Self> {
        use std::os::unix::io::AsRawFd;
        let fd = file.as_raw_fd();
        let op = match kind {
            LockKind::Shared => libc::LOCK_SH,
            LockKind::Exclusive => libc::LOCK_EX,
        };
        if unsafe { libc::flock(fd, op) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { fd, locked: true })
    }

    #[cfg(not(unix))]
    pub(crate) fn acquire(_file: &File, _kind: LockKind) -> io::Result<Self> {
        Ok(Self { locked: false })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        if self.locked {
            unsafe { libc::flock(self.fd, libc::LOCK_UN) };
        }
        #[cfg(not(unix))]
        let _ = self.locked;
    }
}
