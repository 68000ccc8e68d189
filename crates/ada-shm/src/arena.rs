//! POSIX shared-memory arenas (C1): `shm_open` + `mmap`-backed regions
//! keyed by (role, host-pid, session-id), with a fixed size set at
//! creation (§4.10).

use crate::naming::{arena_name, ArenaRole, SessionId};
use std::ffi::CString;
use std::io;
use std::ptr;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors creating or attaching to an arena.
#[derive(Debug, Error)]
pub enum ArenaError {
    #[error("arena name {0:?} is not representable as a C string")]
    InvalidName(String),
    #[error("failed to {action} shared-memory object {name:?}: {source}")]
    IoFailure {
        action: &'static str,
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("arena {name:?} size mismatch: expected {expected}, found {found}")]
    SizeMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
}

/// A named shared-memory mapping. `create_unique` makes (and sizes) a new
/// one; `open_unique` attaches to an existing one created by another
/// process. Roles, pids, and session ids combine into the canonical name
/// from [`crate::naming::arena_name`].
pub struct Arena {
    name: String,
    ptr: *mut u8,
    len: usize,
    /// Whether this handle created the backing object (and should
    /// `shm_unlink` it on [`Arena::unlink`]).
    owner: bool,
}

unsafe impl Send for Arena {}
unsafe impl Sync for Arena {}

impl Arena {
    /// Creates (or truncates) a shared-memory object named for `(role,
    /// host_pid, session_id)` and sizes it to exactly `size` bytes. The
    /// controller is the only party that should call this.
    ///
    /// # Errors
    /// Returns [`ArenaError`] if the name cannot be represented as a C
    /// string or any of `shm_open`/`ftruncate`/`mmap` fails.
    pub fn create_unique(
        prefix: &str,
        role: ArenaRole,
        host_pid: u32,
        session_id: SessionId,
        size: usize,
    ) -> Result<Self, ArenaError> {
        let name = arena_name(prefix, role, host_pid, session_id);
        let arena = Self::create_named(&name, size)?;
        debug!(arena = %name, size, "created shared-memory arena");
        Ok(arena)
    }

    /// Attaches read-write to an arena previously created by
    /// [`create_unique`](Self::create_unique) with the same name.
    ///
    /// # Errors
    /// Returns [`ArenaError`] if the object does not exist, cannot be
    /// mapped, or its size does not match `expected_size`.
    pub fn open_unique(
        prefix: &str,
        role: ArenaRole,
        host_pid: u32,
        session_id: SessionId,
        expected_size: usize,
    ) -> Result<Self, ArenaError> {
        let name = arena_name(prefix, role, host_pid, session_id);
        let arena = Self::open_named(&name, expected_size)?;
        debug!(arena = %name, size = expected_size, "attached to shared-memory arena");
        Ok(arena)
    }

    fn create_named(name: &str, size: usize) -> Result<Self, ArenaError> {
        let cname = CString::new(name).map_err(|_| ArenaError::InvalidName(name.to_string()))?;
        unsafe {
            let fd = libc::shm_open(
                cname.as_ptr(),
                libc::O_CREAT | libc::O_RDWR,
                0o600,
            );
            if fd < 0 {
                return Err(ArenaError::IoFailure {
                    action: "shm_open",
                    name: name.to_string(),
                    source: io::Error::last_os_error(),
                });
            }
            if libc::ftruncate(fd, size as libc::off_t) != 0 {
                let err = io::Error::last_os_error();
                libc::close(fd);
                return Err(ArenaError::IoFailure {
                    action: "ftruncate",
                    name: name.to_string(),
                    source: err,
                });
            }
            let map = libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            );
            libc::close(fd);
            if map == libc::MAP_FAILED {
                return Err(ArenaError::IoFailure {
                    action: "mmap",
                    name: name.to_string(),
                    source: io::Error::last_os_error(),
                });
            }
            Ok(Self {
                name: name.to_string(),
                ptr: map.cast::<u8>(),
                len: size,
                owner: true,
            })
        }
    }

    fn open_named(name: &str, expected_size: usize) -> Result<Self, ArenaError> {
        let cname = CString::new(name).map_err(|_| ArenaError::InvalidName(name.to_string()))?;
        unsafe {
            let fd = libc::shm_open(cname.as_ptr(), libc::O_RDWR, 0o600);
            if fd < 0 {
                return Err(ArenaError::IoFailure {
                    action: "shm_open",
                    name: name.to_string(),
                    source: io::Error::last_os_error(),
                });
            }
            let mut stat: libc::stat = std::mem::zeroed();
            if libc::fstat(fd, &mut stat) != 0 {
                let err = io::Error::last_os_error();
                libc::close(fd);
                return Err(ArenaError::IoFailure {
                    action: "fstat",
                    name: name.to_string(),
                    source: err,
                });
            }
            let actual = stat.st_size as usize;
            if actual != expected_size {
                libc::close(fd);
                return Err(ArenaError::SizeMismatch {
                    name: name.to_string(),
                    expected: expected_size,
                    found: actual,
                });
            }
            let map = libc::mmap(
                ptr::null_mut(),
                expected_size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            );
            libc::close(fd);
            if map == libc::MAP_FAILED {
                return Err(ArenaError::IoFailure {
                    action: "mmap",
                    name: name.to_string(),
                    source: io::Error::last_os_error(),
                });
            }
            Ok(Self {
                name: name.to_string(),
                ptr: map.cast::<u8>(),
                len: expected_size,
                owner: false,
            })
        }
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    #[must_use]
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr
    }

    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    #[inline]
    #[must_use]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }

    /// Unlinks the backing shared-memory object's name so no further
    /// process can `shm_open` it; existing mappings (including this one)
    /// remain valid until unmapped. Only the creator should call this, and
    /// only during teardown.
    pub fn unlink(&self) {
        if !self.owner {
            warn!(arena = %self.name, "unlink called on a non-owning arena handle");
        }
        let Ok(cname) = CString::new(self.name.as_str()) else {
            return;
        };
        unsafe {
            libc::shm_unlink(cname.as_ptr());
        }
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr.cast::<libc::c_void>(), self.len);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::SessionId;

    #[test]
    fn create_then_open_round_trips_bytes() {
        let pid = std::process::id();
        let session = SessionId(0x1234_5678);
        let size = 4096;

        let mut creator =
            Arena::create_unique("adatest", ArenaRole::Control, pid, session, size).unwrap();
        creator.as_mut_slice()[0] = 0xAB;

        let opener = Arena::open_unique("adatest", ArenaRole::Control, pid, session, size).unwrap();
        assert_eq!(opener.as_slice()[0], 0xAB);

        creator.unlink();
    }

    #[test]
    fn open_rejects_size_mismatch() {
        let pid = std::process::id();
        let session = SessionId(0x1111_2222);
        let creator = Arena::create_unique("adatest", ArenaRole::Index, pid, session, 4096).unwrap();

        let result = Arena::open_unique("adatest", ArenaRole::Index, pid, session, 8192);
        assert!(matches!(result, Err(ArenaError::SizeMismatch { .. })));

        creator.unlink();
    }
}
