//! `ShmDirectory`: a typed accessor over the control block's
//! `(schema-version, count, entries)` arena directory (SPEC_FULL.md §C.3).
//!
//! Every reader of the control block (the agent, diagnostics tooling)
//! needs the same parsing logic for "which arenas exist and how big are
//! they", so this is modeled as a small fixed-capacity table rather than
//! raw byte offsets the caller has to interpret by hand.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU32, Ordering};
use thiserror::Error;

/// Longest arena name this table can hold, including the role/pid/session
/// suffix (§4.10's canonical names comfortably fit in this).
pub const MAX_ARENA_NAME_LEN: usize = 48;

/// Maximum number of arenas one session's directory can describe: the four
/// named roles, with headroom for future roles.
pub const MAX_ENTRIES: usize = 8;

pub const SHM_DIRECTORY_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ShmDirectoryError {
    #[error("arena name {len} bytes exceeds the {MAX_ARENA_NAME_LEN}-byte limit")]
    NameTooLong { len: usize },
    #[error("shm directory is full (capacity {MAX_ENTRIES})")]
    Full,
}

#[derive(Clone, Copy)]
struct RawEntry {
    name: [u8; MAX_ARENA_NAME_LEN],
    name_len: u8,
    size: u64,
}

impl RawEntry {
    const EMPTY: Self = Self {
        name: [0; MAX_ARENA_NAME_LEN],
        name_len: 0,
        size: 0,
    };
}

/// One arena's entry: its canonical name and byte size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShmDirectoryEntry {
    pub name: String,
    pub size: u64,
}

struct Table {
    entries: [RawEntry; MAX_ENTRIES],
}

/// Fixed-capacity, single-writer-many-reader table of arena
/// `(name, size)` entries. Lives inline in the control block; writes are
/// the controller's responsibility and must happen before
/// `registry_ready` is released (I4) so readers never observe a
/// partially-populated table.
pub struct ShmDirectory {
    schema_version: AtomicU32,
    count: AtomicU32,
    table: UnsafeCell<Table>,
}

unsafe impl Send for ShmDirectory {}
unsafe impl Sync for ShmDirectory {}

impl ShmDirectory {
    pub(crate) fn new() -> Self {
        Self {
            schema_version: AtomicU32::new(SHM_DIRECTORY_SCHEMA_VERSION),
            count: AtomicU32::new(0),
            table: UnsafeCell::new(Table {
                entries: [RawEntry::EMPTY; MAX_ENTRIES],
            }),
        }
    }

    #[must_use]
    pub fn schema_version(&self) -> u32 {
        self.schema_version.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire) as usize
    }

    /// Appends an entry. Controller-only; must not race with any other
    /// `insert` or with a reader observing `registry_ready == 1`.
    ///
    /// # Errors
    /// Returns [`ShmDirectoryError::NameTooLong`] or
    /// [`ShmDirectoryError::Full`].
    pub fn insert(&self, name: &str, size: u64) -> Result<(), ShmDirectoryError> {
        if name.len() > MAX_ARENA_NAME_LEN {
            return Err(ShmDirectoryError::NameTooLong { len: name.len() });
        }
        let count = self.count.load(Ordering::Relaxed) as usize;
        if count >= MAX_ENTRIES {
            return Err(ShmDirectoryError::Full);
        }

        let mut raw = RawEntry::EMPTY;
        raw.name[..name.len()].copy_from_slice(name.as_bytes());
        raw.name_len = name.len() as u8;
        raw.size = size;

        unsafe {
            (*self.table.get()).entries[count] = raw;
        }
        self.count.store((count + 1) as u32, Ordering::Release);
        Ok(())
    }

    /// Looks up an arena by exact name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<u64> {
        let count = self.count();
        let table = unsafe { &(*self.table.get()) };
        for raw in &table.entries[..count] {
            let raw_name = &raw.name[..raw.name_len as usize];
            if raw_name == name.as_bytes() {
                return Some(raw.size);
            }
        }
        None
    }

    /// Returns every entry currently published.
    #[must_use]
    pub fn entries(&self) -> Vec<ShmDirectoryEntry> {
        let count = self.count();
        let table = unsafe { &(*self.table.get()) };
        table.entries[..count]
            .iter()
            .map(|raw| ShmDirectoryEntry {
                name: String::from_utf8_lossy(&raw.name[..raw.name_len as usize]).into_owned(),
                size: raw.size,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_lookup_round_trips() {
        let dir = ShmDirectory::new();
        dir.insert("ada_registry_1_deadbeef", 65536).unwrap();
        dir.insert("ada_control_1_deadbeef", 4096).unwrap();

        assert_eq!(dir.lookup("ada_registry_1_deadbeef"), Some(65536));
        assert_eq!(dir.lookup("ada_control_1_deadbeef"), Some(4096));
        assert_eq!(dir.lookup("missing"), None);
        assert_eq!(dir.count(), 2);
    }

    #[test]
    fn rejects_overlong_names_and_overflow() {
        let dir = ShmDirectory::new();
        let long_name = "x".repeat(MAX_ARENA_NAME_LEN + 1);
        assert_eq!(
            dir.insert(&long_name, 1),
            Err(ShmDirectoryError::NameTooLong { len: long_name.len() })
        );

        for i in 0..MAX_ENTRIES {
            dir.insert(&format!("arena_{i}"), i as u64).unwrap();
        }
        assert_eq!(dir.insert("one_too_many", 0), Err(ShmDirectoryError::Full));
    }
}
