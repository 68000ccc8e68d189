//! Fixed, packed, binary-stable event records (§3).
//!
//! Both record types are `#[repr(C)]` with explicit padding so that a
//! producer compiled by one toolchain and a consumer attaching to the same
//! shared-memory ring from another process (possibly a different toolchain
//! version) agree on the byte layout. Never add a field without also
//! widening the padding to keep the sizes below fixed.

/// Discriminates what kind of call-graph event a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum EventKind {
    Call = 1,
    Return = 2,
    Exception = 3,
}

impl EventKind {
    #[must_use]
    pub const fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::Call),
            2 => Some(Self::Return),
            3 => Some(Self::Exception),
            _ => None,
        }
    }
}

/// A 32-byte index-lane event.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct IndexEvent {
    pub timestamp_ns: u64,
    /// `(module_id << 32) | symbol_index`.
    pub function_id: u64,
    pub thread_id: u32,
    pub event_kind: u32,
    pub call_depth: u32,
    _padding: u32,
}

const _: () = assert!(std::mem::size_of::<IndexEvent>() == 32);

impl IndexEvent {
    #[must_use]
    pub const fn new(
        timestamp_ns: u64,
        module_id: u32,
        symbol_index: u32,
        kind: EventKind,
        call_depth: u32,
    ) -> Self {
        Self {
            timestamp_ns,
            function_id: ((module_id as u64) << 32) | symbol_index as u64,
            thread_id: 0,
            event_kind: kind as u32,
            call_depth,
            _padding: 0,
        }
    }

    #[must_use]
    pub const fn with_thread(mut self, thread_id: u32) -> Self {
        self.thread_id = thread_id;
        self
    }

    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            timestamp_ns: 0,
            function_id: 0,
            thread_id: 0,
            event_kind: 0,
            call_depth: 0,
            _padding: 0,
        }
    }

    #[must_use]
    pub const fn module_id(&self) -> u32 {
        (self.function_id >> 32) as u32
    }

    #[must_use]
    pub const fn symbol_index(&self) -> u32 {
        self.function_id as u32
    }

    #[must_use]
    pub fn kind(&self) -> Option<EventKind> {
        EventKind::from_u32(self.event_kind)
    }
}

/// Size in bytes of the raw stack snapshot embedded in a [`DetailEvent`].
pub const STACK_SNAPSHOT_BYTES: usize = 128;

const DETAIL_EVENT_SIZE: usize = 512;
const DETAIL_EVENT_FIXED_SIZE: usize =
    32 // IndexEvent
    + 8 * 8 // argument registers
    + 8 * 3 // link/frame/stack pointers
    + STACK_SNAPSHOT_BYTES
    + 4; // stack_snapshot_len
const DETAIL_EVENT_TAIL_PADDING: usize = DETAIL_EVENT_SIZE - DETAIL_EVENT_FIXED_SIZE;

/// A 512-byte detail-lane event: the index fields plus a register/stack
/// snapshot. Cross-architecture register set normalization is explicitly
/// out of scope (spec.md Non-goals) — eight general-purpose argument slots
/// plus link/frame/stack pointers cover the common ABIs this tracer targets.
#[derive(Clone, Copy)]
#[repr(C)]
pub struct DetailEvent {
    pub index: IndexEvent,
    pub arg_registers: [u64; 8],
    pub link_register: u64,
    pub frame_pointer: u64,
    pub stack_pointer: u64,
    pub stack_snapshot: [u8; STACK_SNAPSHOT_BYTES],
    pub stack_snapshot_len: u32,
    _tail_padding: [u8; DETAIL_EVENT_TAIL_PADDING],
}

const _: () = assert!(std::mem::size_of::<DetailEvent>() == DETAIL_EVENT_SIZE);

impl DetailEvent {
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            index: IndexEvent::zeroed(),
            arg_registers: [0; 8],
            link_register: 0,
            frame_pointer: 0,
            stack_pointer: 0,
            stack_snapshot: [0; STACK_SNAPSHOT_BYTES],
            stack_snapshot_len: 0,
            _tail_padding: [0; DETAIL_EVENT_TAIL_PADDING],
        }
    }

    /// Builds a detail event from an index event and a caller-captured
    /// register/stack snapshot. `snapshot` longer than
    /// [`STACK_SNAPSHOT_BYTES`] is truncated; the CLI surface (§6) caps
    /// `--stack-bytes` at 512, but detail events always reserve exactly 128.
    #[must_use]
    pub fn with_snapshot(
        index: IndexEvent,
        arg_registers: [u64; 8],
        link_register: u64,
        frame_pointer: u64,
        stack_pointer: u64,
        snapshot: &[u8],
    ) -> Self {
        let mut stack_snapshot = [0u8; STACK_SNAPSHOT_BYTES];
        let n = snapshot.len().min(STACK_SNAPSHOT_BYTES);
        stack_snapshot[..n].copy_from_slice(&snapshot[..n]);
        Self {
            index,
            arg_registers,
            link_register,
            frame_pointer,
            stack_pointer,
            stack_snapshot,
            stack_snapshot_len: n as u32,
            _tail_padding: [0; DETAIL_EVENT_TAIL_PADDING],
        }
    }
}

impl std::fmt::Debug for DetailEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetailEvent")
            .field("index", &self.index)
            .field("stack_snapshot_len", &self.stack_snapshot_len)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_event_packs_function_id() {
        let ev = IndexEvent::new(42, 7, 99, EventKind::Call, 3).with_thread(1234);
        assert_eq!(ev.module_id(), 7);
        assert_eq!(ev.symbol_index(), 99);
        assert_eq!(ev.kind(), Some(EventKind::Call));
        assert_eq!(ev.thread_id, 1234);
    }

    #[test]
    fn detail_event_truncates_oversized_snapshot() {
        let big = vec![0xAAu8; STACK_SNAPSHOT_BYTES + 64];
        let idx = IndexEvent::new(1, 0, 0, EventKind::Return, 0);
        let detail = DetailEvent::with_snapshot(idx, [0; 8], 0, 0, 0, &big);
        assert_eq!(detail.stack_snapshot_len as usize, STACK_SNAPSHOT_BYTES);
    }

    #[test]
    fn sizes_match_spec() {
        assert_eq!(std::mem::size_of::<IndexEvent>(), 32);
        assert_eq!(std::mem::size_of::<DetailEvent>(), 512);
    }
}
