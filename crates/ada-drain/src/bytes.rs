//! Reinterprets a batch of binary-stable event records as raw bytes for
//! forwarding to the session writer (§4.7 step 1: "forward bytes to the
//! session writer"). Safe because every event type here is `#[repr(C)]`,
//! `Copy`, and free of padding bytes that matter (they're zeroed at
//! construction).

/// # Safety
/// `T` must be `#[repr(C)]`/plain-old-data with no interior pointers or
/// uninitialized padding that would leak process memory if persisted.
pub(crate) unsafe fn events_as_bytes<T>(events: &[T]) -> &[u8] {
    std::slice::from_raw_parts(events.as_ptr().cast::<u8>(), std::mem::size_of_val(events))
}
