//! ADA Trace - lock-free per-thread ring pipeline
//!
//! This is the data-plane core of a dynamic function-call tracer: a
//! wait-free SPSC ring buffer (and its index-queue sibling), a per-thread
//! ring pool ("lane"), and a fixed-capacity thread registry that a
//! controller process and an injected agent share across two address
//! spaces.
//!
//! This crate owns the parts of the pipeline that are meaningful inside a
//! single process (or inside a caller-provided memory region, which may or
//! may not be shared with another process). Cross-process arena naming and
//! mapping live in `ada-shm`; the control block and agent-mode state
//! machine live in `ada-ipc`; the drain thread and selective persistence
//! live in `ada-drain`/`ada-persist`.
//!
//! # Example
//!
//! ```
//! use ada_trace::{IndexEvent, EventKind, Ring, RingConfig};
//!
//! let ring = Ring::<IndexEvent>::new(RingConfig::new(16));
//! let event = IndexEvent::new(1, 0, 7, EventKind::Call, 0);
//! assert!(ring.write(event));
//!
//! let mut out = IndexEvent::zeroed();
//! assert!(ring.read(&mut out));
//! assert_eq!(out.thread_id, 7);
//! ```

mod backoff;
pub mod config;
mod event;
mod index_queue;
mod invariants;
mod lane;
mod registry;
mod ring;
mod stats;

pub use backoff::Backoff;
pub use config::{RegistryConfig, RingConfig};
pub use event::{DetailEvent, EventKind, IndexEvent, STACK_SNAPSHOT_BYTES};
pub use index_queue::{index_queue_total_size, IndexQueue, IndexQueueError, RawIndexQueue};
pub use lane::{lane_total_size, Lane, LaneError, LaneSet, PoolExhausted};
pub use registry::{
    calculate_memory_size_with_capacity, RegisterError, RegistryError, SlotStatus, ThreadInfo,
    ThreadRegistry,
};
pub use ring::{ring_total_size, RawRing, Ring, RingError, RingHeader, RING_FORMAT_VERSION, RING_MAGIC};
pub use stats::{LaneStats, RingStats};
