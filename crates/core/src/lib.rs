//! Hearth Core: ownership and container layer of the Hearth engine
//!
//! Everything above this crate (windowing, rendering, resources) stores its
//! data in the types defined here.
//!
//! Key design principles:
//! - Buffers copy on write: cloning a `SharedBuffer` or `Text` is O(1), the
//!   first write through an aliased handle duplicates the storage
//! - Lists alias: every clone of a `SharedList` sees the same elements
//! - Heap objects carry their own strong count (`OwnedObject`), handed off
//!   from a birth reference to the first owning `Handle`
//! - Misuse is either recoverable (`Result<_, ErrorCode>` plus a reported
//!   `Diagnostic`) or fatal (panic or abort), never silent corruption
//!
//! # Modules
//!
//! - `counter`: Atomic counters and `Refcount`
//! - `error`: `ErrorCode` and the condition macros (`ensure!`, `fail!`, `fatal!`)
//! - `diagnostics`: Diagnostic sink, last-diagnostic record, logging setup
//! - `config`: Environment configuration (`HEARTH_FATAL`, `HEARTH_LOG`)
//! - `alloc`: The `Allocator` collaborator and its implementations
//! - `memory_stats`: Allocation statistics for `CountingAllocator`
//! - `buffer`: `SharedBuffer`, the copy-on-write growable buffer
//! - `text`: `Text`, a terminator-padded byte string
//! - `object`: `OwnedObject`, `Unclaimed` and `Handle`
//! - `list`: `SharedList`, the aliased list of tagged values
//! - `value`: `TaggedValue`
//! - `event`: `Event`, an ordered listener list
//! - `resource`: `Resource`, a named owned object

pub mod error;

pub mod alloc;
pub mod buffer;
pub mod config;
pub mod counter;
pub mod diagnostics;
pub mod event;
pub mod list;
pub mod memory_stats;
pub mod object;
pub mod resource;
pub mod text;
pub mod value;

// Re-export key types
pub use crate::alloc::{Allocator, BudgetAllocator, CountingAllocator, Heap};
pub use buffer::SharedBuffer;
pub use counter::{AtomicCounter, CounterValue, Refcount};
pub use error::ErrorCode;
pub use event::{Event, ListenerId};
pub use list::{ListData, MAX_RECURSION_DEPTH, SharedList};
pub use memory_stats::{MemoryStats, MemoryStatsSnapshot};
pub use object::{AsAny, Handle, Lifecycle, ObjectHeader, OwnedObject, Unclaimed};
pub use resource::Resource;
pub use text::Text;
pub use value::{TaggedValue, ValueType};

// Diagnostics and configuration
pub use config::{CoreConfig, FatalAction, core_config};
pub use diagnostics::{
    CollectingSink, Diagnostic, DiagnosticSink, Severity, TracingSink, clear_last_diagnostic,
    has_diagnostic, init_logging, last_diagnostic, take_last_diagnostic, with_sink,
};
