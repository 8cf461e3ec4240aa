//! Allocation statistics
//!
//! A [`MemoryStats`] block is shared (through an `Arc`) by every clone of a
//! [`CountingAllocator`](crate::alloc::CountingAllocator). Each allocator call
//! does a couple of atomic adds; reads happen only when somebody asks for a
//! [`MemoryStatsSnapshot`].
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │            MemoryStats (shared)          │
//! ├──────────────────────────────────────────┤
//! │ allocations / frees / reallocations: u64 │
//! │ live_bytes / peak_bytes: u64             │
//! │ failed_requests: u64                     │
//! └──────────────────────────────────────────┘
//! ```

use crate::counter::AtomicCounter;
use serde::Serialize;
use std::fmt;

/// Live counters updated by a counting allocator
#[derive(Debug, Default)]
pub struct MemoryStats {
    allocations: AtomicCounter<u64>,
    frees: AtomicCounter<u64>,
    reallocations: AtomicCounter<u64>,
    live_bytes: AtomicCounter<u64>,
    peak_bytes: AtomicCounter<u64>,
    failed_requests: AtomicCounter<u64>,
}

impl MemoryStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_allocation(&self, bytes: usize) {
        self.allocations.increment();
        self.grow_live(bytes as u64);
    }

    #[inline]
    pub fn record_free(&self, bytes: usize) {
        self.frees.increment();
        self.live_bytes.sub(bytes as u64);
    }

    #[inline]
    pub fn record_reallocation(&self, old_bytes: usize, new_bytes: usize) {
        self.reallocations.increment();
        if new_bytes >= old_bytes {
            self.grow_live((new_bytes - old_bytes) as u64);
        } else {
            self.live_bytes.sub((old_bytes - new_bytes) as u64);
        }
    }

    #[inline]
    pub fn record_failure(&self) {
        self.failed_requests.increment();
    }

    /// Bytes currently handed out and not yet freed
    pub fn live_bytes(&self) -> u64 {
        self.live_bytes.get()
    }

    fn grow_live(&self, bytes: u64) {
        let live = self.live_bytes.add(bytes) + bytes;
        self.peak_bytes.exchange_if_greater(live);
    }

    pub fn snapshot(&self) -> MemoryStatsSnapshot {
        let allocations = self.allocations.get();
        let frees = self.frees.get();
        MemoryStatsSnapshot {
            allocations,
            frees,
            reallocations: self.reallocations.get(),
            live_allocations: allocations.saturating_sub(frees),
            live_bytes: self.live_bytes.get(),
            peak_bytes: self.peak_bytes.get(),
            failed_requests: self.failed_requests.get(),
        }
    }
}

/// Point-in-time copy of [`MemoryStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemoryStatsSnapshot {
    pub allocations: u64,
    pub frees: u64,
    pub reallocations: u64,
    pub live_allocations: u64,
    pub live_bytes: u64,
    pub peak_bytes: u64,
    pub failed_requests: u64,
}

impl MemoryStatsSnapshot {
    /// Render as a single-line JSON object
    #[cfg(feature = "report-json")]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

impl fmt::Display for MemoryStatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Memory ===")?;
        writeln!(
            f,
            "  allocations:     {} ({} live)",
            self.allocations, self.live_allocations
        )?;
        writeln!(f, "  frees:           {}", self.frees)?;
        writeln!(f, "  reallocations:   {}", self.reallocations)?;
        writeln!(f, "  live bytes:      {}", self.live_bytes)?;
        writeln!(f, "  peak bytes:      {}", self.peak_bytes)?;
        write!(f, "  failed requests: {}", self.failed_requests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_and_peak_bytes() {
        let stats = MemoryStats::new();
        stats.record_allocation(64);
        stats.record_allocation(32);
        stats.record_free(64);

        let snap = stats.snapshot();
        assert_eq!(snap.allocations, 2);
        assert_eq!(snap.frees, 1);
        assert_eq!(snap.live_allocations, 1);
        assert_eq!(snap.live_bytes, 32);
        assert_eq!(snap.peak_bytes, 96);
    }

    #[test]
    fn test_reallocation_adjusts_live_bytes() {
        let stats = MemoryStats::new();
        stats.record_allocation(16);
        stats.record_reallocation(16, 48);
        assert_eq!(stats.live_bytes(), 48);
        stats.record_reallocation(48, 8);
        assert_eq!(stats.live_bytes(), 8);

        let snap = stats.snapshot();
        assert_eq!(snap.reallocations, 2);
        assert_eq!(snap.peak_bytes, 48);
    }

    #[test]
    fn test_failures_counted() {
        let stats = MemoryStats::new();
        stats.record_failure();
        stats.record_failure();
        assert_eq!(stats.snapshot().failed_requests, 2);
    }

    #[test]
    fn test_display_report() {
        let stats = MemoryStats::new();
        stats.record_allocation(10);
        let text = stats.snapshot().to_string();
        assert!(text.starts_with("=== Memory ==="));
        assert!(text.contains("live bytes:      10"));
    }

    #[cfg(feature = "report-json")]
    #[test]
    fn test_json_report() {
        let stats = MemoryStats::new();
        stats.record_allocation(10);
        let json = stats.snapshot().to_json();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["allocations"], 1);
        assert_eq!(parsed["live_bytes"], 10);
    }
}
