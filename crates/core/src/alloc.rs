//! Allocator collaborator
//!
//! Element storage of a [`SharedBuffer`](crate::buffer::SharedBuffer) is
//! obtained exclusively through the five operations of [`Allocator`]. Nothing
//! else from the platform is needed by the container layer.
//!
//! Allocators are passed by value (usually a zero-sized or `Arc`-backed type)
//! instead of being looked up through a global. Clones of one allocator must
//! be interchangeable: memory allocated through one clone may be reallocated
//! or freed through another.
//!
//! - [`Heap`]: the process heap (`std::alloc`)
//! - [`CountingAllocator`]: wraps another allocator and records
//!   [`MemoryStats`]
//! - [`BudgetAllocator`]: refuses requests above a fixed number of live bytes

use crate::counter::AtomicCounter;
use crate::memory_stats::MemoryStats;
use std::alloc::Layout;
use std::ptr::{self, NonNull};
use std::sync::Arc;

/// Raw memory provider.
///
/// Failures are reported as `None`, never by panicking. Zero-sized requests
/// always fail.
pub trait Allocator: Clone {
    /// Allocate a block for `layout`. Contents are uninitialized.
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>>;

    /// Grow or shrink a block to `new_size` bytes, keeping its alignment.
    ///
    /// On failure the old block is untouched and still owned by the caller.
    ///
    /// # Safety
    /// `ptr` must have been allocated by this allocator (or a clone) with
    /// `old_layout`.
    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_size: usize,
    ) -> Option<NonNull<u8>>;

    /// # Safety
    /// `ptr` must have been allocated by this allocator (or a clone) with
    /// `layout`, and must not be used afterwards.
    unsafe fn free(&self, ptr: NonNull<u8>, layout: Layout);

    /// Fill `size` bytes at `ptr` with zero.
    ///
    /// # Safety
    /// `ptr` must be valid for `size` bytes of writes.
    unsafe fn zero(&self, ptr: NonNull<u8>, size: usize) {
        unsafe { ptr::write_bytes(ptr.as_ptr(), 0, size) }
    }

    /// Copy `size` bytes from `src` to `dst`. The ranges must not overlap.
    ///
    /// # Safety
    /// `src` must be valid for reads and `dst` for writes of `size` bytes.
    unsafe fn copy(&self, dst: NonNull<u8>, src: NonNull<u8>, size: usize) {
        unsafe { ptr::copy_nonoverlapping(src.as_ptr(), dst.as_ptr(), size) }
    }
}

// =============================================================================
// Heap
// =============================================================================

/// The global heap
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Heap;

impl Allocator for Heap {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        if layout.size() == 0 {
            return None;
        }
        // Safety: non-zero size checked above
        NonNull::new(unsafe { std::alloc::alloc(layout) })
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_size: usize,
    ) -> Option<NonNull<u8>> {
        if new_size == 0 || Layout::from_size_align(new_size, old_layout.align()).is_err() {
            return None;
        }
        NonNull::new(unsafe { std::alloc::realloc(ptr.as_ptr(), old_layout, new_size) })
    }

    unsafe fn free(&self, ptr: NonNull<u8>, layout: Layout) {
        unsafe { std::alloc::dealloc(ptr.as_ptr(), layout) }
    }
}

// =============================================================================
// CountingAllocator
// =============================================================================

/// Records every request in a shared [`MemoryStats`]
#[derive(Debug, Clone)]
pub struct CountingAllocator<A: Allocator = Heap> {
    inner: A,
    stats: Arc<MemoryStats>,
}

impl CountingAllocator<Heap> {
    pub fn new() -> Self {
        Self::wrap(Heap)
    }
}

impl Default for CountingAllocator<Heap> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Allocator> CountingAllocator<A> {
    pub fn wrap(inner: A) -> Self {
        Self {
            inner,
            stats: Arc::new(MemoryStats::new()),
        }
    }

    pub fn stats(&self) -> &Arc<MemoryStats> {
        &self.stats
    }
}

impl<A: Allocator> Allocator for CountingAllocator<A> {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        let block = self.inner.allocate(layout);
        match block {
            Some(_) => self.stats.record_allocation(layout.size()),
            None => self.stats.record_failure(),
        }
        block
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_size: usize,
    ) -> Option<NonNull<u8>> {
        let block = unsafe { self.inner.reallocate(ptr, old_layout, new_size) };
        match block {
            Some(_) => self
                .stats
                .record_reallocation(old_layout.size(), new_size),
            None => self.stats.record_failure(),
        }
        block
    }

    unsafe fn free(&self, ptr: NonNull<u8>, layout: Layout) {
        unsafe { self.inner.free(ptr, layout) };
        self.stats.record_free(layout.size());
    }
}

// =============================================================================
// BudgetAllocator
// =============================================================================

/// Fails any request that would take live bytes above `budget`
///
/// The budget is shared by all clones.
#[derive(Debug, Clone)]
pub struct BudgetAllocator<A: Allocator = Heap> {
    inner: A,
    budget: usize,
    used: Arc<AtomicCounter<usize>>,
}

impl BudgetAllocator<Heap> {
    pub fn new(budget: usize) -> Self {
        Self::wrap(Heap, budget)
    }
}

impl<A: Allocator> BudgetAllocator<A> {
    pub fn wrap(inner: A, budget: usize) -> Self {
        Self {
            inner,
            budget,
            used: Arc::new(AtomicCounter::new(0)),
        }
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn used(&self) -> usize {
        self.used.get()
    }

    pub fn remaining(&self) -> usize {
        self.budget.saturating_sub(self.used())
    }

    fn reserve(&self, bytes: usize) -> bool {
        let before = self.used.add(bytes);
        if before.saturating_add(bytes) > self.budget {
            self.used.sub(bytes);
            return false;
        }
        true
    }
}

impl<A: Allocator> Allocator for BudgetAllocator<A> {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        if !self.reserve(layout.size()) {
            return None;
        }
        let block = self.inner.allocate(layout);
        if block.is_none() {
            self.used.sub(layout.size());
        }
        block
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_size: usize,
    ) -> Option<NonNull<u8>> {
        let old_size = old_layout.size();
        if new_size > old_size && !self.reserve(new_size - old_size) {
            return None;
        }
        let block = unsafe { self.inner.reallocate(ptr, old_layout, new_size) };
        match block {
            Some(_) if new_size < old_size => {
                self.used.sub(old_size - new_size);
            }
            None if new_size > old_size => {
                self.used.sub(new_size - old_size);
            }
            _ => {}
        }
        block
    }

    unsafe fn free(&self, ptr: NonNull<u8>, layout: Layout) {
        unsafe { self.inner.free(ptr, layout) };
        self.used.sub(layout.size());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(size: usize) -> Layout {
        Layout::from_size_align(size, 8).unwrap()
    }

    #[test]
    fn test_heap_round_trip() {
        let heap = Heap;
        let block = heap.allocate(layout(16)).expect("heap allocation");
        unsafe {
            heap.zero(block, 16);
            assert_eq!(*block.as_ptr().add(15), 0);

            let grown = heap.reallocate(block, layout(16), 64).expect("grow");
            heap.free(grown, layout(64));
        }
    }

    #[test]
    fn test_zero_sized_requests_fail() {
        assert!(Heap.allocate(layout(0)).is_none());
    }

    #[test]
    fn test_copy_moves_bytes() {
        let heap = Heap;
        let a = heap.allocate(layout(4)).unwrap();
        let b = heap.allocate(layout(4)).unwrap();
        unsafe {
            ptr::copy_nonoverlapping([1u8, 2, 3, 4].as_ptr(), a.as_ptr(), 4);
            heap.copy(b, a, 4);
            assert_eq!(std::slice::from_raw_parts(b.as_ptr(), 4), &[1, 2, 3, 4]);
            heap.free(a, layout(4));
            heap.free(b, layout(4));
        }
    }

    #[test]
    fn test_counting_allocator_tracks_requests() {
        let alloc = CountingAllocator::new();
        let clone = alloc.clone();
        let block = alloc.allocate(layout(32)).unwrap();
        unsafe {
            let block = clone.reallocate(block, layout(32), 8).unwrap();
            clone.free(block, layout(8));
        }
        assert!(alloc.allocate(layout(0)).is_none());

        let snap = alloc.stats().snapshot();
        assert_eq!(snap.allocations, 1);
        assert_eq!(snap.reallocations, 1);
        assert_eq!(snap.frees, 1);
        assert_eq!(snap.live_bytes, 0);
        assert_eq!(snap.peak_bytes, 32);
        assert_eq!(snap.failed_requests, 1);
    }

    #[test]
    fn test_budget_allocator_refuses_overdraft() {
        let alloc = BudgetAllocator::new(64);
        let a = alloc.allocate(layout(48)).expect("within budget");
        assert_eq!(alloc.remaining(), 16);
        assert!(alloc.allocate(layout(32)).is_none());
        assert_eq!(alloc.used(), 48);

        unsafe {
            assert!(alloc.reallocate(a, layout(48), 80).is_none());
            assert_eq!(alloc.used(), 48);
            let a = alloc.reallocate(a, layout(48), 16).expect("shrink");
            assert_eq!(alloc.used(), 16);
            alloc.free(a, layout(16));
        }
        assert_eq!(alloc.used(), 0);
    }
}
