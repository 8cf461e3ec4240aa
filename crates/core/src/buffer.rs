//! SharedBuffer - copy-on-write growable buffer
//!
//! A `SharedBuffer<T, A>` is a handle to a refcounted storage block holding
//! exactly `len()` elements. Cloning a handle is O(1): both handles alias the
//! same block and its refcount goes up. The first mutation through a handle
//! whose block is aliased duplicates the elements into a private block first
//! (copy-on-write), drops its share of the old one, and continues with a
//! refcount of 1.
//!
//! ## Layout
//!
//! ```text
//! SharedBuffer (handle)          Shared (header, boxed)        storage (allocator)
//! ┌──────────────────┐          ┌──────────────────────┐      ┌────┬────┬────┐
//! │ shared: Option<*>│ ───────▶ │ refc: Refcount        │      │ e0 │ e1 │ e2 │
//! │ alloc: A         │          │ ptr ─────────────────────▶   └────┴────┴────┘
//! └──────────────────┘          │ len, cap              │
//!                               └──────────────────────┘
//! ```
//!
//! - `shared` is `None` iff the buffer holds no elements; no storage exists
//!   for an empty buffer.
//! - After every completed operation `cap == len`, so
//!   `byte_capacity() == len() * size_of::<T>()`. Growth reallocates by
//!   exactly the number of added elements.
//! - Element storage is only ever touched through the five [`Allocator`]
//!   operations. The header itself lives in a `Box`.
//!
//! ## Errors
//!
//! Direct element access out of range (`get`, `Index`, `set`) is fatal.
//! Mutations that can fail (allocation, a bad index to `insert_at`/`remove_at`)
//! report a diagnostic and return `Err(ErrorCode)` with the buffer unchanged.
//!
//! ## Threads
//!
//! The refcount is atomic, so handles to one block may live on different
//! threads. Mutation needs `&mut self`: a handle that observes a refcount of 1
//! is the only one left and nobody can alias it concurrently, so the
//! check-then-mutate step of copy-on-write cannot race.

use crate::alloc::{Allocator, Heap};
use crate::counter::Refcount;
use crate::error::ErrorCode;
use crate::{ensure, ensure_index, fail, fatal, index_or_fatal};
use std::alloc::Layout;
use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::ops::{Index, IndexMut};
use std::ptr::{self, NonNull};

/// Refcounted storage header
struct Shared<T> {
    refc: Refcount,
    ptr: NonNull<T>,
    /// Initialized elements
    len: usize,
    /// Elements the block can hold; equals `len` between operations
    cap: usize,
}

/// Copy-on-write growable buffer. See the [module docs](self).
pub struct SharedBuffer<T, A: Allocator = Heap> {
    shared: Option<NonNull<Shared<T>>>,
    alloc: A,
    _marker: PhantomData<T>,
}

// Safety: the block is only mutated through a handle that holds the single
// reference (`&mut self` + refcount == 1). Shared reads need `T: Sync`; moving
// elements across threads needs `T: Send`.
unsafe impl<T: Send + Sync, A: Allocator + Send> Send for SharedBuffer<T, A> {}
unsafe impl<T: Send + Sync, A: Allocator + Sync> Sync for SharedBuffer<T, A> {}

impl<T> SharedBuffer<T, Heap> {
    pub fn new() -> Self {
        Self::new_in(Heap)
    }

    /// Build a buffer that owns the contents of `vec`, without cloning.
    pub fn from_vec(vec: Vec<T>) -> Self {
        Self::from_vec_in(vec, Heap)
    }
}

impl<T: Clone> SharedBuffer<T, Heap> {
    pub fn from_slice(items: &[T]) -> Self {
        Self::from_slice_in(items, Heap)
    }
}

impl<T, A: Allocator> SharedBuffer<T, A> {
    const ELEM_SIZE: usize = mem::size_of::<T>();

    pub fn new_in(alloc: A) -> Self {
        const {
            assert!(
                mem::size_of::<T>() != 0,
                "SharedBuffer does not support zero-sized element types"
            )
        };
        Self {
            shared: None,
            alloc,
            _marker: PhantomData,
        }
    }

    pub fn from_vec_in(mut vec: Vec<T>, alloc: A) -> Self {
        let mut buffer = Self::new_in(alloc);
        let n = vec.len();
        if n == 0 {
            return buffer;
        }
        let block = match buffer.allocate_block(n) {
            Ok(block) => block,
            Err(_) => fatal!("cannot allocate storage for {} elements", n),
        };
        unsafe {
            buffer.alloc.copy(
                block.cast(),
                NonNull::new_unchecked(vec.as_mut_ptr()).cast(),
                n * Self::ELEM_SIZE,
            );
            // Elements now belong to the block
            vec.set_len(0);
        }
        buffer.shared = Some(Self::new_header(block, n));
        buffer
    }

    /// Number of elements
    #[inline]
    pub fn len(&self) -> usize {
        self.header().map_or(0, |s| s.len)
    }

    /// Same as `len`
    #[inline]
    pub fn size(&self) -> usize {
        self.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.shared.is_none()
    }

    /// Bytes of element storage held, always `len() * size_of::<T>()`
    pub fn byte_capacity(&self) -> usize {
        self.header().map_or(0, |s| s.cap) * Self::ELEM_SIZE
    }

    /// Handles aliasing this buffer's storage (0 when there is no storage)
    pub fn refcount(&self) -> u64 {
        self.header().map_or(0, |s| s.refc.get())
    }

    /// True if another handle aliases the same storage
    pub fn is_shared(&self) -> bool {
        self.refcount() > 1
    }

    /// True if both handles alias the same storage. Two empty buffers do not.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self.shared, other.shared) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    pub fn allocator(&self) -> &A {
        &self.alloc
    }

    pub fn as_slice(&self) -> &[T] {
        match self.header() {
            Some(s) => unsafe { std::slice::from_raw_parts(s.ptr.as_ptr(), s.len) },
            None => &[],
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.as_slice().iter()
    }

    /// Element at `index`. Out of range is fatal.
    pub fn get(&self, index: usize) -> &T {
        let slice = self.as_slice();
        index_or_fatal!(index, slice.len());
        &slice[index]
    }

    pub fn first(&self) -> Option<&T> {
        self.as_slice().first()
    }

    pub fn last(&self) -> Option<&T> {
        self.as_slice().last()
    }

    /// Index of the first element equal to `item`
    pub fn find(&self, item: &T) -> Option<usize>
    where
        T: PartialEq,
    {
        self.as_slice().iter().position(|e| e == item)
    }

    pub fn contains(&self, item: &T) -> bool
    where
        T: PartialEq,
    {
        self.find(item).is_some()
    }

    /// Drop this handle's share of the storage and become empty.
    pub fn clear(&mut self) {
        self.release();
    }

    // -------------------------------------------------------------------------
    // Storage internals
    // -------------------------------------------------------------------------

    #[inline]
    fn header(&self) -> Option<&Shared<T>> {
        // Safety: the header outlives every handle holding a reference to it
        self.shared.map(|p| unsafe { &*p.as_ptr() })
    }

    fn layout_for(n: usize) -> Option<Layout> {
        Layout::array::<T>(n).ok()
    }

    fn new_header(ptr: NonNull<T>, len: usize) -> NonNull<Shared<T>> {
        NonNull::from(Box::leak(Box::new(Shared {
            refc: Refcount::new(1),
            ptr,
            len,
            cap: len,
        })))
    }

    fn allocate_block(&self, n: usize) -> Result<NonNull<T>, ErrorCode> {
        let Some(layout) = Self::layout_for(n) else {
            fail!(ErrorCode::OutOfMemory, "{} elements overflow the address space", n);
        };
        match self.alloc.allocate(layout) {
            Some(block) => Ok(block.cast()),
            None => fail!(
                ErrorCode::OutOfMemory,
                "allocation of {} bytes failed",
                layout.size()
            ),
        }
    }

    /// Safety: `ptr` must be a block of `cap` elements from this allocator
    /// whose elements have been dropped or moved out.
    unsafe fn free_block(&self, ptr: NonNull<T>, cap: usize) {
        if let Some(layout) = Self::layout_for(cap) {
            unsafe { self.alloc.free(ptr.cast(), layout) };
        }
    }

    /// Give up this handle's share; destroy the storage if it was the last.
    fn release(&mut self) {
        let Some(sp) = self.shared.take() else {
            return;
        };
        let last = unsafe { sp.as_ref() }.refc.release();
        if last {
            unsafe {
                let shared = Box::from_raw(sp.as_ptr());
                ptr::drop_in_place(ptr::slice_from_raw_parts_mut(
                    shared.ptr.as_ptr(),
                    shared.len,
                ));
                self.free_block(shared.ptr, shared.cap);
            }
        }
    }

    /// Header of a storage block this handle holds alone.
    ///
    /// Safety: the caller must have made the storage unique first.
    #[inline]
    unsafe fn unique_header(&mut self) -> Option<&mut Shared<T>> {
        self.shared.map(|p| unsafe { &mut *p.as_ptr() })
    }
}

impl<T: Clone, A: Allocator> SharedBuffer<T, A> {
    pub fn from_slice_in(items: &[T], alloc: A) -> Self {
        let mut buffer = Self::new_in(alloc);
        if let Err(code) = buffer.extend_cloned(items) {
            fatal!("cannot build buffer of {} elements: {}", items.len(), code);
        }
        buffer
    }

    /// Duplicate aliased storage so this handle owns its block alone.
    ///
    /// No-op if the storage is already exclusive. On allocation failure the
    /// handle still aliases the old storage.
    pub fn make_unique(&mut self) -> Result<(), ErrorCode> {
        let Some(sp) = self.shared else {
            return Ok(());
        };
        let old = unsafe { sp.as_ref() };
        if old.refc.get() <= 1 {
            return Ok(());
        }

        let len = old.len;
        let block = self.allocate_block(len)?;
        for i in 0..len {
            unsafe {
                block
                    .as_ptr()
                    .add(i)
                    .write((*old.ptr.as_ptr().add(i)).clone());
            }
        }
        let fresh = Self::new_header(block, len);
        self.release();
        self.shared = Some(fresh);
        tracing::trace!(len, "copy-on-write duplicated shared buffer");
        Ok(())
    }

    /// Mutable view of the elements, duplicating aliased storage first.
    pub fn as_mut_slice(&mut self) -> Result<&mut [T], ErrorCode> {
        self.make_unique()?;
        Ok(match unsafe { self.unique_header() } {
            Some(s) => unsafe { std::slice::from_raw_parts_mut(s.ptr.as_ptr(), s.len) },
            None => &mut [],
        })
    }

    /// Mutable element at `index`. Out of range, or failing to duplicate
    /// aliased storage, is fatal.
    pub fn get_mut(&mut self, index: usize) -> &mut T {
        index_or_fatal!(index, self.len());
        match self.as_mut_slice() {
            Ok(slice) => &mut slice[index],
            Err(code) => fatal!("copy-on-write before element access failed: {}", code),
        }
    }

    /// Overwrite the element at `index`. Out of range is fatal.
    pub fn set(&mut self, index: usize, item: T) {
        *self.get_mut(index) = item;
    }

    /// Make room for `additional` uninitialized elements at the end.
    ///
    /// The caller must initialize them and bump `len` before returning.
    fn grow_uninit(&mut self, additional: usize) -> Result<(), ErrorCode> {
        debug_assert!(additional > 0);
        self.make_unique()?;
        let len = self.len();
        let Some(new_cap) = len.checked_add(additional) else {
            fail!(ErrorCode::OutOfMemory, "buffer length overflow");
        };
        let Some(new_layout) = Self::layout_for(new_cap) else {
            fail!(ErrorCode::OutOfMemory, "{} elements overflow the address space", new_cap);
        };

        match self.shared {
            None => {
                let block = self.allocate_block(new_cap)?;
                let header = Self::new_header(block, 0);
                unsafe { (*header.as_ptr()).cap = new_cap };
                self.shared = Some(header);
            }
            Some(sp) => {
                let s = unsafe { &mut *sp.as_ptr() };
                let Some(old_layout) = Self::layout_for(s.cap) else {
                    fatal!("existing block layout is invalid");
                };
                let grown = unsafe {
                    self.alloc
                        .reallocate(s.ptr.cast(), old_layout, new_layout.size())
                };
                match grown {
                    Some(block) => {
                        s.ptr = block.cast();
                        s.cap = new_cap;
                    }
                    None => fail!(
                        ErrorCode::OutOfMemory,
                        "reallocation from {} to {} bytes failed",
                        old_layout.size(),
                        new_layout.size()
                    ),
                }
            }
        }
        Ok(())
    }

    /// Header after a successful `grow_uninit`
    fn grown_header(&mut self) -> &mut Shared<T> {
        match self.shared {
            Some(p) => unsafe { &mut *p.as_ptr() },
            None => fatal!("grown buffer has no storage"),
        }
    }

    /// Remove `start..end`, handing each removed element to `on_removed`
    /// (dropped when `None`).
    ///
    /// The survivors move into a block of the new size, so allocation failure
    /// leaves the buffer untouched.
    fn excise(
        &mut self,
        start: usize,
        end: usize,
        mut on_removed: Option<&mut dyn FnMut(T)>,
    ) -> Result<(), ErrorCode> {
        debug_assert!(start <= end && end <= self.len());
        if start == end {
            return Ok(());
        }
        let Some(sp) = self.shared else {
            return Ok(());
        };
        if unsafe { sp.as_ref() }.refc.get() > 1 {
            return self.excise_shared(sp, start, end, on_removed);
        }
        let len = unsafe { sp.as_ref() }.len;
        let new_len = len - (end - start);

        // Moves or drops the removed range; its slots are dead afterwards
        let mut take_removed = |base: *mut T| unsafe {
            for i in start..end {
                match on_removed.as_deref_mut() {
                    Some(f) => f(ptr::read(base.add(i))),
                    None => ptr::drop_in_place(base.add(i)),
                }
            }
        };

        if new_len == 0 {
            self.shared = None;
            unsafe {
                let shared = Box::from_raw(sp.as_ptr());
                take_removed(shared.ptr.as_ptr());
                self.free_block(shared.ptr, shared.cap);
            }
            return Ok(());
        }

        let block = self.allocate_block(new_len)?;
        let s = unsafe { &mut *sp.as_ptr() };
        let (old_ptr, old_cap) = (s.ptr, s.cap);
        unsafe {
            self.alloc
                .copy(block.cast(), old_ptr.cast(), start * Self::ELEM_SIZE);
            self.alloc.copy(
                NonNull::new_unchecked(block.as_ptr().add(start)).cast(),
                NonNull::new_unchecked(old_ptr.as_ptr().add(end)).cast(),
                (len - end) * Self::ELEM_SIZE,
            );
        }
        s.ptr = block;
        s.len = new_len;
        s.cap = new_len;
        take_removed(old_ptr.as_ptr());
        unsafe { self.free_block(old_ptr, old_cap) };
        Ok(())
    }

    /// Removal from aliased storage: only the survivors are cloned, straight
    /// into a block of the new size. The other handles keep the old block.
    fn excise_shared(
        &mut self,
        sp: NonNull<Shared<T>>,
        start: usize,
        end: usize,
        on_removed: Option<&mut dyn FnMut(T)>,
    ) -> Result<(), ErrorCode> {
        let src = unsafe { sp.as_ref() };
        let len = src.len;
        let new_len = len - (end - start);

        let fresh = if new_len == 0 {
            None
        } else {
            let block = self.allocate_block(new_len)?;
            for (slot, i) in (0..start).chain(end..len).enumerate() {
                unsafe {
                    block
                        .as_ptr()
                        .add(slot)
                        .write((*src.ptr.as_ptr().add(i)).clone());
                }
            }
            Some(Self::new_header(block, new_len))
        };
        if let Some(f) = on_removed {
            for i in start..end {
                f(unsafe { (*src.ptr.as_ptr().add(i)).clone() });
            }
        }
        self.release();
        self.shared = fresh;
        tracing::trace!(len, new_len, "removed from shared buffer without full copy");
        Ok(())
    }

    fn extend_cloned(&mut self, items: &[T]) -> Result<(), ErrorCode> {
        if items.is_empty() {
            return Ok(());
        }
        self.grow_uninit(items.len())?;
        let s = self.grown_header();
        for item in items {
            unsafe { s.ptr.as_ptr().add(s.len).write(item.clone()) };
            s.len += 1;
        }
        Ok(())
    }

    /// Append one element.
    pub fn push_back(&mut self, item: T) -> Result<(), ErrorCode> {
        self.grow_uninit(1)?;
        let s = self.grown_header();
        unsafe { s.ptr.as_ptr().add(s.len).write(item) };
        s.len += 1;
        Ok(())
    }

    /// Same as `push_back`
    pub fn append(&mut self, item: T) -> Result<(), ErrorCode> {
        self.push_back(item)
    }

    pub fn push_front(&mut self, item: T) -> Result<(), ErrorCode> {
        self.insert_at(0, item)
    }

    /// Insert `item` before position `index` (`index == len()` appends).
    ///
    /// An index past the end is reported and the buffer is left unchanged.
    pub fn insert_at(&mut self, index: usize, item: T) -> Result<(), ErrorCode> {
        let len = self.len();
        ensure!(
            index <= len,
            ErrorCode::InvalidParameter,
            "insert index {} past length {}",
            index,
            len
        );
        self.grow_uninit(1)?;
        let s = self.grown_header();
        unsafe {
            let at = s.ptr.as_ptr().add(index);
            ptr::copy(at, at.add(1), s.len - index);
            at.write(item);
        }
        s.len += 1;
        Ok(())
    }

    /// Remove and return the element at `index`.
    ///
    /// An invalid index is reported and the buffer is left unchanged.
    pub fn remove_at(&mut self, index: usize) -> Result<T, ErrorCode> {
        ensure_index!(index, self.len(), ErrorCode::InvalidParameter);
        let mut removed = None;
        self.excise(index, index + 1, Some(&mut |item: T| removed = Some(item)))?;
        match removed {
            Some(item) => Ok(item),
            None => fatal!("removal at {} produced no element", index),
        }
    }

    /// Remove the last element. `None` (reported) if the buffer is empty or
    /// the shrink could not be allocated.
    pub fn pop_back(&mut self) -> Option<T> {
        self.try_pop(true).ok()
    }

    /// Remove the first element. See `pop_back`.
    pub fn pop_front(&mut self) -> Option<T> {
        self.try_pop(false).ok()
    }

    fn try_pop(&mut self, back: bool) -> Result<T, ErrorCode> {
        let len = self.len();
        ensure!(len > 0, ErrorCode::InvalidParameter, "pop from an empty buffer");
        self.remove_at(if back { len - 1 } else { 0 })
    }

    /// Drop elements past `new_len`. No-op if the buffer is not longer.
    pub fn truncate(&mut self, new_len: usize) -> Result<(), ErrorCode> {
        let len = self.len();
        if new_len >= len {
            return Ok(());
        }
        if new_len == 0 {
            self.release();
            return Ok(());
        }
        self.excise(new_len, len, None)
    }

    /// Grow or shrink to `new_len` elements.
    ///
    /// New elements are zero-filled and then set to `T::default()`; shrinking
    /// drops the tail before its storage is given back. On failure the buffer
    /// is unchanged.
    pub fn resize(&mut self, new_len: usize) -> Result<(), ErrorCode>
    where
        T: Default,
    {
        let len = self.len();
        if new_len <= len {
            return self.truncate(new_len);
        }
        self.grow_uninit(new_len - len)?;
        let alloc = self.alloc.clone();
        let s = self.grown_header();
        unsafe {
            alloc.zero(
                NonNull::new_unchecked(s.ptr.as_ptr().add(len)).cast(),
                (new_len - len) * Self::ELEM_SIZE,
            );
        }
        while s.len < new_len {
            unsafe { s.ptr.as_ptr().add(s.len).write(T::default()) };
            s.len += 1;
        }
        Ok(())
    }

    /// Replace every element with a clone of `item`.
    pub fn fill(&mut self, item: T) -> Result<(), ErrorCode> {
        for slot in self.as_mut_slice()? {
            *slot = item.clone();
        }
        Ok(())
    }
}

impl<T: Copy, A: Allocator> SharedBuffer<T, A> {
    /// Append a run of `Copy` elements with one reallocation and a raw copy.
    pub fn extend_from_slice(&mut self, items: &[T]) -> Result<(), ErrorCode> {
        if items.is_empty() {
            return Ok(());
        }
        self.grow_uninit(items.len())?;
        let alloc = self.alloc.clone();
        let s = self.grown_header();
        unsafe {
            alloc.copy(
                NonNull::new_unchecked(s.ptr.as_ptr().add(s.len)).cast(),
                NonNull::from(items).cast(),
                items.len() * Self::ELEM_SIZE,
            );
        }
        s.len += items.len();
        Ok(())
    }
}

impl<T, A: Allocator> Clone for SharedBuffer<T, A> {
    /// Alias the same storage. O(1), no element is copied.
    fn clone(&self) -> Self {
        if let Some(s) = self.header() {
            if !s.refc.acquire() {
                fatal!("aliasing a buffer whose storage was already released");
            }
        }
        Self {
            shared: self.shared,
            alloc: self.alloc.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T, A: Allocator> Drop for SharedBuffer<T, A> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<T> Default for SharedBuffer<T, Heap> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: PartialEq, A: Allocator, B: Allocator> PartialEq<SharedBuffer<T, B>>
    for SharedBuffer<T, A>
{
    /// Content comparison; storage identity does not matter.
    fn eq(&self, other: &SharedBuffer<T, B>) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<T: Eq, A: Allocator> Eq for SharedBuffer<T, A> {}

impl<T: PartialEq, A: Allocator> PartialEq<[T]> for SharedBuffer<T, A> {
    fn eq(&self, other: &[T]) -> bool {
        self.as_slice() == other
    }
}

impl<T: fmt::Debug, A: Allocator> fmt::Debug for SharedBuffer<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

impl<T, A: Allocator> Index<usize> for SharedBuffer<T, A> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        self.get(index)
    }
}

impl<T: Clone, A: Allocator> IndexMut<usize> for SharedBuffer<T, A> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        self.get_mut(index)
    }
}

impl<'a, T, A: Allocator> IntoIterator for &'a SharedBuffer<T, A> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T> FromIterator<T> for SharedBuffer<T, Heap> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().collect())
    }
}

impl<T: Clone, A: Allocator> Extend<T> for SharedBuffer<T, A> {
    /// Failed appends are reported; the remaining items are skipped.
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            if self.push_back(item).is_err() {
                break;
            }
        }
    }
}
