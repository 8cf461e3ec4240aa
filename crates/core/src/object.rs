//! Owned objects and handles
//!
//! Heap objects that implement [`OwnedObject`] carry their own strong count
//! in an [`ObjectHeader`] (intrusive refcounting). [`Handle<T>`] is the
//! shared-ownership pointer to such an object; it may point at a trait object
//! (`Handle<dyn OwnedObject>`) and be cast back to the concrete type.
//!
//! ## Lifecycle
//!
//! ```text
//!                 absorb_birth_reference()
//!  Constructing ─────────────────────────▶ Claimed ──(strong == 0)──▶ Destroyed
//!  strong = 1 (birth reference)            strong >= 1
//! ```
//!
//! A new object starts with one implicit "birth" reference held by the
//! [`Unclaimed`] that wraps it. The first handle that claims the object
//! (`Unclaimed::claim`, `Handle::from_raw`) takes a reference of its own and
//! absorbs the birth reference, so afterwards the count is exactly the number
//! of live handles. If the `Unclaimed` is dropped instead, it absorbs (releases)
//! the birth reference itself, and the object is destroyed as soon as the last
//! transient handle made by `Unclaimed::share` goes away. Either way the
//! object is dropped exactly once.
//!
//! `Destroyed` is stored right before the object's `Drop` runs.

use crate::counter::Refcount;
use crate::fatal;
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::ops::Deref;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU8, Ordering};

/// Where an object is in its life.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Only the birth reference (and transient shares) keep it alive
    Constructing = 0,
    /// The birth reference has been handed off
    Claimed = 1,
    /// The strong count reached zero; the object is being dropped
    Destroyed = 2,
}

impl Lifecycle {
    fn from_u8(raw: u8) -> Lifecycle {
        match raw {
            0 => Lifecycle::Constructing,
            1 => Lifecycle::Claimed,
            _ => Lifecycle::Destroyed,
        }
    }
}

/// Strong count and lifecycle state embedded in every owned object.
#[derive(Debug)]
pub struct ObjectHeader {
    strong: Refcount,
    phase: AtomicU8,
}

impl Default for ObjectHeader {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectHeader {
    /// A header holding the birth reference
    pub fn new() -> Self {
        Self {
            strong: Refcount::new(1),
            phase: AtomicU8::new(Lifecycle::Constructing as u8),
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        Lifecycle::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// True once the birth reference has been handed off
    pub fn is_referenced(&self) -> bool {
        self.lifecycle() != Lifecycle::Constructing
    }

    pub fn refcount(&self) -> u64 {
        self.strong.get()
    }

    /// Take one more strong reference. False if the count already hit zero.
    pub fn reference(&self) -> bool {
        self.strong.acquire()
    }

    /// Drop one strong reference. True if that was the last one and the
    /// caller must destroy the object.
    pub fn unreference(&self) -> bool {
        self.strong.release()
    }

    /// The `Constructing -> Claimed` transition.
    ///
    /// If the object is still `Constructing`, mark it `Claimed` and release
    /// the birth reference. Only the first caller does anything. Returns true
    /// if releasing the birth reference dropped the count to zero, in which
    /// case the caller must destroy the object.
    pub fn absorb_birth_reference(&self) -> bool {
        let claimed = self
            .phase
            .compare_exchange(
                Lifecycle::Constructing as u8,
                Lifecycle::Claimed as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        claimed && self.strong.release()
    }

    /// Reference taken by a handle adopting an object from a raw pointer.
    ///
    /// Takes a strong reference and then absorbs the birth reference, so a
    /// freshly constructed object ends up with a count of exactly 1. False
    /// if the object is already dead.
    pub fn ref_init(&self) -> bool {
        if !self.reference() {
            return false;
        }
        let emptied = self.absorb_birth_reference();
        debug_assert!(!emptied, "birth reference was the only reference");
        true
    }

    fn mark_destroyed(&self) {
        self.phase.store(Lifecycle::Destroyed as u8, Ordering::Release);
    }
}

// =============================================================================
// Object trait
// =============================================================================

/// Upcast helper for downcasting trait objects.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A heap object managed by an intrusive strong count.
///
/// ```ignore
/// struct Sprite { header: ObjectHeader, frame: u32 }
///
/// impl OwnedObject for Sprite {
///     fn header(&self) -> &ObjectHeader { &self.header }
///     fn class_name(&self) -> &'static str { "Sprite" }
/// }
/// ```
pub trait OwnedObject: AsAny {
    fn header(&self) -> &ObjectHeader;

    fn class_name(&self) -> &'static str;

    fn parent_class_name(&self) -> &'static str {
        "OwnedObject"
    }

    /// True if this object is a `name` or directly derives from one
    fn is_class(&self, name: &str) -> bool {
        self.class_name() == name || self.parent_class_name() == name
    }
}

/// Drop the object. The caller must hold the reference that just reached zero.
unsafe fn destroy<T: ?Sized + OwnedObject>(ptr: NonNull<T>) {
    let obj = unsafe { ptr.as_ref() };
    obj.header().mark_destroyed();
    tracing::debug!(class = obj.class_name(), "destroying owned object");
    drop(unsafe { Box::from_raw(ptr.as_ptr()) });
}

// =============================================================================
// Unclaimed
// =============================================================================

/// A freshly constructed object that still holds its birth reference.
pub struct Unclaimed<T: ?Sized + OwnedObject> {
    ptr: NonNull<T>,
    _marker: PhantomData<T>,
}

impl<T: OwnedObject> Unclaimed<T> {
    pub fn new(value: T) -> Self {
        Self::from_box(Box::new(value))
    }
}

impl<T: ?Sized + OwnedObject> Unclaimed<T> {
    pub fn from_box(object: Box<T>) -> Self {
        Self {
            ptr: NonNull::from(Box::leak(object)),
            _marker: PhantomData,
        }
    }

    /// Hand the object to its first owner.
    pub fn claim(self) -> Handle<T> {
        let ptr = self.into_raw();
        // Safety: the pointer carries the birth reference, so the object is alive
        unsafe { Handle::from_raw(ptr.as_ptr()) }
    }

    /// A transient handle that does not claim the object.
    ///
    /// If this `Unclaimed` is dropped later, the object lives exactly as long
    /// as the handles made here.
    pub fn share(&self) -> Handle<T> {
        if !self.header().reference() {
            fatal!("unclaimed object lost its birth reference");
        }
        Handle::with_ptr(self.ptr)
    }

    /// Give up the wrapper and keep the birth reference in the pointer.
    ///
    /// Pass the pointer to [`Handle::from_raw`] to claim it.
    pub fn into_raw(self) -> NonNull<T> {
        let ptr = self.ptr;
        mem::forget(self);
        ptr
    }
}

impl<T: ?Sized + OwnedObject> Deref for Unclaimed<T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { self.ptr.as_ref() }
    }
}

impl<T: ?Sized + OwnedObject> Drop for Unclaimed<T> {
    fn drop(&mut self) {
        if self.header().absorb_birth_reference() {
            unsafe { destroy(self.ptr) };
        }
    }
}

// =============================================================================
// Handle
// =============================================================================

/// Shared-ownership pointer to an [`OwnedObject`]. May be null.
pub struct Handle<T: ?Sized + OwnedObject> {
    ptr: Option<NonNull<T>>,
    _marker: PhantomData<T>,
}

// Safety: same reasoning as Arc; the strong count is atomic
unsafe impl<T: ?Sized + OwnedObject + Send + Sync> Send for Handle<T> {}
unsafe impl<T: ?Sized + OwnedObject + Send + Sync> Sync for Handle<T> {}

impl<T: OwnedObject> Handle<T> {
    /// Construct and claim a new object.
    pub fn new(value: T) -> Self {
        Unclaimed::new(value).claim()
    }

    /// Upcast to a trait-object handle, keeping the reference.
    pub fn into_dyn(self) -> Handle<dyn OwnedObject> {
        match self.into_raw() {
            Some(ptr) => {
                let ptr: NonNull<dyn OwnedObject> = ptr;
                unsafe { Handle::adopt_raw(ptr) }
            }
            None => Handle::null(),
        }
    }
}

impl<T: ?Sized + OwnedObject> Handle<T> {
    pub fn null() -> Self {
        Self {
            ptr: None,
            _marker: PhantomData,
        }
    }

    fn with_ptr(ptr: NonNull<T>) -> Self {
        Self {
            ptr: Some(ptr),
            _marker: PhantomData,
        }
    }

    pub fn from_box(object: Box<T>) -> Self {
        Unclaimed::from_box(object).claim()
    }

    /// Adopt an object through a raw pointer, taking a new reference.
    ///
    /// The first adoption of an unclaimed object absorbs its birth reference.
    /// A null pointer, or an object whose count already reached zero, gives a
    /// null handle.
    ///
    /// # Safety
    /// A non-null `ptr` must point at a live object allocated as a `Box`,
    /// e.g. from [`Unclaimed::into_raw`] or [`Handle::as_ptr`] of a live handle.
    pub unsafe fn from_raw(ptr: *mut T) -> Self {
        let Some(ptr) = NonNull::new(ptr) else {
            return Self::null();
        };
        if unsafe { ptr.as_ref() }.header().ref_init() {
            Self::with_ptr(ptr)
        } else {
            Self::null()
        }
    }

    /// Take over a reference previously released with [`Handle::into_raw`].
    ///
    /// # Safety
    /// `ptr` must come from `into_raw` and be adopted at most once.
    pub unsafe fn adopt_raw(ptr: NonNull<T>) -> Self {
        Self::with_ptr(ptr)
    }

    /// Give up the handle without dropping its reference.
    pub fn into_raw(self) -> Option<NonNull<T>> {
        let ptr = self.ptr;
        mem::forget(self);
        ptr
    }

    pub fn as_ptr(&self) -> Option<NonNull<T>> {
        self.ptr
    }

    pub fn get(&self) -> Option<&T> {
        // Safety: this handle holds a strong reference
        self.ptr.map(|p| unsafe { &*p.as_ptr() })
    }

    pub fn is_null(&self) -> bool {
        self.ptr.is_none()
    }

    pub fn is_valid(&self) -> bool {
        self.ptr.is_some()
    }

    /// Strong count of the target (0 for a null handle)
    pub fn refcount(&self) -> u64 {
        self.get().map_or(0, |obj| obj.header().refcount())
    }

    /// True if both handles point at the same object. Null handles are equal.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self.ptr, other.ptr) {
            (Some(a), Some(b)) => std::ptr::addr_eq(a.as_ptr(), b.as_ptr()),
            (None, None) => true,
            _ => false,
        }
    }

    /// Copy-assignment: point at `other`'s target, dropping the old one.
    pub fn assign(&mut self, other: &Self) {
        if self.ptr_eq(other) {
            return;
        }
        *self = other.clone();
    }

    /// Move-assignment: take the target out and leave this handle null.
    pub fn take(&mut self) -> Self {
        mem::replace(self, Self::null())
    }

    /// Drop the target and become null.
    pub fn reset(&mut self) {
        *self = Self::null();
    }
}

impl Handle<dyn OwnedObject> {
    /// Borrow the target as `U` if that is its concrete type.
    pub fn cast_to<U: OwnedObject>(&self) -> Option<&U> {
        let obj: &dyn OwnedObject = self.get()?;
        AsAny::as_any(obj).downcast_ref::<U>()
    }

    /// A new handle to the target typed as `U`, if that is its concrete type.
    pub fn downcast<U: OwnedObject>(&self) -> Option<Handle<U>> {
        self.cast_to::<U>()?;
        let ptr = self.clone().into_raw()?;
        Some(unsafe { Handle::adopt_raw(ptr.cast::<U>()) })
    }
}

impl<T: ?Sized + OwnedObject> Clone for Handle<T> {
    /// Take another reference. A target that is already dead gives a null
    /// handle.
    fn clone(&self) -> Self {
        match self.ptr {
            Some(ptr) if unsafe { ptr.as_ref() }.header().reference() => Self::with_ptr(ptr),
            _ => Self::null(),
        }
    }
}

impl<T: ?Sized + OwnedObject> Drop for Handle<T> {
    fn drop(&mut self) {
        if let Some(ptr) = self.ptr.take() {
            if unsafe { ptr.as_ref() }.header().unreference() {
                unsafe { destroy(ptr) };
            }
        }
    }
}

impl<T: ?Sized + OwnedObject> Deref for Handle<T> {
    type Target = T;

    /// Dereferencing a null handle is fatal.
    fn deref(&self) -> &T {
        match self.get() {
            Some(obj) => obj,
            None => fatal!("dereferenced a null Handle<{}>", std::any::type_name::<T>()),
        }
    }
}

impl<T: ?Sized + OwnedObject> Default for Handle<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: ?Sized + OwnedObject> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<T: ?Sized + OwnedObject> Eq for Handle<T> {}

impl<T: ?Sized + OwnedObject> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ptr {
            Some(ptr) => write!(
                f,
                "Handle({} @ {:p}, refs = {})",
                unsafe { ptr.as_ref() }.class_name(),
                ptr.as_ptr() as *const u8,
                self.refcount()
            ),
            None => f.write_str("Handle(null)"),
        }
    }
}
