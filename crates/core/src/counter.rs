//! Lock-free counters
//!
//! `AtomicCounter<T>` is a thin wrapper over one atomic integer with
//! acquire/release ordering on every access. `Refcount` specialises it to
//! `u64` for lifetime bookkeeping: it is the "how many handles alias me"
//! counter of a `SharedBuffer` and the strong count of an `OwnedObject`.
//!
//! The only way to increment a `Refcount` is `conditional_increment`, which
//! refuses to move a counter off zero. Once a count has dropped to zero the
//! resource it guards is being reclaimed, and no late reader may revive it.

use std::sync::atomic::{AtomicI32, AtomicI64, AtomicU32, AtomicU64, AtomicUsize, Ordering};

/// Integer types that have a matching std atomic.
pub trait CounterValue: Copy + Eq + Ord + std::fmt::Debug {
    type Atomic: Send + Sync;

    const ZERO: Self;
    const ONE: Self;

    fn new_atomic(value: Self) -> Self::Atomic;
    fn load(atomic: &Self::Atomic, order: Ordering) -> Self;
    fn store(atomic: &Self::Atomic, value: Self, order: Ordering);
    fn fetch_add(atomic: &Self::Atomic, value: Self, order: Ordering) -> Self;
    fn fetch_sub(atomic: &Self::Atomic, value: Self, order: Ordering) -> Self;
    fn fetch_max(atomic: &Self::Atomic, value: Self, order: Ordering) -> Self;
    fn fetch_min(atomic: &Self::Atomic, value: Self, order: Ordering) -> Self;
    fn compare_exchange_weak(
        atomic: &Self::Atomic,
        current: Self,
        new: Self,
        success: Ordering,
        failure: Ordering,
    ) -> Result<Self, Self>;
    fn wrapping_add(self, rhs: Self) -> Self;
    fn wrapping_sub(self, rhs: Self) -> Self;
}

macro_rules! impl_counter_value {
    ($($int:ty => $atomic:ty),* $(,)?) => {
        $(
            impl CounterValue for $int {
                type Atomic = $atomic;

                const ZERO: Self = 0;
                const ONE: Self = 1;

                #[inline]
                fn new_atomic(value: Self) -> Self::Atomic {
                    <$atomic>::new(value)
                }

                #[inline]
                fn load(atomic: &Self::Atomic, order: Ordering) -> Self {
                    atomic.load(order)
                }

                #[inline]
                fn store(atomic: &Self::Atomic, value: Self, order: Ordering) {
                    atomic.store(value, order)
                }

                #[inline]
                fn fetch_add(atomic: &Self::Atomic, value: Self, order: Ordering) -> Self {
                    atomic.fetch_add(value, order)
                }

                #[inline]
                fn fetch_sub(atomic: &Self::Atomic, value: Self, order: Ordering) -> Self {
                    atomic.fetch_sub(value, order)
                }

                #[inline]
                fn fetch_max(atomic: &Self::Atomic, value: Self, order: Ordering) -> Self {
                    atomic.fetch_max(value, order)
                }

                #[inline]
                fn fetch_min(atomic: &Self::Atomic, value: Self, order: Ordering) -> Self {
                    atomic.fetch_min(value, order)
                }

                #[inline]
                fn compare_exchange_weak(
                    atomic: &Self::Atomic,
                    current: Self,
                    new: Self,
                    success: Ordering,
                    failure: Ordering,
                ) -> Result<Self, Self> {
                    atomic.compare_exchange_weak(current, new, success, failure)
                }

                #[inline]
                fn wrapping_add(self, rhs: Self) -> Self {
                    <$int>::wrapping_add(self, rhs)
                }

                #[inline]
                fn wrapping_sub(self, rhs: Self) -> Self {
                    <$int>::wrapping_sub(self, rhs)
                }
            }
        )*
    };
}

impl_counter_value! {
    u32 => AtomicU32,
    u64 => AtomicU64,
    usize => AtomicUsize,
    i32 => AtomicI32,
    i64 => AtomicI64,
}

// =============================================================================
// AtomicCounter
// =============================================================================

/// A lock-free integer counter.
///
/// `increment`/`decrement` return the value *after* the operation;
/// `add`/`sub` return the value *before* it, like the underlying
/// `fetch_*` primitives.
pub struct AtomicCounter<T: CounterValue> {
    counter: T::Atomic,
}

impl<T: CounterValue> AtomicCounter<T> {
    pub fn new(value: T) -> Self {
        Self {
            counter: T::new_atomic(value),
        }
    }

    #[inline]
    pub fn get(&self) -> T {
        T::load(&self.counter, Ordering::Acquire)
    }

    #[inline]
    pub fn set(&self, value: T) {
        T::store(&self.counter, value, Ordering::Release)
    }

    #[inline]
    pub fn add(&self, value: T) -> T {
        T::fetch_add(&self.counter, value, Ordering::AcqRel)
    }

    #[inline]
    pub fn sub(&self, value: T) -> T {
        T::fetch_sub(&self.counter, value, Ordering::AcqRel)
    }

    #[inline]
    pub fn increment(&self) -> T {
        T::fetch_add(&self.counter, T::ONE, Ordering::AcqRel).wrapping_add(T::ONE)
    }

    #[inline]
    pub fn decrement(&self) -> T {
        T::fetch_sub(&self.counter, T::ONE, Ordering::AcqRel).wrapping_sub(T::ONE)
    }

    /// Increment unless the counter is zero.
    ///
    /// Returns the new value, or zero if the counter was zero and was left
    /// untouched. Retries on contention.
    pub fn conditional_increment(&self) -> T {
        let mut current = self.get();
        loop {
            if current == T::ZERO {
                return T::ZERO;
            }
            let next = current.wrapping_add(T::ONE);
            match T::compare_exchange_weak(
                &self.counter,
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return next,
                Err(observed) => current = observed,
            }
        }
    }

    /// Raise the counter to `value` if it is currently lower.
    pub fn exchange_if_greater(&self, value: T) {
        T::fetch_max(&self.counter, value, Ordering::AcqRel);
    }

    /// Lower the counter to `value` if it is currently higher.
    pub fn exchange_if_lesser(&self, value: T) {
        T::fetch_min(&self.counter, value, Ordering::AcqRel);
    }
}

impl<T: CounterValue> Default for AtomicCounter<T> {
    fn default() -> Self {
        Self::new(T::ZERO)
    }
}

impl<T: CounterValue> std::fmt::Debug for AtomicCounter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AtomicCounter").field(&self.get()).finish()
    }
}

// =============================================================================
// Refcount
// =============================================================================

/// Reference count with no-resurrection semantics.
///
/// A `Refcount` that reached zero through `release` never again succeeds at
/// `acquire`. Releasing more times than acquired is a caller bug; debug builds
/// assert on it.
#[derive(Default)]
pub struct Refcount {
    refc: AtomicCounter<u64>,
}

impl Refcount {
    pub fn new(initial: u64) -> Self {
        Self {
            refc: AtomicCounter::new(initial),
        }
    }

    /// Take one more reference. False if the count already reached zero.
    #[doc(alias = "ref")]
    #[inline]
    pub fn acquire(&self) -> bool {
        self.refc.conditional_increment() != 0
    }

    /// Like `acquire`, but returns the new count (zero on failure).
    #[inline]
    pub fn acquire_value(&self) -> u64 {
        self.refc.conditional_increment()
    }

    /// Drop one reference. True iff this was the last one; the caller must
    /// then reclaim whatever the count guards.
    #[doc(alias = "unref")]
    #[inline]
    pub fn release(&self) -> bool {
        self.release_value() == 0
    }

    /// Like `release`, but returns the remaining count.
    #[inline]
    pub fn release_value(&self) -> u64 {
        let remaining = self.refc.decrement();
        debug_assert!(remaining != u64::MAX, "refcount released below zero");
        remaining
    }

    #[inline]
    pub fn get(&self) -> u64 {
        self.refc.get()
    }

    #[inline]
    pub fn set(&self, value: u64) {
        self.refc.set(value)
    }

    /// Reset the count, usually to 1 for a freshly created owner.
    #[inline]
    pub fn init(&self, value: u64) {
        self.refc.set(value)
    }
}

impl std::fmt::Debug for Refcount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Refcount").field(&self.get()).finish()
    }
}
