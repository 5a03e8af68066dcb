//! Fixed-capacity object pools and FIFO queues
//!
//! A pool pre-fills a deque with `N` default units and hands them out by
//! value, so a unit is provably in one place at a time and a double release
//! is unrepresentable.
//!
//! Both types guard their container with an `embassy_sync` blocking mutex so
//! that driver interrupt handlers and the bridge loop can touch them
//! concurrently. The critical section covers exactly one deque operation.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::Deque;

/// Free store of `N` reusable units
///
/// Exhaustion is a normal backpressure signal: `acquire` returns `None` and
/// the caller drops its newest unit of work.
pub struct Pool<M: RawMutex, T, const N: usize> {
    free: Mutex<M, RefCell<Deque<T, N>>>,
}

impl<M: RawMutex, T: Default, const N: usize> Pool<M, T, N> {
    pub fn new() -> Self {
        let mut free = Deque::new();
        while free.push_back(T::default()).is_ok() {}
        Self {
            free: Mutex::new(RefCell::new(free)),
        }
    }
}

impl<M: RawMutex, T, const N: usize> Pool<M, T, N> {
    /// O(1). `None` when the pool is exhausted.
    ///
    /// The unit comes back with whatever contents its previous user left;
    /// producers overwrite every field they rely on.
    pub fn acquire(&self) -> Option<T> {
        self.free.lock(|free| free.borrow_mut().pop_front())
    }

    /// O(1). Returns a unit to the free store.
    pub fn release(&self, unit: T) {
        self.free.lock(|free| {
            let overflow = free.borrow_mut().push_back(unit).is_err();
            // Only reachable by feeding foreign units into the pool.
            debug_assert!(!overflow, "pool over-release");
        });
    }

    pub fn free_count(&self) -> usize {
        self.free.lock(|free| free.borrow().len())
    }
}

impl<M: RawMutex, T: Default, const N: usize> Default for Pool<M, T, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Bounded FIFO queue shared between loop and interrupt context
pub struct Queue<M: RawMutex, T, const N: usize> {
    items: Mutex<M, RefCell<Deque<T, N>>>,
}

impl<M: RawMutex, T, const N: usize> Queue<M, T, N> {
    pub const fn new() -> Self {
        Self {
            items: Mutex::new(RefCell::new(Deque::new())),
        }
    }

    /// Appends a unit; returns it when the queue is full.
    pub fn push_back(&self, unit: T) -> Result<(), T> {
        self.items.lock(|items| items.borrow_mut().push_back(unit))
    }

    /// Returns a unit to the head of the queue (deferral without reordering).
    pub fn push_front(&self, unit: T) -> Result<(), T> {
        self.items.lock(|items| items.borrow_mut().push_front(unit))
    }

    pub fn pop_front(&self) -> Option<T> {
        self.items.lock(|items| items.borrow_mut().pop_front())
    }

    pub fn len(&self) -> usize {
        self.items.lock(|items| items.borrow().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<M: RawMutex, T, const N: usize> Default for Queue<M, T, N> {
    fn default() -> Self {
        Self::new()
    }
}
