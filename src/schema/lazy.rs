//! Resettable compute-once slots for derived schema data.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::types::Result;

/// Observable state of a [`ResettableLazy`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LazyState {
    Uninitialized,
    Computing,
    Ready,
}

enum Slot<T> {
    Uninitialized,
    Computing,
    Ready(Arc<T>),
}

struct Inner<T> {
    slot: Slot<T>,
    generation: u64,
}

/// A value derived on first access and dropped again by [`reset`](Self::reset).
///
/// The initializer runs outside the lock. Concurrent first accesses may both
/// compute; the first finished value is kept and returned to both. A value
/// computed across a `reset` is returned to its caller but never stored.
pub struct ResettableLazy<T> {
    inner: Mutex<Inner<T>>,
}

impl<T> ResettableLazy<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                slot: Slot::Uninitialized,
                generation: 0,
            }),
        }
    }

    pub fn state(&self) -> LazyState {
        match self.inner.lock().slot {
            Slot::Uninitialized => LazyState::Uninitialized,
            Slot::Computing => LazyState::Computing,
            Slot::Ready(_) => LazyState::Ready,
        }
    }

    pub fn get(&self) -> Option<Arc<T>> {
        match &self.inner.lock().slot {
            Slot::Ready(value) => Some(Arc::clone(value)),
            _ => None,
        }
    }

    /// Returns the stored value, computing it with `init` when absent.
    /// A failed `init` leaves the slot uninitialized.
    pub fn get_or_try_init<F>(&self, init: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Result<T>,
    {
        let generation = {
            let mut inner = self.inner.lock();
            if let Slot::Ready(value) = &inner.slot {
                return Ok(Arc::clone(value));
            }
            inner.slot = Slot::Computing;
            inner.generation
        };
        let computed = init();
        let mut inner = self.inner.lock();
        let current = inner.generation == generation;
        match computed {
            Ok(value) => {
                let value = Arc::new(value);
                if current {
                    match &inner.slot {
                        Slot::Ready(existing) => return Ok(Arc::clone(existing)),
                        _ => inner.slot = Slot::Ready(Arc::clone(&value)),
                    }
                }
                Ok(value)
            }
            Err(err) => {
                if current && matches!(inner.slot, Slot::Computing) {
                    inner.slot = Slot::Uninitialized;
                }
                Err(err)
            }
        }
    }

    /// Drops the stored value. A no-op on an uninitialized slot.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        if matches!(inner.slot, Slot::Uninitialized) {
            return;
        }
        inner.generation += 1;
        inner.slot = Slot::Uninitialized;
    }
}

impl<T> Default for ResettableLazy<T> {
    fn default() -> Self {
        Self::new()
    }
}
