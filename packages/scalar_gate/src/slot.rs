use std::cell::UnsafeCell;
use std::fmt;

/// Storage for the single value passing through a gate.
///
/// The slot does no synchronization of its own. Every access must be covered by the gate
/// protocol (see `state.rs` and `fusion.rs`), which guarantees that at any point in time at
/// most one thread is permitted to touch the slot and that the permission is handed over
/// with release/acquire ordering.
pub(crate) struct Slot<T> {
    // We use `UnsafeCell` because we are a synchronization primitive and
    // do our own synchronization of reads/writes.
    value: UnsafeCell<Option<T>>,
}

impl<T> Slot<T> {
    pub(crate) const fn new() -> Self {
        Self {
            value: UnsafeCell::new(None),
        }
    }

    /// Stores a value, dropping any value that was already there.
    ///
    /// # Safety
    ///
    /// The caller must hold exclusive access to the slot according to the gate protocol.
    pub(crate) unsafe fn put(&self, value: T) {
        // SAFETY: Forwarding exclusivity guarantee from the caller.
        let cell = unsafe { &mut *self.value.get() };
        *cell = Some(value);
    }

    /// Removes the value, if any.
    ///
    /// # Safety
    ///
    /// The caller must hold exclusive access to the slot according to the gate protocol.
    pub(crate) unsafe fn take(&self) -> Option<T> {
        // SAFETY: Forwarding exclusivity guarantee from the caller.
        let cell = unsafe { &mut *self.value.get() };
        cell.take()
    }
}

// SAFETY: The slot only moves a `T` between threads (never shares it), with access
// serialized by the gate protocol, so `T: Send` is sufficient.
unsafe impl<T: Send> Sync for Slot<T> {}

impl<T> fmt::Debug for Slot<T> {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // We cannot look inside without holding the protocol-level permission to do so.
        f.debug_struct("Slot").finish_non_exhaustive()
    }
}
