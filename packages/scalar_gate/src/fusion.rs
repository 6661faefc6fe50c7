//! Fusion sub-state, negotiated once, letting the downstream pull the value with a
//! non-blocking `poll()` instead of receiving it through `on_next()`.
//!
//! The following states exist:
//!
//! 0 - off - fusion has not been negotiated; the push protocol is in use.
//! 1 - no value - fusion has been negotiated but the upstream has not published a value yet.
//! 2 - has value - the value is in the slot and the next `poll()` will take it.
//! 3 - consumed - the value was taken by `poll()` or dropped by `clear()`. Terminal.
//!
//! Once the upstream publishes the value (1 -> 2), the slot belongs to whichever of `poll()`
//! and `clear()` first moves the sub-state out of 2. Before that, the slot belongs to the
//! upstream, which takes its value back if `clear()` got in first (1 -> 3).

use std::fmt;
use std::ops::BitOr;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::Slot;

const FUSION_OFF: u8 = 0;
const FUSION_NO_VALUE: u8 = 1;
const FUSION_HAS_VALUE: u8 = 2;
const FUSION_CONSUMED: u8 = 3;

/// A set of fusion modes, used to request and to report the outcome of fusion negotiation.
///
/// # Example
///
/// ```rust
/// use scalar_gate::FusionMode;
///
/// let requested = FusionMode::SYNC | FusionMode::ASYNC;
///
/// assert!(requested.contains(FusionMode::ASYNC));
/// assert_eq!(requested, FusionMode::ANY);
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct FusionMode(u8);

impl FusionMode {
    /// No fusion - the push protocol is used.
    pub const NONE: Self = Self(0);

    /// Synchronous pull: the value is available as soon as the downstream asks for it.
    ///
    /// A gate never grants this mode because its value arrives at an unknown later time.
    pub const SYNC: Self = Self(0b01);

    /// Asynchronous pull: the downstream polls after being told a value is ready.
    pub const ASYNC: Self = Self(0b10);

    /// Either pull mode, whichever the upstream supports.
    pub const ANY: Self = Self(0b11);

    /// Whether every mode in `other` is also in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether this is [`FusionMode::NONE`].
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for FusionMode {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

pub(crate) struct Fusion {
    state: AtomicU8,
}

impl Fusion {
    pub(crate) const fn new() -> Self {
        Self {
            state: AtomicU8::new(FUSION_OFF),
        }
    }

    /// Commits to fusion. Returns `false` if fusion was already negotiated.
    pub(crate) fn negotiate(&self) -> bool {
        self.state
            .compare_exchange(
                FUSION_OFF,
                FUSION_NO_VALUE,
                Ordering::Relaxed,
                Ordering::Relaxed,
            )
            .is_ok()
    }

    pub(crate) fn is_negotiated(&self) -> bool {
        // The sub-state never returns to OFF, so any observer that sees fusion negotiated
        // keeps seeing it, whatever the ordering.
        self.state.load(Ordering::Relaxed) != FUSION_OFF
    }

    /// Puts the value in the slot and makes it visible to `poll()`.
    ///
    /// Returns `false` if the downstream already abandoned the poll path via `clear()`,
    /// in which case the value has been dropped.
    ///
    /// # Safety
    ///
    /// The caller must be the upstream of a gate that negotiated fusion and must call this
    /// at most once.
    #[cfg_attr(test, mutants::skip)] // Critical - mutation can cause UB.
    pub(crate) unsafe fn publish<T>(&self, slot: &Slot<T>, value: T) -> bool {
        // SAFETY: Before publishing, only the upstream may touch the slot.
        unsafe {
            slot.put(value);
        }

        // Release because we are handing over the slot to whoever moves us out of HAS_VALUE.
        match self.state.compare_exchange(
            FUSION_NO_VALUE,
            FUSION_HAS_VALUE,
            Ordering::Release,
            Ordering::Relaxed,
        ) {
            Ok(_) => true,
            Err(FUSION_CONSUMED) => {
                // The downstream cleared the poll path before the value arrived.
                // The slot was never handed over, so it is still ours.
                // SAFETY: See above.
                drop(unsafe { slot.take() });
                false
            }
            Err(state) => {
                unreachable!("unreachable fusion state on publish: {state}");
            }
        }
    }

    #[cfg_attr(test, mutants::skip)] // Critical - mutation can cause UB.
    pub(crate) fn poll<T>(&self, slot: &Slot<T>) -> Option<T> {
        // Acquire because on success we take over the slot from the upstream.
        self.state
            .compare_exchange(
                FUSION_HAS_VALUE,
                FUSION_CONSUMED,
                Ordering::Acquire,
                Ordering::Relaxed,
            )
            .ok()?;

        // SAFETY: We moved the sub-state out of HAS_VALUE, so the slot is exclusively ours.
        unsafe { slot.take() }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.state.load(Ordering::Acquire) != FUSION_HAS_VALUE
    }

    #[cfg_attr(test, mutants::skip)] // Critical - mutation can cause UB.
    pub(crate) fn clear<T>(&self, slot: &Slot<T>) {
        if self.state.load(Ordering::Relaxed) == FUSION_OFF {
            // Nothing to clear if we never fused - the slot is governed by the main state.
            return;
        }

        // Acquire because if the value was published, we take over the slot.
        if self.state.swap(FUSION_CONSUMED, Ordering::Acquire) == FUSION_HAS_VALUE {
            // SAFETY: We moved the sub-state out of HAS_VALUE, so the slot is exclusively ours.
            drop(unsafe { slot.take() });
        }
    }

    pub(crate) fn state_name(&self) -> &'static str {
        match self.state.load(Ordering::Relaxed) {
            FUSION_OFF => "off",
            FUSION_NO_VALUE => "no_value",
            FUSION_HAS_VALUE => "has_value",
            FUSION_CONSUMED => "consumed",
            _ => "invalid",
        }
    }
}

impl fmt::Debug for Fusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fusion")
            .field("state", &self.state_name())
            .finish()
    }
}
