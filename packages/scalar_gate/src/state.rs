//! Gate state machine logic. Everything starts in the `NO_REQUEST_NO_VALUE` state.
//!
//! The following states exist:
//!
//! 0 - no request, no value - initial state; neither endpoint has done anything yet.
//! 1 - no request, has value - the upstream has stored the value but the downstream has not
//!     signaled demand yet. The value sits in the slot until demand arrives.
//! 2 - has request, no value - the downstream has signaled demand and we are waiting for the
//!     upstream to deliver the value.
//! 3 - has request, has value - the value has been handed to the downstream (or the handover
//!     is in progress). Terminal.
//! 4 - cancelled - the downstream cancelled. Terminal. Entered from any state, including 3,
//!     in which case an emission already in progress skips the completion signal.
//! 5 - closed - the upstream failed or completed without a value, or the downstream signaled
//!     an illegal demand. Terminal.
//!
//! States only ever move forward: 0 -> {1, 2} -> 3 -> 4, with 4 and 5 reachable from any
//! non-terminal state. A thread that loses a compare-and-swap re-reads the state and either
//! finds a transition it can still perform or finds a state in which it has nothing to do.
//!
//! The value slot is owned by whoever the state says owns it:
//!
//! * In 0 and 2, the upstream (it is the only one allowed to write the slot).
//! * In 1, nobody - the first thread to move the state out of 1 takes ownership.
//! * In 3, the thread that performed the transition into 3.
//!
//! In fused mode, ownership of the slot is instead governed by the fusion sub-state
//! (see `fusion.rs`) as soon as the upstream publishes the value there.

pub(crate) const NO_REQUEST_NO_VALUE: u8 = 0;
pub(crate) const NO_REQUEST_HAS_VALUE: u8 = 1;
pub(crate) const HAS_REQUEST_NO_VALUE: u8 = 2;
pub(crate) const HAS_REQUEST_HAS_VALUE: u8 = 3;
pub(crate) const CANCELLED: u8 = 4;
pub(crate) const CLOSED: u8 = 5;

/// Whether no further value or demand transition can have any effect in this state.
pub(crate) fn is_terminal(state: u8) -> bool {
    matches!(state, HAS_REQUEST_HAS_VALUE | CANCELLED | CLOSED)
}

/// Human-readable state name for `Debug` output and log fields.
pub(crate) fn name(state: u8) -> &'static str {
    match state {
        NO_REQUEST_NO_VALUE => "no_request_no_value",
        NO_REQUEST_HAS_VALUE => "no_request_has_value",
        HAS_REQUEST_NO_VALUE => "has_request_no_value",
        HAS_REQUEST_HAS_VALUE => "has_request_has_value",
        CANCELLED => "cancelled",
        CLOSED => "closed",
        _ => "invalid",
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!is_terminal(NO_REQUEST_NO_VALUE));
        assert!(!is_terminal(NO_REQUEST_HAS_VALUE));
        assert!(!is_terminal(HAS_REQUEST_NO_VALUE));
        assert!(is_terminal(HAS_REQUEST_HAS_VALUE));
        assert!(is_terminal(CANCELLED));
        assert!(is_terminal(CLOSED));
    }

    #[test]
    fn names_are_distinct() {
        let names = [
            name(NO_REQUEST_NO_VALUE),
            name(NO_REQUEST_HAS_VALUE),
            name(HAS_REQUEST_NO_VALUE),
            name(HAS_REQUEST_HAS_VALUE),
            name(CANCELLED),
            name(CLOSED),
        ];

        for (i, a) in names.iter().enumerate() {
            for b in names.iter().skip(i.wrapping_add(1)) {
                assert_ne!(a, b);
            }
        }

        assert_eq!(name(200), "invalid");
    }
}
