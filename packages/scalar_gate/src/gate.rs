use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use tracing::{debug, trace};

use crate::state::{
    self, CANCELLED, CLOSED, HAS_REQUEST_HAS_VALUE, HAS_REQUEST_NO_VALUE, NO_REQUEST_HAS_VALUE,
    NO_REQUEST_NO_VALUE,
};
use crate::{Fusion, FusionMode, GateBuilder, GateError, GateOptions, Slot, Subscriber};

/// Delivers at most one value from an upstream producer to a downstream [`Subscriber`],
/// once the downstream has signaled demand and unless it has cancelled.
///
/// The upstream drives the gate via [`supply_value()`][Self::supply_value],
/// [`on_error()`][Self::on_error] or [`complete_without_value()`][Self::complete_without_value].
/// The downstream drives it via [`request()`][Self::request], [`cancel()`][Self::cancel] and,
/// if it negotiated fusion, [`poll()`][Self::poll]. Both sides may call in from any thread at
/// any time; the gate never blocks and never spawns threads.
///
/// # Example
///
/// ```rust
/// use scalar_gate::{Gate, GateError, Subscriber};
/// use std::sync::Mutex;
///
/// #[derive(Default)]
/// struct Print(Mutex<Vec<String>>);
///
/// impl Subscriber for Print {
///     type Item = u32;
///     type Error = std::io::Error;
///
///     fn on_next(&self, value: u32) {
///         self.0.lock().unwrap().push(format!("next {value}"));
///     }
///
///     fn on_error(&self, error: GateError<std::io::Error>) {
///         self.0.lock().unwrap().push(format!("error {error}"));
///     }
///
///     fn on_complete(&self) {
///         self.0.lock().unwrap().push("complete".to_string());
///     }
/// }
///
/// let print = Print::default();
/// let gate = Gate::new(&print);
///
/// gate.supply_value(7);
/// assert!(print.0.lock().unwrap().is_empty());
///
/// gate.request(1);
/// assert_eq!(*print.0.lock().unwrap(), ["next 7", "complete"]);
/// ```
pub struct Gate<S>
where
    S: Subscriber,
{
    downstream: S,

    /// The logical state of the gate; see constants in `state.rs`.
    state: AtomicU8,

    /// Holds the value between its arrival and its handover. Access is governed by `state`
    /// or, in fused mode, by `fusion`.
    slot: Slot<S::Item>,

    fusion: Fusion,

    // Supplying twice is a contract violation but must not lead to two writers racing
    // on the slot, so the first supply claims this flag.
    value_supplied: AtomicBool,

    attached: AtomicBool,

    options: GateOptions,
}

impl<S> Gate<S>
where
    S: Subscriber,
{
    /// Creates a gate with default options that delivers its outcome to `downstream`.
    ///
    /// Pass `&subscriber` or an `Arc` to keep ownership of the subscriber elsewhere.
    #[must_use]
    pub fn new(downstream: S) -> Self {
        Self::with_options(downstream, GateOptions::default())
    }

    /// Starts building a gate with non-default options.
    pub fn builder() -> GateBuilder<S> {
        GateBuilder::new()
    }

    pub(crate) fn with_options(downstream: S, options: GateOptions) -> Self {
        Self {
            downstream,
            state: AtomicU8::new(NO_REQUEST_NO_VALUE),
            slot: Slot::new(),
            fusion: Fusion::new(),
            value_supplied: AtomicBool::new(false),
            attached: AtomicBool::new(false),
            options,
        }
    }

    /// The name given to the gate via [`GateBuilder::name()`], empty by default.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.options.name
    }

    /// The subscriber that receives the outcome of the gate.
    #[must_use]
    pub fn downstream(&self) -> &S {
        &self.downstream
    }

    /// Marks the upstream as having started producing.
    ///
    /// The gate is a single-value barrier, so no demand is ever propagated upstream.
    pub fn attach(&self) {
        if self.attached.swap(true, Ordering::Relaxed) {
            debug!(gate = %self.options.name, "upstream attached more than once");
        } else {
            trace!(gate = %self.options.name, "upstream attached");
        }
    }

    /// Delivers the single value of the upstream.
    ///
    /// The value is emitted immediately if the downstream has already signaled demand,
    /// otherwise it is stored until demand arrives. Calls after the first, or after the
    /// downstream has cancelled, are silently ignored and drop `value`.
    pub fn supply_value(&self, value: S::Item) {
        if self.value_supplied.swap(true, Ordering::Relaxed) {
            debug!(gate = %self.options.name, "ignoring value supplied more than once");
            return;
        }

        if self.fusion.is_negotiated() {
            self.supply_fused(value);
        } else {
            self.supply_pushed(value);
        }
    }

    #[cfg_attr(test, mutants::skip)] // Critical - mutation can cause UB and hangs.
    fn supply_pushed(&self, mut value: S::Item) {
        loop {
            match self.state.load(Ordering::Acquire) {
                NO_REQUEST_NO_VALUE => {
                    // SAFETY: Until the state leaves NO_REQUEST_NO_VALUE through our own
                    // transition below, only the upstream may touch the slot.
                    unsafe {
                        self.slot.put(value);
                    }

                    // Release on success because we are handing over the slot to whoever
                    // moves the state out of NO_REQUEST_HAS_VALUE.
                    match self.state.compare_exchange(
                        NO_REQUEST_NO_VALUE,
                        NO_REQUEST_HAS_VALUE,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => {
                            trace!(gate = %self.options.name, "value stored, awaiting demand");
                            return;
                        }
                        Err(_) => {
                            // Demand, cancellation or closure got in first. Nobody could have
                            // observed the value, so the slot is still ours.
                            // SAFETY: See above.
                            let Some(stored) = (unsafe { self.slot.take() }) else {
                                unreachable!("slot emptied by someone other than its owner");
                            };

                            value = stored;
                        }
                    }
                }
                HAS_REQUEST_NO_VALUE => {
                    if self
                        .state
                        .compare_exchange(
                            HAS_REQUEST_NO_VALUE,
                            HAS_REQUEST_HAS_VALUE,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                    {
                        trace!(gate = %self.options.name, "demand already present, emitting value");
                        self.emit(value);
                        return;
                    }

                    // Lost to a cancellation or closure; the next iteration finds it.
                }
                current => {
                    trace!(
                        gate = %self.options.name,
                        state = state::name(current),
                        "ignoring value supplied to terminated gate"
                    );
                    return;
                }
            }
        }
    }

    #[cfg_attr(test, mutants::skip)] // Critical - mutation can cause UB and hangs.
    fn supply_fused(&self, value: S::Item) {
        let current = self.state.load(Ordering::Acquire);

        if state::is_terminal(current) {
            trace!(
                gate = %self.options.name,
                state = state::name(current),
                "ignoring value supplied to terminated gate"
            );
            return;
        }

        // The value becomes pollable before any push-side signal so that a poller racing
        // the readiness callback can already see it.
        //
        // SAFETY: We are the upstream and `value_supplied` guarantees we get here only once.
        if !unsafe { self.fusion.publish(&self.slot, value) } {
            trace!(gate = %self.options.name, "downstream cleared poll path, dropping value");
            return;
        }

        loop {
            match self.state.load(Ordering::Acquire) {
                NO_REQUEST_NO_VALUE => {
                    if self
                        .state
                        .compare_exchange(
                            NO_REQUEST_NO_VALUE,
                            NO_REQUEST_HAS_VALUE,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                    {
                        trace!(gate = %self.options.name, "value pollable, awaiting demand");
                        return;
                    }
                }
                HAS_REQUEST_NO_VALUE => {
                    if self
                        .state
                        .compare_exchange(
                            HAS_REQUEST_NO_VALUE,
                            HAS_REQUEST_HAS_VALUE,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                    {
                        self.signal_ready();
                        return;
                    }
                }
                current => {
                    // The value stays pollable; `clear()` or drop releases it.
                    trace!(
                        gate = %self.options.name,
                        state = state::name(current),
                        "gate terminated while publishing value"
                    );
                    return;
                }
            }
        }
    }

    /// Forwards an upstream failure to the downstream.
    ///
    /// The error is delivered immediately and unconditionally. A value that was stored but
    /// not yet emitted is discarded and will never reach the downstream.
    pub fn on_error(&self, error: S::Error) {
        if self.close() {
            trace!(gate = %self.options.name, "upstream failed");
        } else {
            debug!(gate = %self.options.name, "upstream failed after gate terminated");
        }

        self.downstream.on_error(GateError::Upstream(error));
    }

    /// Forwards completion of an upstream that finished without supplying a value.
    pub fn complete_without_value(&self) {
        if self.close() {
            trace!(gate = %self.options.name, "upstream completed without value");
        } else {
            debug!(
                gate = %self.options.name,
                "upstream completed without value after gate terminated"
            );
        }

        self.downstream.on_complete();
    }

    /// Signals that the downstream is ready to receive `n` items.
    ///
    /// Any positive `n` authorizes delivery of the single value and repeated requests have no
    /// further effect. A non-positive `n` is a protocol violation, reported to the downstream
    /// as [`GateError::IllegalDemand`] (unless the gate already terminated).
    #[cfg_attr(test, mutants::skip)] // Critical - mutation can cause UB and hangs.
    pub fn request(&self, n: i64) {
        if n <= 0 {
            self.reject_demand(n);
            return;
        }

        loop {
            match self.state.load(Ordering::Acquire) {
                NO_REQUEST_NO_VALUE => {
                    if self
                        .state
                        .compare_exchange(
                            NO_REQUEST_NO_VALUE,
                            HAS_REQUEST_NO_VALUE,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                    {
                        trace!(gate = %self.options.name, requested = n, "demand stored, awaiting value");
                        return;
                    }

                    // The upstream stored a value, or the gate terminated - look again.
                }
                NO_REQUEST_HAS_VALUE => {
                    // Acquire on success because we are taking over the slot from the upstream.
                    if self
                        .state
                        .compare_exchange(
                            NO_REQUEST_HAS_VALUE,
                            HAS_REQUEST_HAS_VALUE,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                    {
                        trace!(gate = %self.options.name, requested = n, "value present, emitting");
                        self.emit_stored();
                    }

                    // On failure, the only ways out of NO_REQUEST_HAS_VALUE lead to terminal
                    // states, so there is nothing left for us to do.
                    return;
                }
                current => {
                    trace!(
                        gate = %self.options.name,
                        requested = n,
                        state = state::name(current),
                        "ignoring demand"
                    );
                    return;
                }
            }
        }
    }

    fn reject_demand(&self, requested: i64) {
        if self.close() {
            debug!(gate = %self.options.name, requested, "illegal demand");
            self.downstream
                .on_error(GateError::IllegalDemand { requested });
        } else {
            debug!(
                gate = %self.options.name,
                requested,
                "ignoring illegal demand on terminated gate"
            );
        }
    }

    /// Cancels delivery. No signal reaches the downstream after this returns.
    ///
    /// May be called any number of times, from any thread, concurrently with anything.
    /// If the value is being emitted on another thread at this moment, the completion signal
    /// that would have followed it is suppressed.
    pub fn cancel(&self) {
        // Acquire on success because when cancelling a stored value we take over the slot.
        let result = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                match current {
                    CANCELLED | CLOSED => None,
                    _ => Some(CANCELLED),
                }
            });

        match result {
            Ok(previous) => {
                trace!(
                    gate = %self.options.name,
                    previous = state::name(previous),
                    "cancelled"
                );

                self.discard_pushed_value(previous);
            }
            Err(current) => {
                trace!(
                    gate = %self.options.name,
                    state = state::name(current),
                    "ignoring cancel of terminated gate"
                );
            }
        }
    }

    /// Negotiates the pull fast path.
    ///
    /// Only [`FusionMode::ASYNC`] can be granted, and only once, before the value has arrived.
    /// If granted, the downstream receives [`Subscriber::on_ready()`] instead of
    /// [`Subscriber::on_next()`] and takes the value with [`poll()`][Self::poll].
    /// If [`FusionMode::NONE`] is returned, the push protocol stays in effect.
    pub fn negotiate_fusion(&self, requested: FusionMode) -> FusionMode {
        if !self.options.fusion_enabled || !requested.contains(FusionMode::ASYNC) {
            return FusionMode::NONE;
        }

        let current = self.state.load(Ordering::Acquire);

        if self.value_supplied.load(Ordering::Relaxed)
            || !matches!(current, NO_REQUEST_NO_VALUE | HAS_REQUEST_NO_VALUE)
        {
            debug!(
                gate = %self.options.name,
                state = state::name(current),
                "refusing fusion after value arrived"
            );
            return FusionMode::NONE;
        }

        if self.fusion.negotiate() {
            trace!(gate = %self.options.name, "fusion negotiated");
            FusionMode::ASYNC
        } else {
            FusionMode::NONE
        }
    }

    /// Takes the value, if fusion was negotiated and the value has arrived and not yet
    /// been taken. Never blocks.
    #[must_use]
    pub fn poll(&self) -> Option<S::Item> {
        self.fusion.poll(&self.slot)
    }

    /// Whether [`poll()`][Self::poll] would return `None`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fusion.is_empty()
    }

    /// Abandons the poll path, dropping the value if it is waiting to be polled.
    pub fn clear(&self) {
        self.fusion.clear(&self.slot);
    }

    /// The number of values [`poll()`][Self::poll] would return: 0 or 1.
    #[must_use]
    pub fn size(&self) -> usize {
        usize::from(!self.is_empty())
    }

    /// Whether the upstream has called [`attach()`][Self::attach].
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Relaxed)
    }

    /// Whether either side has done anything that moved the gate out of its initial state.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.state.load(Ordering::Relaxed) != NO_REQUEST_NO_VALUE
    }

    /// Whether the gate has emitted its value, been cancelled or been closed.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        state::is_terminal(self.state.load(Ordering::Relaxed))
    }

    /// Whether the downstream has cancelled.
    ///
    /// Unlike [`is_terminated()`][Self::is_terminated], this is `false` after a regular
    /// emission.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Relaxed) == CANCELLED
    }

    /// Whether the gate holds a value that has not been handed to the downstream yet.
    #[must_use]
    pub fn has_value(&self) -> bool {
        if self.fusion.is_negotiated() {
            !self.fusion.is_empty()
        } else {
            self.state.load(Ordering::Relaxed) == NO_REQUEST_HAS_VALUE
        }
    }

    /// Emits the stored value after we moved the state from `NO_REQUEST_HAS_VALUE`
    /// to `HAS_REQUEST_HAS_VALUE`.
    fn emit_stored(&self) {
        if self.fusion.is_negotiated() {
            // The value stays in the slot for `poll()` to take.
            self.signal_ready();
            return;
        }

        // SAFETY: We performed the transition out of NO_REQUEST_HAS_VALUE, which hands the
        // slot to us.
        let Some(value) = (unsafe { self.slot.take() }) else {
            unreachable!("gate in value-present state with empty slot");
        };

        self.emit(value);
    }

    fn emit(&self, value: S::Item) {
        self.downstream.on_next(value);
        self.complete_unless_cancelled();
    }

    fn signal_ready(&self) {
        trace!(gate = %self.options.name, "signaling value ready to poll");
        self.downstream.on_ready();
        self.complete_unless_cancelled();
    }

    fn complete_unless_cancelled(&self) {
        if self.state.load(Ordering::Acquire) == CANCELLED {
            trace!(gate = %self.options.name, "cancelled during emission, skipping completion");
            return;
        }

        self.downstream.on_complete();
    }

    /// Moves a non-terminal gate into the `CLOSED` state, discarding any stored value.
    ///
    /// Returns `false` if the gate had already terminated.
    fn close(&self) -> bool {
        // Acquire on success because when closing over a stored value we take over the slot.
        let result = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (!state::is_terminal(current)).then_some(CLOSED)
            });

        let Ok(previous) = result else {
            return false;
        };

        self.discard_pushed_value(previous);

        // Nobody is going to be told to poll any more.
        self.fusion.clear(&self.slot);

        true
    }

    /// Drops a value that was stored for the push path but never emitted,
    /// after we moved the state out of `previous`.
    fn discard_pushed_value(&self, previous: u8) {
        if previous != NO_REQUEST_HAS_VALUE || self.fusion.is_negotiated() {
            return;
        }

        // SAFETY: We performed the transition out of NO_REQUEST_HAS_VALUE, which hands the
        // slot to us.
        drop(unsafe { self.slot.take() });

        trace!(gate = %self.options.name, "discarded value that was never emitted");
    }
}

impl<S> fmt::Debug for Gate<S>
where
    S: Subscriber,
{
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gate")
            .field("name", &self.options.name)
            .field("state", &state::name(self.state.load(Ordering::Relaxed)))
            .field("fusion", &self.fusion)
            .field("value_supplied", &self.value_supplied)
            .field("attached", &self.attached)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;
    use crate::test_utils::{RecordingSubscriber, Signal};

    assert_impl_all!(Gate<RecordingSubscriber<u32>>: Send, Sync);
    assert_impl_all!(Gate<Arc<RecordingSubscriber<u32>>>: Send, Sync);
    assert_not_impl_any!(Gate<RecordingSubscriber<std::rc::Rc<u32>>>: Sync);

    #[test]
    fn request_then_supply() {
        let downstream = RecordingSubscriber::new();
        let gate = Gate::new(&downstream);

        gate.request(1);
        assert!(downstream.signals().is_empty());

        gate.supply_value(42);
        assert_eq!(downstream.signals(), [Signal::Next(42), Signal::Complete]);
        assert!(gate.is_terminated());
        assert!(!gate.is_cancelled());
    }

    #[test]
    fn supply_then_request() {
        let downstream = RecordingSubscriber::new();
        let gate = Gate::new(&downstream);

        gate.supply_value(7);
        assert!(downstream.signals().is_empty());
        assert!(gate.has_value());

        gate.request(1);
        assert_eq!(downstream.signals(), [Signal::Next(7), Signal::Complete]);
        assert!(!gate.has_value());
    }

    #[test]
    fn cancel_then_supply() {
        let downstream = RecordingSubscriber::new();
        let gate = Gate::new(&downstream);

        gate.cancel();
        gate.supply_value(5);
        gate.request(1);

        assert!(downstream.signals().is_empty());
        assert!(gate.is_cancelled());
    }

    #[test]
    fn request_cancel_supply() {
        let downstream = RecordingSubscriber::new();
        let gate = Gate::new(&downstream);

        gate.request(1);
        gate.cancel();
        gate.supply_value(5);

        assert!(downstream.signals().is_empty());
    }

    #[test]
    fn supply_cancel_request_drops_value() {
        let value = Arc::new(5);
        let downstream = RecordingSubscriber::new();
        let gate = Gate::new(&downstream);

        gate.supply_value(Arc::clone(&value));
        assert_eq!(Arc::strong_count(&value), 2);

        gate.cancel();
        assert_eq!(Arc::strong_count(&value), 1);

        gate.request(1);
        assert!(downstream.signals().is_empty());
    }

    #[test]
    fn double_request_pushes_once() {
        let downstream = RecordingSubscriber::new();
        let gate = Gate::new(&downstream);

        gate.request(1);
        gate.request(5);
        gate.supply_value(3);
        gate.request(1);

        assert_eq!(downstream.signals(), [Signal::Next(3), Signal::Complete]);
    }

    #[test]
    fn double_supply_is_ignored() {
        let downstream = RecordingSubscriber::new();
        let gate = Gate::new(&downstream);

        gate.supply_value(1);
        gate.supply_value(2);
        gate.request(1);
        gate.supply_value(3);

        assert_eq!(downstream.signals(), [Signal::Next(1), Signal::Complete]);
    }

    #[test]
    fn cancel_is_distinct_from_emission() {
        let downstream = RecordingSubscriber::new();
        let gate = Gate::new(&downstream);

        gate.request(1);
        gate.supply_value(1);

        // A completed gate reports terminated but not cancelled.
        assert!(gate.is_terminated());
        assert!(!gate.is_cancelled());

        let other = Gate::new(&downstream);
        other.cancel();

        assert!(other.is_terminated());
        assert!(other.is_cancelled());
    }

    #[test]
    fn cancel_is_idempotent() {
        let downstream = RecordingSubscriber::<u32>::new();
        let gate = Gate::new(&downstream);

        gate.cancel();
        gate.cancel();

        assert!(gate.is_cancelled());
        assert!(downstream.signals().is_empty());
    }

    #[test]
    fn zero_demand_is_error() {
        let downstream = RecordingSubscriber::new();
        let gate = Gate::new(&downstream);

        gate.request(0);
        gate.supply_value(1);
        gate.request(1);

        assert_eq!(
            downstream.signals(),
            [Signal::Error("demand must be positive but 0 was requested".to_string())]
        );
        assert!(gate.is_terminated());
        assert!(!gate.is_cancelled());
    }

    #[test]
    fn negative_demand_after_value_discards_value() {
        let value = Arc::new(1);
        let downstream = RecordingSubscriber::new();
        let gate = Gate::new(&downstream);

        gate.supply_value(Arc::clone(&value));
        gate.request(-1);

        assert_eq!(Arc::strong_count(&value), 1);
        assert_eq!(downstream.signals().len(), 1);
        assert!(matches!(downstream.signals()[0], Signal::Error(_)));
    }

    #[test]
    fn illegal_demand_after_emission_is_ignored() {
        let downstream = RecordingSubscriber::new();
        let gate = Gate::new(&downstream);

        gate.request(1);
        gate.supply_value(1);
        gate.request(0);

        assert_eq!(downstream.signals(), [Signal::Next(1), Signal::Complete]);
    }

    #[test]
    fn error_preempts_stored_value() {
        let downstream = RecordingSubscriber::new();
        let gate = Gate::new(&downstream);

        gate.supply_value(1);
        gate.on_error(std::io::Error::other("boom"));
        gate.request(1);

        assert_eq!(
            downstream.signals(),
            [Signal::Error("upstream: boom".to_string())]
        );
    }

    #[test]
    fn error_is_forwarded_after_cancel() {
        let downstream = RecordingSubscriber::<u32>::new();
        let gate = Gate::new(&downstream);

        gate.cancel();
        gate.on_error(std::io::Error::other("boom"));

        assert_eq!(
            downstream.signals(),
            [Signal::Error("upstream: boom".to_string())]
        );
        assert!(gate.is_cancelled());
    }

    #[test]
    fn complete_without_value() {
        let downstream = RecordingSubscriber::<u32>::new();
        let gate = Gate::new(&downstream);

        gate.request(1);
        gate.complete_without_value();

        assert_eq!(downstream.signals(), [Signal::Complete]);
        assert!(gate.is_terminated());
    }

    #[test]
    fn introspection() {
        let downstream = RecordingSubscriber::<u32>::new();
        let gate = Gate::builder().name("lookup").build(&downstream);

        assert_eq!(gate.name(), "lookup");
        assert!(!gate.is_attached());
        assert!(!gate.is_started());
        assert!(!gate.is_terminated());

        gate.attach();
        assert!(gate.is_attached());
        assert!(!gate.is_started());

        gate.request(1);
        assert!(gate.is_started());
        assert!(!gate.is_terminated());

        let debug_output = format!("{gate:?}");
        assert!(debug_output.contains("lookup"));
        assert!(debug_output.contains("has_request_no_value"));
    }

    #[test]
    fn fused_supply_poll_poll() {
        let downstream = RecordingSubscriber::new();
        let gate = Gate::new(&downstream);

        assert_eq!(gate.negotiate_fusion(FusionMode::ANY), FusionMode::ASYNC);
        assert!(gate.is_empty());
        assert_eq!(gate.size(), 0);

        gate.supply_value(9);

        assert!(!gate.is_empty());
        assert_eq!(gate.size(), 1);
        assert!(gate.has_value());

        assert_eq!(gate.poll(), Some(9));
        assert_eq!(gate.size(), 0);
        assert!(gate.is_empty());
        assert_eq!(gate.poll(), None);

        // The downstream never asked for demand, so it was never signaled.
        assert!(downstream.signals().is_empty());
    }

    #[test]
    fn fused_request_then_supply_signals_ready() {
        let downstream = RecordingSubscriber::new();
        let gate = Gate::new(&downstream);

        gate.negotiate_fusion(FusionMode::ASYNC);
        gate.request(1);
        gate.supply_value(11);

        assert_eq!(downstream.signals(), [Signal::Ready, Signal::Complete]);
        assert_eq!(gate.poll(), Some(11));
        assert_eq!(gate.poll(), None);
    }

    #[test]
    fn fused_supply_then_request_signals_ready() {
        let downstream = RecordingSubscriber::new();
        let gate = Gate::new(&downstream);

        gate.negotiate_fusion(FusionMode::ASYNC);
        gate.supply_value(12);
        gate.request(1);

        assert_eq!(downstream.signals(), [Signal::Ready, Signal::Complete]);
        assert_eq!(gate.poll(), Some(12));
    }

    #[test]
    fn fused_clear_drops_value() {
        let value = Arc::new(1);
        let downstream = RecordingSubscriber::new();
        let gate = Gate::new(&downstream);

        gate.negotiate_fusion(FusionMode::ASYNC);
        gate.supply_value(Arc::clone(&value));
        gate.cancel();
        gate.clear();

        assert_eq!(Arc::strong_count(&value), 1);
        assert!(gate.is_empty());
        assert!(gate.poll().is_none());
    }

    #[test]
    fn fused_error_discards_value() {
        let downstream = RecordingSubscriber::new();
        let gate = Gate::new(&downstream);

        gate.negotiate_fusion(FusionMode::ASYNC);
        gate.supply_value(1);
        gate.on_error(std::io::Error::other("boom"));

        assert!(gate.poll().is_none());
        assert_eq!(
            downstream.signals(),
            [Signal::Error("upstream: boom".to_string())]
        );
    }

    #[test]
    fn fusion_refusals() {
        let downstream = RecordingSubscriber::<u32>::new();

        let gate = Gate::new(&downstream);
        assert_eq!(gate.negotiate_fusion(FusionMode::NONE), FusionMode::NONE);
        assert_eq!(gate.negotiate_fusion(FusionMode::SYNC), FusionMode::NONE);
        assert_eq!(gate.negotiate_fusion(FusionMode::ASYNC), FusionMode::ASYNC);
        assert_eq!(gate.negotiate_fusion(FusionMode::ASYNC), FusionMode::NONE);

        let gate = Gate::builder().fusion(false).build(&downstream);
        assert_eq!(gate.negotiate_fusion(FusionMode::ASYNC), FusionMode::NONE);

        let gate = Gate::new(&downstream);
        gate.supply_value(1);
        assert_eq!(gate.negotiate_fusion(FusionMode::ASYNC), FusionMode::NONE);
        assert!(gate.is_empty());
    }

    #[test]
    fn unfused_poll_is_empty() {
        let downstream = RecordingSubscriber::new();
        let gate = Gate::new(&downstream);

        gate.supply_value(1);

        assert!(gate.is_empty());
        assert_eq!(gate.poll(), None);

        // Clearing the poll path of an unfused gate leaves the push path alone.
        gate.clear();
        gate.request(1);

        assert_eq!(downstream.signals(), [Signal::Next(1), Signal::Complete]);
    }

    #[test]
    fn undelivered_value_dropped_with_gate() {
        let value = Arc::new(1);
        let downstream = RecordingSubscriber::new();

        {
            let gate = Gate::new(&downstream);
            gate.supply_value(Arc::clone(&value));
            assert_eq!(Arc::strong_count(&value), 2);
        }

        assert_eq!(Arc::strong_count(&value), 1);
    }

    #[test]
    fn request_supply_mt() {
        for _ in 0..100 {
            let downstream = Arc::new(RecordingSubscriber::new());
            let gate = Arc::new(Gate::new(Arc::clone(&downstream)));
            let barrier = Arc::new(Barrier::new(2));

            let requester = thread::spawn({
                let gate = Arc::clone(&gate);
                let barrier = Arc::clone(&barrier);
                move || {
                    barrier.wait();
                    gate.request(1);
                }
            });

            let supplier = thread::spawn({
                let gate = Arc::clone(&gate);
                let barrier = Arc::clone(&barrier);
                move || {
                    barrier.wait();
                    gate.supply_value(42);
                }
            });

            requester.join().unwrap();
            supplier.join().unwrap();

            assert_eq!(downstream.signals(), [Signal::Next(42), Signal::Complete]);
        }
    }

    #[test]
    fn cancel_request_supply_mt() {
        for _ in 0..100 {
            let downstream = Arc::new(RecordingSubscriber::new());
            let gate = Arc::new(Gate::new(Arc::clone(&downstream)));
            let barrier = Arc::new(Barrier::new(3));

            let threads = [
                thread::spawn({
                    let gate = Arc::clone(&gate);
                    let barrier = Arc::clone(&barrier);
                    move || {
                        barrier.wait();
                        gate.request(1);
                    }
                }),
                thread::spawn({
                    let gate = Arc::clone(&gate);
                    let barrier = Arc::clone(&barrier);
                    move || {
                        barrier.wait();
                        gate.supply_value(42);
                    }
                }),
                thread::spawn({
                    let gate = Arc::clone(&gate);
                    let barrier = Arc::clone(&barrier);
                    move || {
                        barrier.wait();
                        gate.cancel();
                    }
                }),
            ];

            for thread in threads {
                thread.join().unwrap();
            }

            // Whatever the interleaving, the value is never seen twice and completion
            // never comes without the value.
            let signals = downstream.signals();
            assert!(
                signals.is_empty()
                    || signals == [Signal::Next(42)]
                    || signals == [Signal::Next(42), Signal::Complete],
                "unexpected signals: {signals:?}"
            );
            assert!(gate.is_cancelled());
        }
    }
}
