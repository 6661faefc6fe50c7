use std::sync::Arc;

use crate::GateError;

/// The downstream of a [`Gate`][crate::Gate], receiving its single outcome.
///
/// A gate calls its subscriber in exactly one of these sequences:
///
/// * `on_next(value)` then `on_complete()` - push mode.
/// * `on_ready()` then `on_complete()` - fused mode; the value is taken via
///   [`Gate::poll()`][crate::Gate::poll].
/// * `on_complete()` alone - the upstream finished without a value.
/// * `on_error(error)` alone.
/// * Nothing at all - the downstream cancelled.
///
/// `on_complete()` may be skipped after `on_next()`/`on_ready()` if the downstream cancels
/// while the value is being delivered.
///
/// The methods take `&self` because the gate may call them from whichever thread drives the
/// transition that triggers the signal. Implementations that need to mutate state use
/// interior mutability.
pub trait Subscriber {
    /// The type of the value passing through the gate.
    type Item;

    /// The type of the error reported by the upstream.
    type Error;

    /// Receives the value.
    fn on_next(&self, value: Self::Item);

    /// In fused mode, signals that the value can now be taken via `poll()`.
    fn on_ready(&self) {}

    /// Receives the single error.
    fn on_error(&self, error: GateError<Self::Error>);

    /// Signals that no more signals are coming.
    fn on_complete(&self);
}

impl<S> Subscriber for &S
where
    S: Subscriber + ?Sized,
{
    type Item = S::Item;
    type Error = S::Error;

    fn on_next(&self, value: Self::Item) {
        (**self).on_next(value);
    }

    fn on_ready(&self) {
        (**self).on_ready();
    }

    fn on_error(&self, error: GateError<Self::Error>) {
        (**self).on_error(error);
    }

    fn on_complete(&self) {
        (**self).on_complete();
    }
}

impl<S> Subscriber for Arc<S>
where
    S: Subscriber + ?Sized,
{
    type Item = S::Item;
    type Error = S::Error;

    fn on_next(&self, value: Self::Item) {
        (**self).on_next(value);
    }

    fn on_ready(&self) {
        (**self).on_ready();
    }

    fn on_error(&self, error: GateError<Self::Error>) {
        (**self).on_error(error);
    }

    fn on_complete(&self) {
        (**self).on_complete();
    }
}
