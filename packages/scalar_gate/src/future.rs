//! Bridges the push protocol of a gate to `async` code.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::channel::oneshot;
use parking_lot::Mutex;

use crate::{GateError, Subscriber};

/// The single outcome of a gate, as seen by a [`GateFuture`].
///
/// `Ok(None)` means the upstream completed without a value.
pub type GateOutcome<T, E> = Result<Option<T>, GateError<E>>;

/// Creates a [`Subscriber`] whose outcome can be awaited via the returned [`GateFuture`].
///
/// The subscriber works with the push protocol only. Do not negotiate fusion on a gate that
/// delivers to it, as it has no way to poll the value.
///
/// # Example
///
/// ```rust
/// use std::io;
/// use std::sync::Arc;
/// use std::thread;
///
/// use futures::executor::block_on;
/// use scalar_gate::Gate;
///
/// let (subscriber, future) = scalar_gate::channel::<u32, io::Error>();
/// let gate = Arc::new(Gate::new(subscriber));
///
/// thread::spawn({
///     let gate = Arc::clone(&gate);
///     move || gate.supply_value(42)
/// });
///
/// gate.request(1);
///
/// assert_eq!(block_on(future).unwrap(), Some(42));
/// ```
#[must_use]
pub fn channel<T, E>() -> (ChannelSubscriber<T, E>, GateFuture<T, E>) {
    let (sender, receiver) = oneshot::channel();

    (
        ChannelSubscriber {
            sender: Mutex::new(Some(sender)),
        },
        GateFuture { receiver },
    )
}

/// Forwards the outcome of a gate to its paired [`GateFuture`].
///
/// Created by [`channel()`].
pub struct ChannelSubscriber<T, E> {
    // Taken by whichever signal arrives first; later signals are dropped.
    sender: Mutex<Option<oneshot::Sender<GateOutcome<T, E>>>>,
}

impl<T, E> ChannelSubscriber<T, E> {
    fn deliver(&self, outcome: GateOutcome<T, E>) {
        let Some(sender) = self.sender.lock().take() else {
            return;
        };

        // The future may have been dropped already, in which case nobody cares.
        drop(sender.send(outcome));
    }
}

impl<T, E> Subscriber for ChannelSubscriber<T, E> {
    type Item = T;
    type Error = E;

    fn on_next(&self, value: T) {
        // The value is the outcome - the completion that follows has nothing to add.
        self.deliver(Ok(Some(value)));
    }

    fn on_error(&self, error: GateError<E>) {
        self.deliver(Err(error));
    }

    fn on_complete(&self) {
        self.deliver(Ok(None));
    }
}

impl<T, E> fmt::Debug for ChannelSubscriber<T, E> {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelSubscriber")
            .field("delivered", &self.sender.lock().is_none())
            .finish()
    }
}

/// Resolves to the outcome of the gate that delivers to the paired [`ChannelSubscriber`].
///
/// Resolves to [`GateError::Disconnected`] if the subscriber is dropped without ever receiving
/// a signal, e.g. because the downstream cancelled.
///
/// Created by [`channel()`].
#[must_use = "futures do nothing unless awaited"]
pub struct GateFuture<T, E> {
    receiver: oneshot::Receiver<GateOutcome<T, E>>,
}

impl<T, E> Future for GateFuture<T, E> {
    type Output = GateOutcome<T, E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.receiver
            .poll_unpin(cx)
            .map(|result| result.unwrap_or(Err(GateError::Disconnected)))
    }
}

impl<T, E> fmt::Debug for GateFuture<T, E> {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GateFuture").finish_non_exhaustive()
    }
}
