//! Testing utilities shared by the unit tests of this crate.

use std::io;

use parking_lot::Mutex;

use crate::{GateError, Subscriber};

/// A signal observed by a [`RecordingSubscriber`].
#[derive(Debug, Eq, PartialEq)]
pub(crate) enum Signal<T> {
    Next(T),
    Ready,
    // Errors are recorded by their message because `io::Error` is not comparable.
    Error(String),
    Complete,
}

/// Records every signal it receives, in order.
#[derive(Debug)]
pub(crate) struct RecordingSubscriber<T> {
    signals: Mutex<Vec<Signal<T>>>,
}

impl<T> RecordingSubscriber<T> {
    pub(crate) fn new() -> Self {
        Self {
            signals: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn signals(&self) -> Vec<Signal<T>>
    where
        T: Clone,
    {
        self.signals
            .lock()
            .iter()
            .map(|signal| match signal {
                Signal::Next(value) => Signal::Next(value.clone()),
                Signal::Ready => Signal::Ready,
                Signal::Error(message) => Signal::Error(message.clone()),
                Signal::Complete => Signal::Complete,
            })
            .collect()
    }
}

impl<T> Subscriber for RecordingSubscriber<T> {
    type Item = T;
    type Error = io::Error;

    fn on_next(&self, value: T) {
        self.signals.lock().push(Signal::Next(value));
    }

    fn on_ready(&self) {
        self.signals.lock().push(Signal::Ready);
    }

    fn on_error(&self, error: GateError<io::Error>) {
        let message = match error {
            GateError::Upstream(inner) => format!("upstream: {inner}"),
            other => other.to_string(),
        };

        self.signals.lock().push(Signal::Error(message));
    }

    fn on_complete(&self) {
        self.signals.lock().push(Signal::Complete);
    }
}
