use std::borrow::Cow;
use std::marker::PhantomData;

use crate::{Gate, Subscriber};

/// Construction-time configuration of a [`Gate`].
#[derive(Clone, Debug)]
pub(crate) struct GateOptions {
    /// Attached to log events to tell gates apart.
    pub(crate) name: Cow<'static, str>,

    /// Whether the gate may accept fusion negotiation.
    pub(crate) fusion_enabled: bool,
}

impl Default for GateOptions {
    fn default() -> Self {
        Self {
            name: Cow::Borrowed(""),
            fusion_enabled: true,
        }
    }
}

/// Creates a [`Gate`] with non-default options.
///
/// # Example
///
/// ```rust
/// use scalar_gate::{FusionMode, Gate, GateError, Subscriber};
///
/// # struct Ignore;
/// # impl Subscriber for Ignore {
/// #     type Item = u32;
/// #     type Error = std::io::Error;
/// #     fn on_next(&self, _: u32) {}
/// #     fn on_error(&self, _: GateError<std::io::Error>) {}
/// #     fn on_complete(&self) {}
/// # }
/// let gate = Gate::builder()
///     .name("config_lookup")
///     .fusion(false)
///     .build(Ignore);
///
/// assert_eq!(gate.name(), "config_lookup");
/// assert_eq!(gate.negotiate_fusion(FusionMode::ASYNC), FusionMode::NONE);
/// ```
#[derive(Debug)]
#[must_use]
pub struct GateBuilder<S> {
    options: GateOptions,

    _subscriber: PhantomData<fn(S)>,
}

impl<S> GateBuilder<S>
where
    S: Subscriber,
{
    pub(crate) fn new() -> Self {
        Self {
            options: GateOptions::default(),
            _subscriber: PhantomData,
        }
    }

    /// Sets the name attached to log events emitted by the gate.
    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.options.name = name.into();
        self
    }

    /// Sets whether the gate accepts fusion negotiation. Enabled by default.
    pub fn fusion(mut self, enabled: bool) -> Self {
        self.options.fusion_enabled = enabled;
        self
    }

    /// Creates the gate, delivering its outcome to `downstream`.
    #[must_use]
    pub fn build(self, downstream: S) -> Gate<S> {
        Gate::with_options(downstream, self.options)
    }
}
