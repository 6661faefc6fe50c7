use thiserror::Error;

/// Errors delivered to the downstream of a [`Gate`][crate::Gate].
///
/// Cancellation is not an error - a downstream that cancels receives no signal at all.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GateError<E> {
    /// The downstream signaled a demand that was not a positive number of items.
    #[error("demand must be positive but {requested} was requested")]
    IllegalDemand {
        /// The demand that was signaled.
        requested: i64,
    },

    /// The upstream failed before delivering a value.
    #[error("upstream failed")]
    Upstream(#[source] E),

    /// The gate went away without delivering any terminal signal.
    ///
    /// Only reported by [`GateFuture`][crate::GateFuture].
    #[error("gate was dropped without delivering a terminal signal")]
    Disconnected,
}

impl<E> GateError<E> {
    /// Returns the upstream error, if this is an upstream failure.
    #[must_use]
    pub fn into_upstream(self) -> Option<E> {
        match self {
            Self::Upstream(e) => Some(e),
            Self::IllegalDemand { .. } | Self::Disconnected => None,
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::error::Error as _;
    use std::fmt::Debug;
    use std::io;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(GateError<io::Error>: Send, Sync, Debug);

    #[test]
    fn illegal_demand_message_mentions_value() {
        let error = GateError::<io::Error>::IllegalDemand { requested: -3 };

        assert!(error.to_string().contains("-3"));
        assert!(error.source().is_none());
    }

    #[test]
    fn upstream_error_is_source() {
        let error = GateError::Upstream(io::Error::other("boom"));

        let source = error.source().expect("upstream error must be chained as source");
        assert_eq!(source.to_string(), "boom");
    }

    #[test]
    fn into_upstream() {
        let error = GateError::Upstream(io::Error::other("boom"));
        assert_eq!(
            error.into_upstream().as_ref().map(ToString::to_string),
            Some("boom".to_string())
        );

        let error = GateError::<io::Error>::Disconnected;
        assert!(error.into_upstream().is_none());
    }
}
