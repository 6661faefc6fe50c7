#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! A single-slot asynchronous value gate.
//!
//! A [`Gate`] sits between an upstream that produces at most one value (or an error) and a
//! downstream [`Subscriber`] that signals demand asynchronously and may cancel at any time.
//! Whatever the order and timing of demand, value delivery and cancellation, the downstream
//! observes exactly one of:
//!
//! * the value followed by completion,
//! * completion alone (the upstream finished without a value),
//! * an error,
//! * nothing at all (the downstream cancelled).
//!
//! The gate is a passive, lock-free rendezvous point: it never spawns threads and never
//! blocks. Every transition is a compare-and-swap on a single atomic state.
//!
//! # Push protocol
//!
//! ```rust
//! use std::io;
//!
//! use futures::executor::block_on;
//! use scalar_gate::Gate;
//!
//! let (subscriber, outcome) = scalar_gate::channel::<String, io::Error>();
//! let gate = Gate::new(subscriber);
//!
//! // The downstream signals demand first...
//! gate.request(1);
//!
//! // ...and the upstream delivers whenever it is ready.
//! gate.supply_value("Hello, world!".to_string());
//!
//! assert_eq!(block_on(outcome).unwrap().as_deref(), Some("Hello, world!"));
//! ```
//!
//! # Fusion
//!
//! A downstream that prefers to take the value itself can negotiate fusion before the value
//! arrives. It is then told via [`Subscriber::on_ready()`] that the value can be taken with
//! [`Gate::poll()`], and the value itself never passes through [`Subscriber::on_next()`].
//!
//! ```rust
//! use scalar_gate::{FusionMode, Gate, GateError, Subscriber};
//!
//! struct Poller;
//!
//! impl Subscriber for Poller {
//!     type Item = u32;
//!     type Error = std::io::Error;
//!
//!     fn on_next(&self, _: u32) {
//!         unreachable!("fused gates do not push values");
//!     }
//!
//!     fn on_error(&self, _: GateError<std::io::Error>) {}
//!     fn on_complete(&self) {}
//! }
//!
//! let gate = Gate::new(Poller);
//! assert_eq!(gate.negotiate_fusion(FusionMode::ANY), FusionMode::ASYNC);
//!
//! gate.supply_value(9);
//!
//! assert_eq!(gate.poll(), Some(9));
//! assert_eq!(gate.poll(), None);
//! assert_eq!(gate.size(), 0);
//! ```
//!
//! # Logging
//!
//! State transitions are logged via `tracing` at the `trace` level and protocol violations
//! (illegal demand, duplicate values) at the `debug` level. Give a gate a name with
//! [`GateBuilder::name()`] to tell gates apart in the logs.

mod error;
mod fusion;
mod future;
mod gate;
mod options;
mod slot;
mod state;
mod subscriber;

#[cfg(test)]
mod test_utils;

pub use error::*;
pub use fusion::FusionMode;
pub(crate) use fusion::Fusion;
pub use future::*;
pub use gate::*;
pub use options::GateBuilder;
pub(crate) use options::GateOptions;
pub(crate) use slot::Slot;
pub use subscriber::*;
