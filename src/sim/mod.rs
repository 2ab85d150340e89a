//! Simulator access and process control.
//!
//! - [`traits`] -- the [`Simulator`] service surface.
//! - [`http`] -- [`HttpSimulator`], a blocking client for a simulator bridge.
//! - [`mock`] -- [`MockSimulator`], in-memory state for tests and dry runs.
//! - [`control`] -- [`SimulatorControl`] and the child-process implementation
//!   used when the curriculum needs a simulator restart.

pub mod control;
pub mod http;
pub mod mock;
pub mod traits;

pub use control::{ProcessSimulatorControl, SimulatorControl};
pub use http::HttpSimulator;
pub use mock::{MockSimulator, MockSimulatorControl};
pub use traits::{ModelKind, ModelSpec, Simulator};
