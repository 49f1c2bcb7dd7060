//! Tessera driver library.
//!
//! The demo pipelines and the runner that executes them on the simulated
//! profiler runtime. The passes themselves live in `tessera-passes`.

pub mod demos;
pub mod invoke;

pub use demos::{DEMOS, Demo, PlaneSpec};
pub use invoke::{Invocation, InvocationError, expected_output, invoke};
