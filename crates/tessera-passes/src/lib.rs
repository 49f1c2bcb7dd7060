//! Middle-end passes for tessera.
//!
//! This crate contains the passes that run on a lowered pipeline body before
//! code generation: intrinsic raising and lowering, and profiling
//! instrumentation. Every pass takes the [`Target`] it compiles for as an
//! argument.

// === Configuration and diagnostics ===
pub mod diagnostic;
pub mod target;

// === Passes ===
pub mod intrinsics;
pub mod pipeline;
pub mod profiling;

// Re-exports
pub use diagnostic::{Diagnostic, DiagnosticKind, DiagnosticSeverity, PassPhase};
pub use intrinsics::{
    as_add, as_mul, lower_intrinsic, lower_intrinsics, lower_intrinsics_stmt, raise, raise_stmt,
};
pub use pipeline::{PassOutput, PipelineOptions, PipelineOutput, run_pipeline};
pub use profiling::{Instrumented, StackLedger, StageTable, inject_profiling};
pub use target::{ConfigError, Target, TargetConfig};
