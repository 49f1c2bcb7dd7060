//! Pass pipeline for one lowered pipeline body.
//!
//! ```text
//! Stmt (from the front-end)
//!     │
//!     ▼
//! raise ─► Stmt (arithmetic idioms as intrinsic calls)
//!     │
//!     ▼
//! lower_intrinsics ─► Stmt (only target-native intrinsics left)
//!     │
//!     ▼
//! inject_profiling ─► Stmt (profiler hooks, stage and memory accounting)
//! ```
//!
//! Each stage can be switched off in [`PipelineOptions`]. The statement after
//! every stage that ran is kept, so callers can print the pipeline as it
//! moves through the passes.

use tessera_ir::Stmt;
use tracing::debug;

use crate::diagnostic::Diagnostic;
use crate::intrinsics::{lower_intrinsics_stmt, raise_stmt};
use crate::profiling::{Instrumented, inject_profiling};
use crate::target::Target;

#[derive(Clone, Debug)]
pub struct PipelineOptions {
    pub raise: bool,
    pub lower_intrinsics: bool,
    pub profile: bool,
    /// Name under which the pipeline reports to the profiler.
    pub pipeline_name: String,
}

impl PipelineOptions {
    pub fn new(pipeline_name: impl Into<String>) -> Self {
        PipelineOptions {
            raise: true,
            lower_intrinsics: false,
            profile: false,
            pipeline_name: pipeline_name.into(),
        }
    }
}

/// The statement after one pass.
#[derive(Clone, Debug)]
pub struct PassOutput {
    pub pass: &'static str,
    pub stmt: Stmt,
    /// Whether the pass returned its input unchanged.
    pub unchanged: bool,
}

#[derive(Clone, Debug)]
pub struct PipelineOutput {
    pub passes: Vec<PassOutput>,
    pub instrumented: Option<Instrumented>,
    pub diagnostics: Vec<Diagnostic>,
}

impl PipelineOutput {
    /// The statement produced by the last pass that ran.
    pub fn stmt(&self) -> Option<&Stmt> {
        self.passes.last().map(|p| &p.stmt)
    }
}

pub fn run_pipeline(stmt: &Stmt, options: &PipelineOptions, target: &Target) -> PipelineOutput {
    let mut passes = Vec::new();
    let mut current = stmt.clone();
    let mut record = |pass: &'static str, next: Stmt, current: &mut Stmt| {
        let unchanged = next.same_as(current);
        debug!(pass, unchanged, "pass finished");
        passes.push(PassOutput {
            pass,
            stmt: next.clone(),
            unchanged,
        });
        *current = next;
    };

    if options.raise {
        let next = raise_stmt(&current);
        record("raise", next, &mut current);
    }
    if options.lower_intrinsics {
        let next = lower_intrinsics_stmt(&current, target);
        record("lower_intrinsics", next, &mut current);
    }
    let mut instrumented = None;
    let mut diagnostics = Vec::new();
    if options.profile {
        let result = inject_profiling(&current, &options.pipeline_name, target);
        record("inject_profiling", result.stmt.clone(), &mut current);
        diagnostics.extend(result.diagnostics.iter().cloned());
        instrumented = Some(result);
    }

    PipelineOutput {
        passes,
        instrumented,
        diagnostics,
    }
}
