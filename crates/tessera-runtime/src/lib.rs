//! Tessera profiler runtime.
//!
//! A simulated implementation of the profiler hooks that instrumented
//! pipelines call. It keeps one record per pipeline name in a process-wide
//! table:
//! - stage activation counts (`set_current_stage`)
//! - heap usage reported by `memory_allocate` / `memory_free`
//! - per-stage stack peaks reported by `stack_peak_update`
//! - run and completion counts (`pipeline_start` / `pipeline_end`)
//!
//! [`SimulatedProfiler`] is an [`ExternHandler`](tessera_ir::eval::ExternHandler),
//! so an instrumented statement runs under the IR interpreter with it.

mod hooks;
mod state;

#[cfg(test)]
mod tests;

pub use hooks::SimulatedProfiler;
pub use state::{GLOBAL_STATE_HANDLE, PipelineReport, ProfilerState, profiler_state};

/// Statistics accumulated for `pipeline` so far.
pub fn report(pipeline: &str) -> Option<PipelineReport> {
    profiler_state().report(pipeline)
}

/// Forget all recorded pipelines and restore normal starts.
pub fn reset() {
    profiler_state().clear();
}

/// Make `pipeline_start` return `code` (negative) instead of a token.
pub fn set_start_failure(code: Option<i32>) {
    profiler_state().set_start_failure(code);
}
