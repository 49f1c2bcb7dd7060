//! Process-wide profiler state.
//!
//! Pipelines are keyed by name. A pipeline's record survives across
//! invocations and accumulates their counts, like a real sampling profiler's
//! per-pipeline statistics.

use std::fmt;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};

use dashmap::DashMap;

/// Handle returned by `get_state`.
pub const GLOBAL_STATE_HANDLE: u64 = 1;

/// Accumulated statistics of one pipeline.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub name: String,
    /// Stage names by id, from the last `pipeline_start`.
    pub stage_names: Vec<String>,
    /// Number of times each stage was made current.
    pub activations: Vec<u64>,
    /// Largest stack usage reported per stage, in bytes.
    pub stack_peaks: Vec<i64>,
    /// Largest total stack usage reported, in bytes.
    pub stack_peak: i64,
    pub heap_current: i64,
    pub heap_peak: i64,
    pub heap_allocations: u64,
    pub runs: u64,
    /// Number of invocations whose `pipeline_end` ran.
    pub ended: u64,
    /// Stage that was current when the last call arrived.
    pub current_stage: i32,
}

impl PipelineReport {
    fn new(name: &str) -> Self {
        PipelineReport {
            name: name.to_owned(),
            ..Default::default()
        }
    }

    pub fn activations_of(&self, stage: &str) -> Option<u64> {
        let id = self.stage_names.iter().position(|s| s == stage)?;
        self.activations.get(id).copied()
    }

    pub fn stack_peak_of(&self, stage: &str) -> Option<i64> {
        let id = self.stage_names.iter().position(|s| s == stage)?;
        self.stack_peaks.get(id).copied()
    }

    fn start(&mut self, stage_names: Vec<String>) {
        let count = stage_names.len();
        if self.stage_names != stage_names {
            self.activations = vec![0; count];
            self.stack_peaks = vec![0; count];
            self.stage_names = stage_names;
        }
        self.runs += 1;
        self.current_stage = 0;
    }
}

impl fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "pipeline {}: {} run(s), {} ended",
            self.name, self.runs, self.ended
        )?;
        writeln!(
            f,
            "  heap: {} B current, {} B peak, {} allocation(s)",
            self.heap_current, self.heap_peak, self.heap_allocations
        )?;
        writeln!(f, "  stack peak: {} B", self.stack_peak)?;
        writeln!(f, "  {:<24} {:>11} {:>12}", "stage", "activations", "stack peak")?;
        for (id, name) in self.stage_names.iter().enumerate() {
            let activations = self.activations.get(id).copied().unwrap_or(0);
            let peak = self.stack_peaks.get(id).copied().unwrap_or(0);
            writeln!(f, "  {name:<24} {activations:>11} {peak:>12}")?;
        }
        Ok(())
    }
}

/// Table of all pipelines seen by this process.
pub struct ProfilerState {
    pipelines: DashMap<String, PipelineReport>,
    /// Pipeline name by pipeline-state handle.
    handles: DashMap<u64, String>,
    /// Pipeline name by start token.
    tokens: DashMap<i32, String>,
    next_handle: AtomicU64,
    next_token: AtomicI32,
    /// Token of the most recent successful `pipeline_start`, or -1.
    active_token: AtomicI32,
    /// Negative code returned by `pipeline_start` instead of a token, or 0.
    start_failure: AtomicI32,
}

impl ProfilerState {
    fn new() -> Self {
        ProfilerState {
            pipelines: DashMap::new(),
            handles: DashMap::new(),
            tokens: DashMap::new(),
            next_handle: AtomicU64::new(GLOBAL_STATE_HANDLE + 1),
            next_token: AtomicI32::new(0),
            active_token: AtomicI32::new(-1),
            start_failure: AtomicI32::new(0),
        }
    }

    /// Handle of `name`'s pipeline state, created on first request.
    pub fn pipeline_handle(&self, name: &str) -> u64 {
        if let Some(entry) = self.handles.iter().find(|entry| entry.value() == name) {
            return *entry.key();
        }
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.handles.insert(handle, name.to_owned());
        self.pipelines
            .entry(name.to_owned())
            .or_insert_with(|| PipelineReport::new(name));
        handle
    }

    /// Begin an invocation. Returns the configured failure code instead of a
    /// token if one is set.
    pub fn start(&self, name: &str, stage_names: Vec<String>) -> i32 {
        let failure = self.start_failure.load(Ordering::Relaxed);
        if failure < 0 {
            return failure;
        }
        self.pipelines
            .entry(name.to_owned())
            .or_insert_with(|| PipelineReport::new(name))
            .start(stage_names);
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.tokens.insert(token, name.to_owned());
        self.active_token.store(token, Ordering::Relaxed);
        token
    }

    /// Run `f` on the record of the pipeline that owns `token`.
    pub fn with_token<R>(&self, token: i32, f: impl FnOnce(&mut PipelineReport) -> R) -> Option<R> {
        let name = self.tokens.get(&token)?.value().clone();
        let mut record = self.pipelines.get_mut(&name)?;
        Some(f(&mut record))
    }

    /// Run `f` on the record behind a pipeline-state handle.
    pub fn with_handle<R>(&self, handle: u64, f: impl FnOnce(&mut PipelineReport) -> R) -> Option<R> {
        let name = self.handles.get(&handle)?.value().clone();
        let mut record = self.pipelines.get_mut(&name)?;
        Some(f(&mut record))
    }

    /// Finish the most recently started invocation.
    pub fn end(&self) -> bool {
        let token = self.active_token.swap(-1, Ordering::Relaxed);
        self.with_token(token, |record| {
            record.ended += 1;
            record.current_stage = 0;
        })
        .is_some()
    }

    pub fn report(&self, name: &str) -> Option<PipelineReport> {
        self.pipelines.get(name).map(|record| record.value().clone())
    }

    /// Make every subsequent `pipeline_start` fail with `code`, which must be
    /// negative. `None` restores normal starts.
    pub fn set_start_failure(&self, code: Option<i32>) {
        let code = code.filter(|c| *c < 0).unwrap_or(0);
        self.start_failure.store(code, Ordering::Relaxed);
    }

    /// Forget every pipeline.
    pub fn clear(&self) {
        self.pipelines.clear();
        self.handles.clear();
        self.tokens.clear();
        self.next_handle.store(GLOBAL_STATE_HANDLE + 1, Ordering::Relaxed);
        self.next_token.store(0, Ordering::Relaxed);
        self.active_token.store(-1, Ordering::Relaxed);
        self.start_failure.store(0, Ordering::Relaxed);
    }
}

static PROFILER_STATE: LazyLock<ProfilerState> = LazyLock::new(ProfilerState::new);

/// The process-wide profiler state.
pub fn profiler_state() -> &'static ProfilerState {
    &PROFILER_STATE
}
