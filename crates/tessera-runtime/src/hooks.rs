//! Extern handler serving the profiler hooks.

use tessera_ir::eval::{ExecError, ExecResult, ExternHandler, Handle, Memory, Value};
use tessera_passes::profiling::hooks;
use tracing::{debug, trace};

use crate::state::{GLOBAL_STATE_HANDLE, PipelineReport, profiler_state};

/// Implements every profiler hook against the process-wide profiler state.
///
/// Calls to other externs are forwarded to `fallback` when one is set.
#[derive(Default)]
pub struct SimulatedProfiler<'f> {
    fallback: Option<&'f mut dyn ExternHandler>,
    /// Token of the invocation this handler is running.
    token: Option<i32>,
}

impl<'f> SimulatedProfiler<'f> {
    pub fn new() -> Self {
        SimulatedProfiler::default()
    }

    pub fn with_fallback(fallback: &'f mut dyn ExternHandler) -> Self {
        SimulatedProfiler {
            fallback: Some(fallback),
            token: None,
        }
    }

    /// Token handed out by `pipeline_start`, if one succeeded.
    pub fn token(&self) -> Option<i32> {
        self.token
    }

    fn pipeline_start(&mut self, name: &str, args: &[Value], memory: &Memory) -> ExecResult<Value> {
        let count = int_arg(name, args, 1)?;
        let count = usize::try_from(count)
            .map_err(|_| ExecError::extern_failed(name, format!("negative stage count {count}")))?;
        let names_ptr = handle_arg(name, args, 2)?;
        let stage_names = memory
            .read(names_ptr, count)?
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_owned)
                    .ok_or_else(|| ExecError::extern_failed(name, format!("stage name {v} is not a string")))
            })
            .collect::<ExecResult<Vec<_>>>()?;
        let pipeline = str_arg(name, args, 0)?;

        let token = profiler_state().start(pipeline, stage_names);
        if token >= 0 {
            self.token = Some(token);
        }
        debug!(pipeline, stages = count, token, "pipeline start");
        Ok(Value::Int(i128::from(token)))
    }

    fn with_pipeline<R>(
        &self,
        name: &str,
        handle: &Handle,
        f: impl FnOnce(&mut PipelineReport) -> R,
    ) -> ExecResult<R> {
        let Handle::Opaque(handle) = handle else {
            return Err(ExecError::extern_failed(name, format!("not a pipeline state: {handle:?}")));
        };
        profiler_state()
            .with_handle(*handle, f)
            .ok_or_else(|| ExecError::extern_failed(name, format!("unknown pipeline state {handle:#x}")))
    }
}

impl ExternHandler for SimulatedProfiler<'_> {
    fn call_extern(&mut self, name: &str, args: &[Value], memory: &Memory) -> ExecResult<Value> {
        trace!(function = name, ?args, "extern call");
        match name {
            hooks::GET_STATE => Ok(Value::Handle(Handle::Opaque(GLOBAL_STATE_HANDLE))),
            hooks::GET_PIPELINE_STATE => {
                let pipeline = str_arg(name, args, 0)?;
                let handle = profiler_state().pipeline_handle(pipeline);
                Ok(Value::Handle(Handle::Opaque(handle)))
            }
            hooks::PIPELINE_START => self.pipeline_start(name, args, memory),
            hooks::SET_CURRENT_STAGE => {
                let token = int_arg(name, args, 1)?;
                let stage = int_arg(name, args, 2)?;
                let token = i32::try_from(token)
                    .map_err(|_| ExecError::extern_failed(name, format!("bad token {token}")))?;
                profiler_state()
                    .with_token(token, |record| {
                        let slot = usize::try_from(stage).ok();
                        match slot.and_then(|s| record.activations.get_mut(s)) {
                            Some(count) => {
                                *count += 1;
                                record.current_stage = stage as i32;
                                Ok(())
                            }
                            None => Err(ExecError::extern_failed(name, format!("unknown stage {stage}"))),
                        }
                    })
                    .ok_or_else(|| ExecError::extern_failed(name, format!("unknown token {token}")))??;
                Ok(Value::Int(0))
            }
            hooks::MEMORY_ALLOCATE | hooks::MEMORY_FREE => {
                let handle = handle_arg(name, args, 0)?;
                let bytes = int_arg(name, args, 2)?;
                let bytes = i64::try_from(bytes)
                    .map_err(|_| ExecError::extern_failed(name, format!("bad size {bytes}")))?;
                let allocating = name == hooks::MEMORY_ALLOCATE;
                self.with_pipeline(name, handle, |record| {
                    if allocating {
                        record.heap_current += bytes;
                        record.heap_peak = record.heap_peak.max(record.heap_current);
                        record.heap_allocations += 1;
                    } else {
                        record.heap_current -= bytes;
                    }
                })?;
                Ok(Value::Int(0))
            }
            hooks::STACK_PEAK_UPDATE => {
                let handle = handle_arg(name, args, 0)?;
                let total = int_arg(name, args, 1)?;
                let total = i64::try_from(total)
                    .map_err(|_| ExecError::extern_failed(name, format!("bad peak {total}")))?;
                let count = self.with_pipeline(name, handle, |record| record.stack_peaks.len())?;
                let peaks = memory
                    .read(handle_arg(name, args, 2)?, count)?
                    .iter()
                    .map(|v| v.as_int().and_then(|p| i64::try_from(p).ok()).unwrap_or(0))
                    .collect::<Vec<_>>();
                self.with_pipeline(name, handle, |record| {
                    record.stack_peak = record.stack_peak.max(total);
                    for (slot, peak) in record.stack_peaks.iter_mut().zip(peaks) {
                        *slot = (*slot).max(peak);
                    }
                })?;
                Ok(Value::Int(0))
            }
            hooks::PIPELINE_END => {
                if !profiler_state().end() {
                    return Err(ExecError::extern_failed(name, "no pipeline is running"));
                }
                self.token = None;
                Ok(Value::Int(0))
            }
            _ => match self.fallback.as_deref_mut() {
                Some(fallback) => fallback.call_extern(name, args, memory),
                None => Err(tessera_ir::eval::ExecErrorKind::UnknownExtern(name.to_owned()).into()),
            },
        }
    }
}

fn arg<'a>(name: &str, args: &'a [Value], index: usize) -> ExecResult<&'a Value> {
    args.get(index)
        .ok_or_else(|| ExecError::extern_failed(name, format!("missing argument {index}")))
}

fn int_arg(name: &str, args: &[Value], index: usize) -> ExecResult<i128> {
    let value = arg(name, args, index)?;
    value
        .as_int()
        .ok_or_else(|| ExecError::extern_failed(name, format!("argument {index} is not an integer: {value}")))
}

fn str_arg<'a>(name: &str, args: &'a [Value], index: usize) -> ExecResult<&'a str> {
    let value = arg(name, args, index)?;
    value
        .as_str()
        .ok_or_else(|| ExecError::extern_failed(name, format!("argument {index} is not a string: {value}")))
}

fn handle_arg<'a>(name: &str, args: &'a [Value], index: usize) -> ExecResult<&'a Handle> {
    let value = arg(name, args, index)?;
    value
        .as_handle()
        .ok_or_else(|| ExecError::extern_failed(name, format!("argument {index} is not a handle: {value}")))
}
