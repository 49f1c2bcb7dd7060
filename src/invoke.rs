//! Running a demo pipeline on the simulated profiler runtime.

use std::collections::BTreeMap;

use derive_more::{Display, Error};
use tessera_ir::eval::{Buffer, ExecError, ExecErrorKind, Interpreter, Value};
use tessera_ir::Stmt;
use tessera_passes::profiling::hooks;
use tessera_runtime::SimulatedProfiler;
use tracing::{debug, info_span};

use crate::demos::{Demo, PlaneSpec};

/// Why a pipeline invocation did not complete.
#[derive(Debug, Display, Error)]
pub enum InvocationError {
    /// `pipeline_start` returned a negative token.
    #[display("profiler failed to start pipeline (code {_0})")]
    ProfilerInitFailure(#[error(not(source))] i32),

    #[display("pipeline failed: {_0}")]
    Execution(#[error(source)] ExecError),
}

impl InvocationError {
    /// Classify an interpreter failure: a failed assertion on the profiler
    /// start token is a profiler initialization failure.
    pub fn from_exec(error: ExecError) -> Self {
        if let ExecErrorKind::AssertionFailed { code, message } = error.kind()
            && message.as_var() == Some(hooks::TOKEN_VAR)
            && let Ok(code) = i32::try_from(*code)
        {
            return InvocationError::ProfilerInitFailure(code);
        }
        InvocationError::Execution(error)
    }
}

/// Output planes of a finished invocation.
#[derive(Clone, Debug)]
pub struct Invocation {
    pub width: i64,
    pub height: i64,
    pub outputs: BTreeMap<&'static str, Vec<i128>>,
}

/// Synthetic input: element `i` holds `i` wrapped to the plane type.
pub fn synthetic_plane(spec: &PlaneSpec, width: i64, height: i64) -> Buffer {
    let len = (spec.len)(width, height).max(0) as usize;
    Buffer {
        ty: spec.ty,
        data: (0..len as i128).map(|i| Value::Int(spec.ty.wrap(i))).collect(),
    }
}

/// Execute `stmt`, a possibly transformed body of `demo`, for an image of
/// `width` x `height` (rounded up to the demo's tiles).
pub fn invoke(demo: &Demo, stmt: &Stmt, width: i64, height: i64) -> Result<Invocation, InvocationError> {
    let (width, height) = demo.round_size(width, height);
    let _span = info_span!("invoke", demo = demo.name, width, height).entered();

    let mut profiler = SimulatedProfiler::new();
    let mut interpreter = Interpreter::new(&mut profiler);
    interpreter.bind("width", Value::Int(i128::from(width)));
    interpreter.bind("height", Value::Int(i128::from(height)));
    for spec in demo.inputs {
        interpreter
            .memory_mut()
            .allocate(spec.name, synthetic_plane(spec, width, height));
    }
    for spec in demo.outputs {
        let len = (spec.len)(width, height).max(0) as usize;
        interpreter
            .memory_mut()
            .allocate(spec.name, Buffer::zeroed(spec.ty, len));
    }

    interpreter.run(stmt).map_err(InvocationError::from_exec)?;
    debug!("invocation finished");

    let outputs = demo
        .outputs
        .iter()
        .map(|spec| {
            let values = interpreter
                .memory()
                .get(spec.name)
                .map(|buffer| buffer.data.iter().filter_map(Value::as_int).collect())
                .unwrap_or_default();
            (spec.name, values)
        })
        .collect();
    Ok(Invocation {
        width,
        height,
        outputs,
    })
}

/// Expected output of a demo: every input element doubled.
pub fn expected_output(spec: &PlaneSpec, width: i64, height: i64) -> Vec<i128> {
    let ty = spec.ty;
    synthetic_plane(spec, width, height)
        .data
        .iter()
        .filter_map(Value::as_int)
        .map(|v| ty.wrap(v * 2))
        .collect()
}
