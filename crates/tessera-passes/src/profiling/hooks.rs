//! Names and call builders for the profiler runtime contract.

use tessera_ir::{Expr, Type};

pub const PIPELINE_START: &str = "tessera_profiler_pipeline_start";
pub const PIPELINE_END: &str = "tessera_profiler_pipeline_end";
pub const GET_STATE: &str = "tessera_profiler_get_state";
pub const GET_PIPELINE_STATE: &str = "tessera_profiler_get_pipeline_state";
pub const SET_CURRENT_STAGE: &str = "tessera_profiler_set_current_stage";
pub const MEMORY_ALLOCATE: &str = "tessera_profiler_memory_allocate";
pub const MEMORY_FREE: &str = "tessera_profiler_memory_free";
pub const STACK_PEAK_UPDATE: &str = "tessera_profiler_stack_peak_update";

/// Every hook the instrumented code may call.
pub const ALL: [&str; 8] = [
    PIPELINE_START,
    PIPELINE_END,
    GET_STATE,
    GET_PIPELINE_STATE,
    SET_CURRENT_STAGE,
    MEMORY_ALLOCATE,
    MEMORY_FREE,
    STACK_PEAK_UPDATE,
];

pub const TOKEN_VAR: &str = "profiler_token";
pub const STATE_VAR: &str = "profiler_state";
pub const PIPELINE_STATE_VAR: &str = "profiler_pipeline_state";

pub const STAGE_NAMES_BUFFER: &str = "profiling_stage_names";
pub const STAGE_PEAKS_BUFFER: &str = "profiling_stage_peaks";

pub fn token() -> Expr {
    Expr::var(Type::int(32), TOKEN_VAR)
}

pub fn state() -> Expr {
    Expr::var(Type::handle(), STATE_VAR)
}

pub fn pipeline_state() -> Expr {
    Expr::var(Type::handle(), PIPELINE_STATE_VAR)
}

pub fn set_current_stage(stage: i32) -> Expr {
    Expr::call_extern(
        Type::int(32),
        SET_CURRENT_STAGE,
        [state(), token(), Expr::i32(stage)],
    )
}

pub fn memory_allocate(stage: i32, bytes: Expr) -> Expr {
    Expr::call_extern(
        Type::int(32),
        MEMORY_ALLOCATE,
        [pipeline_state(), Expr::i32(stage), bytes],
    )
}

pub fn memory_free(stage: i32, bytes: Expr) -> Expr {
    Expr::call_extern(
        Type::int(32),
        MEMORY_FREE,
        [pipeline_state(), Expr::i32(stage), bytes],
    )
}

pub fn get_state() -> Expr {
    Expr::call_extern(Type::handle(), GET_STATE, [])
}

pub fn get_pipeline_state(pipeline: &str) -> Expr {
    Expr::call_extern(Type::handle(), GET_PIPELINE_STATE, [Expr::string(pipeline)])
}

pub fn pipeline_start(pipeline: &str, stage_count: i32, stage_names: Expr) -> Expr {
    Expr::call_extern(
        Type::int(32),
        PIPELINE_START,
        [Expr::string(pipeline), Expr::i32(stage_count), stage_names],
    )
}

pub fn stack_peak_update(total_peak: Expr, peaks: Expr) -> Expr {
    Expr::call_extern(
        Type::int(32),
        STACK_PEAK_UPDATE,
        [pipeline_state(), total_peak, peaks],
    )
}

/// Queue `pipeline_end(profiler_state)` to run when the invocation exits.
pub fn register_pipeline_end() -> Expr {
    Expr::register_destructor(PIPELINE_END, state())
}
