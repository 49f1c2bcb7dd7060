use std::ops::ControlFlow;

use insta::assert_snapshot;
use tessera_ir::eval::{ExecErrorKind, ExecResult, ExternHandler, Handle, Interpreter, Memory, Value};
use tessera_ir::walk::count_extern_calls;
use tessera_ir::{DeviceApi, Expr, ForKind, IrWalk, Stmt, StmtKind, Type, WalkAction};

use super::*;
use crate::diagnostic::DiagnosticKind;

fn host() -> Target {
    Target::parse("x86_64-unknown-linux-gnu").unwrap()
}

/// `allocate name[ty * extents] { produce name { fill } consume name { consume } free name }`
fn stage(name: &str, ty: Type, extents: Vec<Expr>, produce: Stmt, consume: Stmt) -> Stmt {
    let pc = Stmt::producer_consumer(name, produce, None, consume);
    Stmt::allocate(
        name,
        ty,
        extents,
        Expr::bool(true),
        Stmt::block([pc, Stmt::free(name)]),
    )
}

fn fill(name: &str, ty: Type, extent: i32) -> Stmt {
    let x = Expr::var(Type::int(32), "x");
    Stmt::serial(
        "x",
        Expr::i32(0),
        Expr::i32(extent),
        Stmt::store(name, cast(ty, x.clone()), x),
    )
}

fn read_first(from: &str, ty: Type, into: &str) -> Stmt {
    Stmt::store(into, Expr::load(ty, from, Expr::i32(0)), Expr::i32(0))
}

fn find_loops(stmt: &Stmt) -> Vec<Stmt> {
    let mut loops = Vec::new();
    let _ = stmt.walk_stmts::<()>(|s| {
        if matches!(s.kind(), StmtKind::For(_)) {
            loops.push(s.clone());
        }
        ControlFlow::Continue(WalkAction::Advance)
    });
    loops
}

#[test]
fn test_instrumented_shape() {
    let u8_ = Type::uint(8);
    let body = stage(
        "f",
        u8_,
        vec![Expr::i32(16)],
        fill("f", u8_, 16),
        read_first("f", u8_, "out"),
    );
    let result = inject_profiling(&body, "demo", &host());
    assert!(result.diagnostics.is_empty());
    assert_snapshot!(result.stmt.to_string().trim_end(), @r#"
    allocate profiling_stage_names[handle * 2]
    profiling_stage_names[0] = "overhead"
    profiling_stage_names[1] = "f"
    let profiler_state = tessera_profiler_get_state()
    let profiler_pipeline_state = tessera_profiler_get_pipeline_state("demo")
    let profiler_token = tessera_profiler_pipeline_start("demo", 2, address_of(profiling_stage_names[0]))
    assert((profiler_token >= 0), profiler_token)
    register_destructor("tessera_profiler_pipeline_end", profiler_state)
    allocate profiling_stage_peaks[i64 * 2]
    profiling_stage_peaks[0] = (i64)0
    profiling_stage_peaks[1] = (i64)16
    tessera_profiler_stack_peak_update(profiler_pipeline_state, (i64)16, address_of(profiling_stage_peaks[0]))
    allocate f[u8 * 16]
    produce f {
      tessera_profiler_set_current_stage(profiler_state, profiler_token, 1)
      for<serial, none> (x, 0, 16) {
        f[x] = u8(x)
      }
    }
    consume f {
      tessera_profiler_set_current_stage(profiler_state, profiler_token, 0)
      out[0] = f[0]
    }
    free f
    free profiling_stage_peaks
    free profiling_stage_names
    "#);
}

#[test]
fn test_stage_ids_follow_first_encounter() {
    let i32_ = Type::int(32);
    let region = |name: &str| {
        Stmt::producer_consumer(
            name,
            Stmt::no_op(),
            None,
            Stmt::evaluate(Expr::var(i32_, "x")),
        )
    };
    let body = Stmt::block([region("A"), region("B"), region("A")]);
    let result = inject_profiling(&body, "p", &host());
    assert_eq!(result.stages.names(), ["overhead", "A", "B"]);
    assert_eq!(result.stages.get("A"), Some(1));
    assert_eq!(result.stages.get("B"), Some(2));
    assert_eq!(count_extern_calls(&result.stmt, hooks::SET_CURRENT_STAGE), 6);
}

#[test]
fn test_nested_stack_allocations_are_accounted_per_stage() {
    let u8_ = Type::uint(8);
    let blur_x = stage(
        "blur_x",
        u8_,
        vec![Expr::i32(64)],
        fill("blur_x", u8_, 64),
        read_first("blur_x", u8_, "blur_y"),
    );
    let blur_y = stage("blur_y", u8_, vec![Expr::i32(128)], blur_x, read_first("blur_y", u8_, "out"));

    let result = inject_profiling(&blur_y, "blur", &host());
    let x = result.stages.get("blur_x").unwrap();
    let y = result.stages.get("blur_y").unwrap();
    assert_eq!(result.ledger.peak_bytes(x), Some(64));
    assert!(result.ledger.peak_bytes(y).unwrap() >= 128);
    assert_eq!(result.ledger.current_bytes(x), Some(0));
    assert_eq!(result.ledger.current_bytes(y), Some(0));
    assert_eq!(result.ledger.max_peak().as_int(), Some(128));
    assert_eq!(count_extern_calls(&result.stmt, hooks::MEMORY_ALLOCATE), 0);
    assert_eq!(count_extern_calls(&result.stmt, hooks::STACK_PEAK_UPDATE), 1);
}

#[test]
fn test_symbolic_allocation_goes_to_heap() {
    let u16_ = Type::uint(16);
    let width = Expr::var(Type::int(32), "width");
    let body = stage(
        "g",
        u16_,
        vec![width],
        Stmt::no_op(),
        read_first("g", u16_, "out"),
    );
    let result = inject_profiling(&body, "p", &host());
    assert_eq!(count_extern_calls(&result.stmt, hooks::MEMORY_ALLOCATE), 1);
    assert_eq!(count_extern_calls(&result.stmt, hooks::MEMORY_FREE), 1);
    assert_eq!(count_extern_calls(&result.stmt, hooks::STACK_PEAK_UPDATE), 0);

    let mut reports = Vec::new();
    let _ = result.stmt.walk_exprs::<()>(|e| {
        if e.is_extern_call(hooks::MEMORY_ALLOCATE) || e.is_extern_call(hooks::MEMORY_FREE) {
            reports.push(e.to_string());
        }
        ControlFlow::Continue(WalkAction::Advance)
    });
    assert_eq!(
        reports,
        [
            "tessera_profiler_memory_allocate(profiler_pipeline_state, 1, (i64(width) * (i64)2))",
            "tessera_profiler_memory_free(profiler_pipeline_state, 1, (i64(width) * (i64)2))",
        ]
    );
}

#[test]
fn test_zero_sized_allocations_are_not_accounted() {
    let u8_ = Type::uint(8);
    let width = Expr::var(Type::int(32), "width");
    for extents in [vec![width, Expr::i32(0)], vec![Expr::i32(0)]] {
        let body = stage("z", u8_, extents, Stmt::no_op(), Stmt::no_op());
        let result = inject_profiling(&body, "p", &host());
        assert_eq!(count_extern_calls(&result.stmt, hooks::MEMORY_ALLOCATE), 0);
        assert_eq!(count_extern_calls(&result.stmt, hooks::MEMORY_FREE), 0);
        assert_eq!(count_extern_calls(&result.stmt, hooks::STACK_PEAK_UPDATE), 0);
        assert!(result.ledger.max_peak().is_zero());
        assert!(result.diagnostics.is_empty());
        // The stage itself is still announced.
        assert_eq!(count_extern_calls(&result.stmt, hooks::SET_CURRENT_STAGE), 2);
    }
}

#[test]
fn test_large_constant_allocation_goes_to_heap() {
    let f32_ = Type::float(32);
    let body = stage("big", f32_, vec![Expr::i32(1024), Expr::i32(8)], Stmt::no_op(), Stmt::no_op());

    let result = inject_profiling(&body, "p", &host());
    assert_eq!(count_extern_calls(&result.stmt, hooks::MEMORY_ALLOCATE), 1);
    assert!(result.ledger.max_peak().is_zero());

    // The same buffer fits the stack of a Hexagon DSP.
    let hexagon = Target::parse("hexagon-unknown-none-elf").unwrap();
    let result = inject_profiling(&body, "p", &hexagon);
    assert_eq!(count_extern_calls(&result.stmt, hooks::MEMORY_ALLOCATE), 0);
    assert_eq!(result.ledger.max_peak().as_int(), Some(32 * 1024));
}

#[test]
fn test_overflowing_size_is_ignored_with_warning() {
    let body = stage(
        "huge",
        Type::int(64),
        vec![Expr::i32(1 << 20), Expr::i32(1 << 20)],
        Stmt::no_op(),
        Stmt::no_op(),
    );
    let result = inject_profiling(&body, "p", &host());
    assert_eq!(count_extern_calls(&result.stmt, hooks::MEMORY_ALLOCATE), 0);
    assert!(result.ledger.max_peak().is_zero());
    assert_eq!(result.diagnostics.len(), 1);
    assert_eq!(
        result.diagnostics[0].kind,
        DiagnosticKind::SizeOverflowIgnored {
            allocation: "huge".to_owned()
        }
    );
}

#[test]
fn test_loops_off_the_entering_thread_are_untouched() {
    let u8_ = Type::uint(8);
    let inner = stage("t", u8_, vec![Expr::i32(8)], fill("t", u8_, 8), Stmt::no_op());
    for (kind, device) in [
        (ForKind::Serial, DeviceApi::Gpu),
        (ForKind::Serial, DeviceApi::HexagonDma),
        (ForKind::Parallel, DeviceApi::Host),
    ] {
        let offloaded = Stmt::for_loop("y", Expr::i32(0), Expr::i32(4), kind, device, inner.clone());

        let result = inject_profiling(&offloaded, "p", &host());
        assert!(result.stmt.same_as(&offloaded));
        assert!(result.stages.is_empty());

        let body = stage("out", u8_, vec![Expr::i32(1)], offloaded.clone(), Stmt::no_op());
        let result = inject_profiling(&body, "p", &host());
        let loops = find_loops(&result.stmt);
        assert!(loops.iter().any(|l| l.same_as(&offloaded)));
        assert_eq!(result.stages.get("t"), None);
    }
}

#[test]
fn test_nothing_to_profile_returns_input() {
    let x = Expr::var(Type::int(32), "x");
    let body = Stmt::serial(
        "x",
        Expr::i32(0),
        Expr::i32(4),
        Stmt::store("out", x.clone(), x),
    );
    let result = inject_profiling(&body, "p", &host());
    assert!(result.stmt.same_as(&body));
}

#[test]
fn test_update_runs_inside_its_stage() {
    let u8_ = Type::uint(8);
    let pc = Stmt::producer_consumer(
        "h",
        fill("h", u8_, 4),
        Some(Stmt::block([Stmt::free("h"), Stmt::no_op()])),
        Stmt::no_op(),
    );
    let body = Stmt::allocate("h", u8_, vec![Expr::i32(4)], Expr::bool(true), pc);
    let result = inject_profiling(&body, "p", &host());
    let h = result.stages.get("h").unwrap();
    assert_eq!(result.ledger.peak_bytes(h), Some(4));
    assert_eq!(result.ledger.current_bytes(h), Some(0));
}

#[test]
fn test_unfreed_allocation_is_released_on_exit() {
    let u8_ = Type::uint(8);
    let leaky = Stmt::allocate("leak", u8_, vec![Expr::i32(32)], Expr::bool(true), Stmt::no_op());
    let result = inject_profiling(&leaky, "p", &host());
    let id = result.stages.get("leak").unwrap();
    assert_eq!(result.ledger.peak_bytes(id), Some(32));
    assert_eq!(result.ledger.current_bytes(id), Some(0));

    let stray = Stmt::block([Stmt::free("nobody"), Stmt::no_op()]);
    let result = inject_profiling(&stray, "p", &host());
    assert!(result.stmt.same_as(&stray));
}

// =============================================================================
// Execution
// =============================================================================

#[derive(Default)]
struct RecordingHooks {
    start_token: i32,
    calls: Vec<(String, Vec<Value>)>,
    stage_names: Vec<String>,
}

impl ExternHandler for RecordingHooks {
    fn call_extern(&mut self, name: &str, args: &[Value], memory: &Memory) -> ExecResult<Value> {
        self.calls.push((name.to_owned(), args.to_vec()));
        match name {
            hooks::GET_STATE => Ok(Value::Handle(Handle::Opaque(1))),
            hooks::GET_PIPELINE_STATE => Ok(Value::Handle(Handle::Opaque(2))),
            hooks::PIPELINE_START => {
                let count = args[1].as_int().unwrap_or(0) as usize;
                let table = args[2].as_handle().cloned().unwrap_or(Handle::Null);
                self.stage_names = memory
                    .read(&table, count)?
                    .iter()
                    .map(|v| v.as_str().unwrap_or_default().to_owned())
                    .collect();
                Ok(Value::Int(self.start_token.into()))
            }
            name if hooks::ALL.contains(&name) => Ok(Value::Int(0)),
            _ => Err(ExecErrorKind::UnknownExtern(name.to_owned()).into()),
        }
    }
}

impl RecordingHooks {
    fn names(&self) -> Vec<&str> {
        self.calls.iter().map(|(name, _)| name.as_str()).collect()
    }
}

#[test]
fn test_instrumented_pipeline_runs() {
    let u8_ = Type::uint(8);
    let body = stage(
        "f",
        u8_,
        vec![Expr::var(Type::int(32), "n")],
        fill("f", u8_, 4),
        read_first("f", u8_, "out"),
    );
    let result = inject_profiling(&body, "demo", &host());

    let mut hooks_impl = RecordingHooks::default();
    let mut interpreter = Interpreter::new(&mut hooks_impl);
    interpreter.bind("n", Value::Int(4));
    interpreter
        .memory_mut()
        .allocate("out", tessera_ir::eval::Buffer::zeroed(u8_, 1));
    interpreter.run(&result.stmt).unwrap();
    assert_eq!(interpreter.memory().load("out", 0).unwrap(), Value::Int(0));
    drop(interpreter);

    assert_eq!(hooks_impl.stage_names, ["overhead", "f"]);
    assert_eq!(
        hooks_impl.names(),
        [
            hooks::GET_STATE,
            hooks::GET_PIPELINE_STATE,
            hooks::PIPELINE_START,
            hooks::MEMORY_ALLOCATE,
            hooks::SET_CURRENT_STAGE,
            hooks::SET_CURRENT_STAGE,
            hooks::MEMORY_FREE,
            hooks::PIPELINE_END,
        ]
    );
    let (_, allocate_args) = &hooks_impl.calls[3];
    assert_eq!(allocate_args[1], Value::Int(1));
    assert_eq!(allocate_args[2], Value::Int(4));
}

#[test]
fn test_failed_start_aborts_with_token() {
    let u8_ = Type::uint(8);
    let body = stage("f", u8_, vec![Expr::i32(4)], fill("f", u8_, 4), Stmt::no_op());
    let result = inject_profiling(&body, "demo", &host());

    let mut hooks_impl = RecordingHooks {
        start_token: -7,
        ..Default::default()
    };
    let mut interpreter = Interpreter::new(&mut hooks_impl);
    let err = interpreter.run(&result.stmt).unwrap_err();
    match err.kind() {
        ExecErrorKind::AssertionFailed { code, message } => {
            assert_eq!(*code, -7);
            assert_eq!(message.as_var(), Some(hooks::TOKEN_VAR));
        }
        other => panic!("unexpected error {other}"),
    }
    drop(interpreter);
    assert!(!hooks_impl.names().contains(&hooks::SET_CURRENT_STAGE));
}
