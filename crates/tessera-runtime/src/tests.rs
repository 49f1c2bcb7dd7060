//! Tests for the simulated profiler runtime
//!
//! Note: These tests use serial_test because the profiler state is process-wide

use serial_test::serial;
use tessera_ir::eval::{Buffer, ExecErrorKind, ExecResult, ExternHandler, Interpreter, Memory, Value};
use tessera_ir::expr::cast;
use tessera_ir::{Expr, Stmt, Type};
use tessera_passes::{Target, inject_profiling};

use crate::{SimulatedProfiler, report, reset, set_start_failure};

fn host() -> Target {
    Target::parse("x86_64-unknown-linux-gnu").unwrap()
}

/// `allocate name[u8 * extent] { produce name { name[x] = x } consume name { out[0] = name[0] } free name }`
fn stage(name: &str, extent: Expr) -> Stmt {
    let u8_ = Type::uint(8);
    let x = Expr::var(Type::int(32), "x");
    let produce = Stmt::serial(
        "x",
        Expr::i32(0),
        Expr::i32(4),
        Stmt::store(name, cast(u8_, x.clone()), x),
    );
    let consume = Stmt::store("out", Expr::load(u8_, name, Expr::i32(0)), Expr::i32(0));
    Stmt::allocate(
        name,
        u8_,
        vec![extent],
        Expr::bool(true),
        Stmt::block([
            Stmt::producer_consumer(name, produce, None, consume),
            Stmt::free(name),
        ]),
    )
}

fn run(stmt: &Stmt, handler: &mut dyn ExternHandler, n: i128) -> ExecResult<()> {
    let mut interpreter = Interpreter::new(handler);
    interpreter.bind("n", Value::Int(n));
    interpreter
        .memory_mut()
        .allocate("out", Buffer::zeroed(Type::uint(8), 1));
    interpreter.run(stmt)
}

#[test]
#[serial]
fn test_stack_pipeline_reports_peaks() {
    reset();
    let body = Stmt::block([stage("f", Expr::i32(16)), stage("g", Expr::i32(8))]);
    let instrumented = inject_profiling(&body, "stack_demo", &host());

    let mut profiler = SimulatedProfiler::new();
    run(&instrumented.stmt, &mut profiler, 0).unwrap();
    assert_eq!(profiler.token(), None);

    let report = report("stack_demo").unwrap();
    assert_eq!(report.stage_names, ["overhead", "f", "g"]);
    assert_eq!(report.runs, 1);
    assert_eq!(report.ended, 1);
    assert_eq!(report.stack_peak, 16);
    assert_eq!(report.stack_peak_of("f"), Some(16));
    assert_eq!(report.stack_peak_of("g"), Some(8));
    assert_eq!(report.activations_of("f"), Some(1));
    assert_eq!(report.activations_of("g"), Some(1));
    // Each consume region re-announces the enclosing stage.
    assert_eq!(report.activations_of("overhead"), Some(2));
    assert_eq!(report.heap_allocations, 0);
}

#[test]
#[serial]
fn test_heap_pipeline_balances() {
    reset();
    let body = stage("f", Expr::var(Type::int(32), "n"));
    let instrumented = inject_profiling(&body, "heap_demo", &host());

    let mut profiler = SimulatedProfiler::new();
    run(&instrumented.stmt, &mut profiler, 4).unwrap();
    let mut profiler = SimulatedProfiler::new();
    run(&instrumented.stmt, &mut profiler, 100).unwrap();

    let report = report("heap_demo").unwrap();
    assert_eq!(report.runs, 2);
    assert_eq!(report.ended, 2);
    assert_eq!(report.heap_allocations, 2);
    assert_eq!(report.heap_peak, 100);
    assert_eq!(report.heap_current, 0);
    assert_eq!(report.stack_peak, 0);
    assert_eq!(report.activations_of("f"), Some(2));
}

#[test]
#[serial]
fn test_start_failure_aborts_before_any_stage() {
    reset();
    set_start_failure(Some(-3));
    let body = stage("f", Expr::i32(4));
    let instrumented = inject_profiling(&body, "failing", &host());

    let mut profiler = SimulatedProfiler::new();
    let err = run(&instrumented.stmt, &mut profiler, 0).unwrap_err();
    assert!(matches!(err.kind(), ExecErrorKind::AssertionFailed { code: -3, .. }));
    assert_eq!(profiler.token(), None);

    let report = report("failing").unwrap();
    assert_eq!(report.runs, 0);
    assert_eq!(report.ended, 0);

    set_start_failure(None);
    let mut profiler = SimulatedProfiler::new();
    run(&instrumented.stmt, &mut profiler, 0).unwrap();
    assert_eq!(crate::report("failing").unwrap().ended, 1);
}

#[test]
#[serial]
fn test_non_negative_failure_code_is_ignored() {
    reset();
    set_start_failure(Some(5));
    let instrumented = inject_profiling(&stage("f", Expr::i32(4)), "ignored", &host());
    let mut profiler = SimulatedProfiler::new();
    run(&instrumented.stmt, &mut profiler, 0).unwrap();
    assert_eq!(report("ignored").unwrap().runs, 1);
}

struct Observer {
    seen: Vec<Value>,
}

impl ExternHandler for Observer {
    fn call_extern(&mut self, name: &str, args: &[Value], _memory: &Memory) -> ExecResult<Value> {
        if name != "observe" {
            return Err(ExecErrorKind::UnknownExtern(name.to_owned()).into());
        }
        self.seen.extend(args.iter().cloned());
        Ok(Value::Int(0))
    }
}

#[test]
#[serial]
fn test_other_externs_reach_fallback() {
    reset();
    let observe = Stmt::evaluate(Expr::call_extern(
        Type::int(32),
        "observe",
        [Expr::load(Type::uint(8), "out", Expr::i32(0))],
    ));
    let body = Stmt::block([stage("f", Expr::i32(4)), observe]);
    let instrumented = inject_profiling(&body, "observed", &host());

    let mut observer = Observer { seen: Vec::new() };
    let mut profiler = SimulatedProfiler::with_fallback(&mut observer);
    run(&instrumented.stmt, &mut profiler, 0).unwrap();
    drop(profiler);
    assert_eq!(observer.seen, [Value::Int(0)]);

    let unknown = Stmt::evaluate(Expr::call_extern(Type::int(32), "missing", []));
    let err = run(&unknown, &mut SimulatedProfiler::new(), 0).unwrap_err();
    assert!(matches!(err.kind(), ExecErrorKind::UnknownExtern(name) if name == "missing"));
}

#[test]
#[serial]
fn test_report_display() {
    reset();
    let instrumented = inject_profiling(&stage("blur", Expr::i32(32)), "display", &host());
    run(&instrumented.stmt, &mut SimulatedProfiler::new(), 0).unwrap();
    let text = report("display").unwrap().to_string();
    assert!(text.starts_with("pipeline display: 1 run(s), 1 ended\n"));
    assert!(text.contains("stack peak: 32 B"));
    assert!(text.lines().any(|l| l.trim_start().starts_with("blur") && l.trim_end().ends_with("32")));
}

#[test]
#[serial]
fn test_reset_forgets_pipelines() {
    reset();
    let instrumented = inject_profiling(&stage("f", Expr::i32(4)), "forgotten", &host());
    run(&instrumented.stmt, &mut SimulatedProfiler::new(), 0).unwrap();
    assert!(report("forgotten").is_some());
    reset();
    assert!(report("forgotten").is_none());
}
