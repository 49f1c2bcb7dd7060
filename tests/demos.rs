//! Demo pipelines through the passes and the simulated profiler runtime.
//!
//! Note: These tests use serial_test because the profiler state is process-wide

use std::io::Write;

use serial_test::serial;
use tempfile::NamedTempFile;
use tessera::demos::{self, Demo};
use tessera::invoke::{Invocation, InvocationError, expected_output, invoke};
use tessera_ir::walk::count_extern_calls;
use tessera_passes::profiling::hooks;
use tessera_passes::{Instrumented, PipelineOptions, Target, run_pipeline};

fn demo(name: &str) -> &'static Demo {
    demos::find(name).unwrap()
}

fn instrument(demo: &Demo, target: &Target) -> Instrumented {
    let mut options = PipelineOptions::new(demo.name);
    options.lower_intrinsics = true;
    options.profile = true;
    let output = run_pipeline(&demo.build(), &options, target);
    let passes: Vec<_> = output.passes.iter().map(|p| (p.pass, p.unchanged)).collect();
    assert_eq!(
        passes,
        [
            ("raise", true),
            ("lower_intrinsics", true),
            ("inject_profiling", false)
        ]
    );
    output.instrumented.unwrap()
}

fn assert_outputs_doubled(demo: &Demo, invocation: &Invocation) {
    for (input, output) in demo.inputs.iter().zip(demo.outputs) {
        let expected = expected_output(input, invocation.width, invocation.height);
        assert_eq!(invocation.outputs[output.name], expected, "{}", output.name);
    }
}

#[test]
#[serial]
fn test_p010_instrumentation() {
    let demo = demo("p010_linear_rw_fold");
    let result = instrument(demo, &Target::host());

    assert!(result.diagnostics.is_empty());
    assert_eq!(
        result.stages.names(),
        ["overhead", "output_y", "input_copy_y", "output_uv", "input_copy_uv"]
    );
    let id = |name: &str| result.stages.get(name).unwrap();
    assert_eq!(result.ledger.peak_bytes(id("input_copy_y")), Some(8192));
    assert_eq!(result.ledger.peak_bytes(id("input_copy_uv")), Some(16384));
    // Only the two compute-root regions are announced; the tile loops run on
    // the DMA engine and are not instrumented.
    assert_eq!(count_extern_calls(&result.stmt, hooks::SET_CURRENT_STAGE), 4);
    assert_eq!(count_extern_calls(&result.stmt, hooks::MEMORY_ALLOCATE), 0);
}

#[test]
#[serial]
fn test_p010_runs_under_profiler() {
    tessera_runtime::reset();
    let demo = demo("p010_linear_rw_fold");
    let result = instrument(demo, &Target::host());
    let (width, height) = demo.default_size;
    let invocation = invoke(demo, &result.stmt, width, height).unwrap();
    assert_outputs_doubled(demo, &invocation);

    let report = tessera_runtime::report(demo.name).unwrap();
    assert_eq!(report.runs, 1);
    assert_eq!(report.ended, 1);
    assert_eq!(report.stack_peak, 16384);
    assert_eq!(report.stack_peak_of("input_copy_y"), Some(8192));
    assert_eq!(report.stack_peak_of("input_copy_uv"), Some(16384));
    assert_eq!(report.activations_of("output_y"), Some(1));
    assert_eq!(report.activations_of("output_uv"), Some(1));
    assert_eq!(report.heap_allocations, 0);
}

#[test]
#[serial]
fn test_small_stack_threshold_moves_tiles_to_heap() {
    tessera_runtime::reset();
    let mut config = NamedTempFile::new().unwrap();
    writeln!(
        config,
        r#"{{ "triple": "x86_64-unknown-linux-gnu", "stack_threshold": 8192 }}"#
    )
    .unwrap();
    let target = Target::load(config.path()).unwrap();

    let demo = demo("p010_linear_rw_fold");
    let result = instrument(demo, &target);
    let id = |name: &str| result.stages.get(name).unwrap();
    assert_eq!(result.ledger.peak_bytes(id("input_copy_y")), Some(8192));
    assert_eq!(result.ledger.peak_bytes(id("input_copy_uv")), Some(0));
    assert_eq!(count_extern_calls(&result.stmt, hooks::MEMORY_ALLOCATE), 1);
    assert_eq!(count_extern_calls(&result.stmt, hooks::MEMORY_FREE), 1);

    let invocation = invoke(demo, &result.stmt, 128, 64).unwrap();
    assert_outputs_doubled(demo, &invocation);
    let report = tessera_runtime::report(demo.name).unwrap();
    // One row of chroma tiles at 128x64.
    assert_eq!(report.heap_allocations, 1);
    assert_eq!(report.heap_peak, 16384);
    assert_eq!(report.heap_current, 0);
    assert_eq!(report.stack_peak, 8192);
}

#[test]
#[serial]
fn test_split_interleaved_runs_under_profiler() {
    tessera_runtime::reset();
    let demo = demo("raw_linear_ro_split_interleaved");
    let result = instrument(demo, &Target::host());

    // Everything below the parallel loop is left alone.
    assert_eq!(result.stages.names(), ["overhead", "output"]);
    assert_eq!(count_extern_calls(&result.stmt, hooks::SET_CURRENT_STAGE), 2);
    assert_eq!(count_extern_calls(&result.stmt, hooks::STACK_PEAK_UPDATE), 0);

    let invocation = invoke(demo, &result.stmt, 256, 256).unwrap();
    assert_eq!((invocation.width, invocation.height), (256, 256));
    assert_outputs_doubled(demo, &invocation);

    let report = tessera_runtime::report(demo.name).unwrap();
    assert_eq!(report.ended, 1);
    assert_eq!(report.activations_of("output"), Some(1));
    assert_eq!(report.stack_peak, 0);
}

#[test]
#[serial]
fn test_profiler_start_failure_is_reported() {
    tessera_runtime::reset();
    tessera_runtime::set_start_failure(Some(-12));
    let demo = demo("p010_linear_rw_fold");
    let result = instrument(demo, &Target::host());
    let error = invoke(demo, &result.stmt, 128, 64).unwrap_err();
    tessera_runtime::reset();

    assert!(matches!(error, InvocationError::ProfilerInitFailure(-12)));
    assert_eq!(error.to_string(), "profiler failed to start pipeline (code -12)");
}

#[test]
#[serial]
fn test_uninstrumented_demo_runs_without_profiler_calls() {
    tessera_runtime::reset();
    let demo = demo("p010_linear_rw_fold");
    let invocation = invoke(demo, &demo.build(), 100, 10).unwrap();
    assert_eq!((invocation.width, invocation.height), (128, 64));
    assert_outputs_doubled(demo, &invocation);
    assert!(tessera_runtime::report(demo.name).is_none());
}
