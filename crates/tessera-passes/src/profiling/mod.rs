//! Profiling instrumentation.
//!
//! [`inject_profiling`] threads calls into the profiler runtime through a
//! pipeline body:
//!
//! - each produce region announces its stage on entry, and each consume region
//!   announces the enclosing stage again;
//! - heap allocations and frees are reported with their byte size;
//! - constant stack allocations are summed per stage at compile time, and the
//!   resulting peaks are handed to the runtime once per invocation.
//!
//! The bookkeeping is plain stores into profiler state, so loops that run on
//! another device or on worker threads are never entered.
//!
//! The instrumented body is wrapped as follows, outermost first:
//!
//! ```text
//! allocate profiling_stage_names[handle * n]
//! profiling_stage_names[i] = "<name of stage i>"
//! let profiler_state = get_state()
//! let profiler_pipeline_state = get_pipeline_state("<pipeline>")
//! let profiler_token = pipeline_start("<pipeline>", n, &profiling_stage_names[0])
//! assert((profiler_token >= 0), profiler_token)
//! register_destructor("pipeline_end", profiler_state)
//! allocate profiling_stage_peaks[i64 * n]      (only with stack usage)
//! profiling_stage_peaks[i] = <peak of stage i>
//! stack_peak_update(profiler_pipeline_state, <max peak>, &profiling_stage_peaks[0])
//! <body>
//! ```

pub mod hooks;
mod ledger;
mod stages;

#[cfg(test)]
mod tests;

pub use ledger::StackLedger;
pub use stages::{OVERHEAD_STAGE, StageTable};

use tessera_ir::expr::{cast, select};
use tessera_ir::mutator::{walk_allocate, walk_for};
use tessera_ir::stmt::{Allocate, For, Free, ProducerConsumer};
use tessera_ir::{Expr, Mutator, Scope, Stmt, Type, simplify};
use tracing::{debug, warn};

use crate::diagnostic::{Diagnostic, DiagnosticKind, PassPhase};
use crate::target::Target;

/// Largest allocation, in bytes, whose size is accounted.
const MAX_ACCOUNTED_BYTES: i128 = i32::MAX as i128;

/// Result of [`inject_profiling`].
#[derive(Clone, Debug)]
pub struct Instrumented {
    pub stmt: Stmt,
    /// Stage names by id, as handed to `pipeline_start`.
    pub stages: StageTable,
    /// Stack usage per stage after the whole body was traversed.
    pub ledger: StackLedger,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageClass {
    Stack,
    Heap,
}

/// How an allocation was accounted when it was entered.
#[derive(Clone, Debug)]
pub struct AllocationRecord {
    pub stage: i32,
    pub class: StorageClass,
    /// Byte size as an `i64` expression. Zero means not accounted.
    pub size: Expr,
}

/// Instrument `stmt`, the body of pipeline `pipeline_name`, for profiling.
pub fn inject_profiling(stmt: &Stmt, pipeline_name: &str, target: &Target) -> Instrumented {
    let mut injector = ProfilingInjector::new(target);
    let body = injector.mutate_stmt(stmt);
    let ProfilingInjector {
        stages,
        ledger,
        diagnostics,
        ..
    } = injector;

    if body.same_as(stmt) && stages.is_empty() {
        debug!(pipeline = pipeline_name, "nothing to profile");
        return Instrumented {
            stmt: stmt.clone(),
            stages,
            ledger,
            diagnostics,
        };
    }

    let stmt = wrap_pipeline(body, pipeline_name, &stages, &ledger);
    Instrumented {
        stmt,
        stages,
        ledger,
        diagnostics,
    }
}

// =============================================================================
// Traversal
// =============================================================================

struct ProfilingInjector<'t> {
    target: &'t Target,
    stages: StageTable,
    /// Ids of the stages whose produce region encloses the current node.
    active: Vec<i32>,
    /// Records of the allocations enclosing the current node. A freed
    /// allocation keeps an empty slot until its Allocate node is left.
    allocations: Scope<Option<AllocationRecord>>,
    ledger: StackLedger,
    diagnostics: Vec<Diagnostic>,
}

impl<'t> ProfilingInjector<'t> {
    fn new(target: &'t Target) -> Self {
        ProfilingInjector {
            target,
            stages: StageTable::new(),
            active: vec![0],
            allocations: Scope::new(),
            ledger: StackLedger::default(),
            diagnostics: Vec::new(),
        }
    }

    fn current_stage(&self) -> i32 {
        self.active.last().copied().unwrap_or(0)
    }

    fn classify(&mut self, op: &Allocate) -> (StorageClass, Expr) {
        let elem_bytes = i128::from(op.ty.bytes());
        let constant: Option<Vec<i128>> = op.extents.iter().map(Expr::as_int).collect();
        if let Some(extents) = constant {
            let bytes = extents
                .iter()
                .try_fold(elem_bytes, |acc, extent| acc.checked_mul(*extent));
            match bytes {
                Some(bytes) if bytes <= 0 => {}
                Some(bytes) if bytes <= MAX_ACCOUNTED_BYTES => {
                    let bytes = bytes as i64;
                    if self.target.is_allocation_on_stack(bytes) {
                        return (StorageClass::Stack, Expr::i64(bytes));
                    }
                }
                _ => {
                    self.size_overflowed(op, &extents);
                    return (StorageClass::Stack, Expr::i64(0));
                }
            }
        }

        let elements = op
            .extents
            .iter()
            .map(|extent| cast(Type::int(64), extent.clone()))
            .reduce(|acc, extent| acc * extent)
            .unwrap_or_else(|| Expr::i64(1));
        let bytes = elements * Expr::i64(elem_bytes as i64);
        let size = simplify(&select(op.condition.clone(), bytes, Expr::i64(0)));
        (StorageClass::Heap, size)
    }

    fn size_overflowed(&mut self, op: &Allocate, extents: &[i128]) {
        let shape = extents
            .iter()
            .map(i128::to_string)
            .collect::<Vec<_>>()
            .join(" x ");
        warn!(allocation = %op.name, %shape, "allocation size overflows; not accounted");
        self.diagnostics.push(Diagnostic::warning(
            PassPhase::Profiling,
            DiagnosticKind::SizeOverflowIgnored {
                allocation: op.name.clone(),
            },
            format!(
                "size of `{}` ({shape} elements of {}) overflows and is not accounted",
                op.name, op.ty
            ),
        ));
    }
}

impl Mutator for ProfilingInjector<'_> {
    fn visit_allocate(&mut self, stmt: &Stmt, op: &Allocate) -> Stmt {
        let stage = self.stages.id_of(&op.name);
        let (class, size) = self.classify(op);
        let accounted = !size.is_zero();
        debug!(allocation = %op.name, stage, ?class, %size, "allocate");

        let mark = self.allocations.mark();
        self.allocations.push(
            op.name.clone(),
            Some(AllocationRecord {
                stage,
                class,
                size: size.clone(),
            }),
        );
        if accounted && class == StorageClass::Stack {
            self.ledger.allocate(stage, &size);
        }

        let rebuilt = walk_allocate(self, stmt, op);

        for (name, record) in self.allocations.unwind_to(mark) {
            let Some(record) = record else { continue };
            debug!(allocation = %name, "allocation not freed inside its body");
            if record.class == StorageClass::Stack && !record.size.is_zero() {
                self.ledger.free(record.stage, &record.size);
            }
        }

        if accounted && class == StorageClass::Heap {
            let report = Stmt::evaluate(hooks::memory_allocate(stage, size));
            return Stmt::block([report, rebuilt]);
        }
        rebuilt
    }

    fn visit_free(&mut self, stmt: &Stmt, op: &Free) -> Stmt {
        let Some(record) = self.allocations.get_mut(&op.name).and_then(Option::take) else {
            return stmt.clone();
        };
        if record.size.is_zero() {
            return stmt.clone();
        }
        match record.class {
            StorageClass::Heap => {
                let report = Stmt::evaluate(hooks::memory_free(record.stage, record.size));
                Stmt::block([report, stmt.clone()])
            }
            StorageClass::Stack => {
                self.ledger.free(record.stage, &record.size);
                stmt.clone()
            }
        }
    }

    fn visit_producer_consumer(&mut self, _stmt: &Stmt, op: &ProducerConsumer) -> Stmt {
        let stage = self.stages.id_of(&op.name);
        debug!(stage_name = %op.name, stage, "stage region");

        self.active.push(stage);
        let produce = self.mutate_stmt(&op.produce);
        let update = op.update.as_ref().map(|u| self.mutate_stmt(u));
        self.active.pop();
        let consume = self.mutate_stmt(&op.consume);

        let enter = Stmt::evaluate(hooks::set_current_stage(stage));
        let restore = Stmt::evaluate(hooks::set_current_stage(self.current_stage()));
        Stmt::producer_consumer(
            op.name.clone(),
            Stmt::block([enter, produce]),
            update,
            Stmt::block([restore, consume]),
        )
    }

    fn visit_for(&mut self, stmt: &Stmt, op: &For) -> Stmt {
        if !op.runs_on_entering_thread() {
            debug!(var = %op.var, kind = op.kind.name(), device = op.device.name(), "not entering loop");
            return stmt.clone();
        }
        walk_for(self, stmt, op)
    }
}

// =============================================================================
// Pipeline wrapping
// =============================================================================

fn wrap_pipeline(body: Stmt, pipeline_name: &str, stages: &StageTable, ledger: &StackLedger) -> Stmt {
    let stage_count = stages.len() as i32;
    let max_peak = ledger.max_peak();

    let mut inner = body;
    if !max_peak.is_zero() {
        let peaks = Expr::address_of(hooks::STAGE_PEAKS_BUFFER, Type::int(64), Expr::i32(0));
        let mut stmts: Vec<Stmt> = (0..stage_count)
            .map(|id| Stmt::store(hooks::STAGE_PEAKS_BUFFER, ledger.peak(id), Expr::i32(id)))
            .collect();
        stmts.push(Stmt::evaluate(hooks::stack_peak_update(max_peak, peaks)));
        stmts.push(inner);
        stmts.push(Stmt::free(hooks::STAGE_PEAKS_BUFFER));
        inner = Stmt::allocate(
            hooks::STAGE_PEAKS_BUFFER,
            Type::int(64),
            vec![Expr::i32(stage_count)],
            Expr::bool(true),
            Stmt::block(stmts),
        );
    }

    let token = hooks::token();
    let started = Stmt::block([
        Stmt::assert(token.clone().ge(Expr::i32(0)), token),
        Stmt::evaluate(hooks::register_pipeline_end()),
        inner,
    ]);
    let names = Expr::address_of(hooks::STAGE_NAMES_BUFFER, Type::handle(), Expr::i32(0));
    let started = Stmt::let_stmt(
        hooks::TOKEN_VAR,
        hooks::pipeline_start(pipeline_name, stage_count, names),
        started,
    );
    let bound = Stmt::let_stmt(
        hooks::STATE_VAR,
        hooks::get_state(),
        Stmt::let_stmt(
            hooks::PIPELINE_STATE_VAR,
            hooks::get_pipeline_state(pipeline_name),
            started,
        ),
    );

    let mut stmts: Vec<Stmt> = stages
        .names()
        .iter()
        .zip(0..)
        .map(|(name, id)| Stmt::store(hooks::STAGE_NAMES_BUFFER, Expr::string(name.clone()), Expr::i32(id)))
        .collect();
    stmts.push(bound);
    stmts.push(Stmt::free(hooks::STAGE_NAMES_BUFFER));
    Stmt::allocate(
        hooks::STAGE_NAMES_BUFFER,
        Type::handle(),
        vec![Expr::i32(stage_count)],
        Expr::bool(true),
        Stmt::block(stmts),
    )
}
