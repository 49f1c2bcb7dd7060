//! Common test utilities for integration tests.

use std::ops::ControlFlow;

use tessera_ir::eval::{Buffer, ExecResult, Interpreter, NoExterns, Value};
use tessera_ir::{IrWalk, Stmt, StmtKind, Type, WalkAction};

/// Every statement under `root` (itself included) matching `pred`, in pre-order.
#[allow(dead_code)]
pub fn find_stmts(root: &Stmt, pred: impl Fn(&Stmt) -> bool) -> Vec<Stmt> {
    let mut found = Vec::new();
    let _ = root.walk_stmts::<()>(|s| {
        if pred(s) {
            found.push(s.clone());
        }
        ControlFlow::Continue(WalkAction::Advance)
    });
    found
}

#[allow(dead_code)]
pub fn is_for(stmt: &Stmt) -> bool {
    matches!(stmt.kind(), StmtKind::For(_))
}

/// Run `stmt` without externs, with the given input buffers and zeroed output
/// buffers of `len` elements. Returns the output buffers' contents.
#[allow(dead_code)]
pub fn run_on_buffers(
    stmt: &Stmt,
    inputs: &[(&str, Type, Vec<i128>)],
    outputs: &[(&str, Type)],
    len: usize,
) -> ExecResult<Vec<Vec<i128>>> {
    let mut externs = NoExterns;
    let mut interpreter = Interpreter::new(&mut externs);
    for (name, ty, data) in inputs {
        let data = data.iter().map(|v| Value::Int(*v)).collect();
        interpreter
            .memory_mut()
            .allocate(*name, Buffer { ty: *ty, data });
    }
    for (name, ty) in outputs {
        interpreter.memory_mut().allocate(*name, Buffer::zeroed(*ty, len));
    }
    interpreter.run(stmt)?;
    Ok(outputs
        .iter()
        .map(|(name, _)| {
            interpreter
                .memory()
                .get(name)
                .map(|b| b.data.iter().filter_map(Value::as_int).collect())
                .unwrap_or_default()
        })
        .collect())
}
