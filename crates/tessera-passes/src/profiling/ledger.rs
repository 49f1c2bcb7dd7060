use std::collections::BTreeMap;

use tessera_ir::expr::max;
use tessera_ir::{Expr, simplify};

/// Symbolic stack usage per stage id, in bytes.
///
/// `current` follows allocations and frees in traversal order; `peak` is the
/// running maximum of `current`. Both are kept simplified, so constant sizes
/// stay constants.
#[derive(Clone, Debug, Default)]
pub struct StackLedger {
    current: BTreeMap<i32, Expr>,
    peak: BTreeMap<i32, Expr>,
}

fn zero() -> Expr {
    Expr::i64(0)
}

impl StackLedger {
    pub fn current(&self, stage: i32) -> Expr {
        self.current.get(&stage).cloned().unwrap_or_else(zero)
    }

    pub fn peak(&self, stage: i32) -> Expr {
        self.peak.get(&stage).cloned().unwrap_or_else(zero)
    }

    pub fn allocate(&mut self, stage: i32, size: &Expr) {
        let current = simplify(&(self.current(stage) + size.clone()));
        let peak = simplify(&max(self.peak(stage), current.clone()));
        self.current.insert(stage, current);
        self.peak.insert(stage, peak);
    }

    pub fn free(&mut self, stage: i32, size: &Expr) {
        let current = simplify(&(self.current(stage) - size.clone()));
        self.current.insert(stage, current);
    }

    /// Largest peak across all stages.
    pub fn max_peak(&self) -> Expr {
        let total = self
            .peak
            .values()
            .fold(zero(), |acc, peak| max(acc, peak.clone()));
        simplify(&total)
    }

    pub fn peak_bytes(&self, stage: i32) -> Option<i64> {
        constant_bytes(&self.peak(stage))
    }

    pub fn current_bytes(&self, stage: i32) -> Option<i64> {
        constant_bytes(&self.current(stage))
    }
}

fn constant_bytes(e: &Expr) -> Option<i64> {
    e.as_int().and_then(|v| i64::try_from(v).ok())
}
