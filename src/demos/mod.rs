//! Demo pipelines.
//!
//! Each demo is the statement the scheduling front-end hands to the middle
//! end for a DMA tile pipeline: the tile loops are already lowered, tile
//! buffers are explicit allocations, and the loop that moves tiles runs on the
//! DMA engine. Image extents stay symbolic (`width`, `height`) and are bound
//! when the pipeline is invoked.
//!
//! Every demo computes `output = input * 2` element-wise over its planes.

mod p010;
mod raw;

use tessera_ir::{Expr, Stmt, Type};

/// A plane the caller provides (input) or receives (output).
#[derive(Clone, Debug)]
pub struct PlaneSpec {
    pub name: &'static str,
    pub ty: Type,
    /// Element count for the given image width and height.
    pub len: fn(i64, i64) -> i64,
}

#[derive(Clone, Debug)]
pub struct Demo {
    pub name: &'static str,
    pub description: &'static str,
    /// Image size used when none is given.
    pub default_size: (i64, i64),
    /// Width and height are rounded up to multiples of these.
    pub granularity: (i64, i64),
    pub inputs: &'static [PlaneSpec],
    /// Outputs, in the same order as the inputs they are computed from.
    pub outputs: &'static [PlaneSpec],
    build: fn() -> Stmt,
}

impl Demo {
    /// The lowered pipeline body.
    pub fn build(&self) -> Stmt {
        (self.build)()
    }

    /// Round `(width, height)` up to the tile granularity.
    pub fn round_size(&self, width: i64, height: i64) -> (i64, i64) {
        let round = |v: i64, m: i64| (v.max(1) + m - 1) / m * m;
        (
            round(width, self.granularity.0),
            round(height, self.granularity.1),
        )
    }
}

pub const DEMOS: &[Demo] = &[p010::DEMO, raw::DEMO];

pub fn find(name: &str) -> Option<&'static Demo> {
    DEMOS.iter().find(|demo| demo.name == name)
}

// =============================================================================
// Builders shared by the demos
// =============================================================================

fn int(name: &str) -> Expr {
    Expr::var(Type::int(32), name)
}

fn width() -> Expr {
    int("width")
}

fn height() -> Expr {
    int("height")
}

/// Nest of serial loops, outermost first, each over `0..extent`.
fn nest(loops: &[(&str, i32)], body: Stmt) -> Stmt {
    loops.iter().rev().fold(body, |body, (var, extent)| {
        Stmt::serial(*var, Expr::i32(0), Expr::i32(*extent), body)
    })
}

/// `allocate name[ty * extents] { produce name { produce } consume name { consume } free name }`
fn tile_stage(name: &str, ty: Type, extents: &[i32], produce: Stmt, consume: Stmt) -> Stmt {
    Stmt::allocate(
        name,
        ty,
        extents.iter().map(|e| Expr::i32(*e)).collect(),
        Expr::bool(true),
        Stmt::block([
            Stmt::producer_consumer(name, produce, None, consume),
            Stmt::free(name),
        ]),
    )
}
