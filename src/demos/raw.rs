//! `raw_linear_ro_split_interleaved`: an interleaved 8-bit, 4-channel image
//! doubled tile by tile.
//!
//! The rows are split in two halves processed by a parallel loop. Each half
//! is tiled 256x128 and every tile is copied in by DMA, then doubled into the
//! output.

use tessera_ir::{DeviceApi, Expr, ForKind, Stmt, Type};

use super::{Demo, PlaneSpec, height, int, nest, tile_stage, width};

const TILE_W: i32 = 256;
const TILE_H: i32 = 128;
const CHANNELS: i32 = 4;
/// The rows are split in this many parts.
const SPLIT: i32 = 2;

const PIXEL: Type = Type::uint(8);

fn image_len(width: i64, height: i64) -> i64 {
    width * height * CHANNELS as i64
}

pub(super) const DEMO: Demo = Demo {
    name: "raw_linear_ro_split_interleaved",
    description: "4-channel interleaved image doubled in 256x128 DMA tiles, rows split across a parallel loop",
    default_size: (512, 256),
    granularity: (TILE_W as i64, (SPLIT * TILE_H) as i64),
    inputs: &[PlaneSpec {
        name: "input",
        ty: PIXEL,
        len: image_len,
    }],
    outputs: &[PlaneSpec {
        name: "output",
        ty: PIXEL,
        len: image_len,
    }],
    build,
};

fn build() -> Stmt {
    let half = height() / Expr::i32(SPLIT);
    let (x, y, c) = (int("x"), int("y"), int("c"));
    let x_abs = int("tx") * Expr::i32(TILE_W) + x.clone();
    let y_abs = int("yo") * half.clone() + int("ty") * Expr::i32(TILE_H) + y.clone();

    let channels = Expr::i32(CHANNELS);
    let image = c.clone() + channels.clone() * (x_abs + width() * y_abs);
    let tile = c + channels * (x + Expr::i32(TILE_W) * y);
    let loops = [("y", TILE_H), ("x", TILE_W), ("c", CHANNELS)];

    let copy_in = nest(
        &loops,
        Stmt::store("copy", Expr::load(PIXEL, "input", image.clone()), tile.clone()),
    );
    let doubled = Expr::load(PIXEL, "copy", tile) * Expr::int(PIXEL, 2);
    let compute = nest(&loops, Stmt::store("output", doubled, image));

    let per_tile = tile_stage("copy", PIXEL, &[CHANNELS, TILE_W, TILE_H], copy_in, compute);
    let tiles = Stmt::for_loop(
        "tx",
        Expr::i32(0),
        width() / Expr::i32(TILE_W),
        ForKind::Serial,
        DeviceApi::HexagonDma,
        per_tile,
    );
    let rows = Stmt::serial("ty", Expr::i32(0), half / Expr::i32(TILE_H), tiles);
    let halves = Stmt::for_loop(
        "yo",
        Expr::i32(0),
        Expr::i32(SPLIT),
        ForKind::Parallel,
        DeviceApi::None,
        rows,
    );
    Stmt::producer_consumer("output", halves, None, Stmt::no_op())
}
