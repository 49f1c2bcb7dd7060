//! `p010_linear_rw_fold`: a P010 frame doubled tile by tile.
//!
//! The frame is a 16-bit luma plane and a half-resolution chroma plane with
//! the two chroma channels interleaved. Each plane is tiled 64x32. Per tile the
//! input is copied in, doubled into a work buffer, copied to an output tile and
//! written back. The input copy is stored once per row of tiles, folded to two
//! tiles along x, and the tile loop runs on the DMA engine.

use tessera_ir::{DeviceApi, Expr, ForKind, Stmt, Type};

use super::{Demo, PlaneSpec, height, int, nest, tile_stage, width};

const TILE_W: i32 = 64;
const TILE_H: i32 = 32;
/// Extent of the folded input copy along x.
const FOLD: i32 = TILE_W * 2;

const PIXEL: Type = Type::uint(16);

fn luma_len(width: i64, height: i64) -> i64 {
    width * height
}

fn chroma_len(width: i64, height: i64) -> i64 {
    (width / 2) * (height / 2) * 2
}

pub(super) const DEMO: Demo = Demo {
    name: "p010_linear_rw_fold",
    description: "P010 luma and chroma planes doubled in 64x32 DMA tiles, input copy folded to two tiles",
    default_size: (128, 64),
    // The chroma plane is tiled at half resolution.
    granularity: (2 * TILE_W as i64, 2 * TILE_H as i64),
    inputs: &[
        PlaneSpec {
            name: "input_y",
            ty: PIXEL,
            len: luma_len,
        },
        PlaneSpec {
            name: "input_uv",
            ty: PIXEL,
            len: chroma_len,
        },
    ],
    outputs: &[
        PlaneSpec {
            name: "output_y",
            ty: PIXEL,
            len: luma_len,
        },
        PlaneSpec {
            name: "output_uv",
            ty: PIXEL,
            len: chroma_len,
        },
    ],
    build,
};

fn build() -> Stmt {
    let two = Expr::i32(2);
    Stmt::block([
        plane("y", 1, width(), height()),
        plane("uv", 2, width() / two.clone(), height() / two),
    ])
}

/// Element index of pixel `(x, y)`, channel `c`, with channels innermost.
fn pixel(channels: i32, x: Expr, y: Expr, row_stride: Expr) -> Expr {
    let offset = x + row_stride * y;
    if channels == 1 {
        offset
    } else {
        int("c") + Expr::i32(channels) * offset
    }
}

fn plane(suffix: &str, channels: i32, plane_width: Expr, plane_height: Expr) -> Stmt {
    let input = format!("input_{suffix}");
    let input_copy = format!("input_copy_{suffix}");
    let work = format!("work_{suffix}");
    let output_copy = format!("output_copy_{suffix}");
    let output = format!("output_{suffix}");

    let (x, y) = (int("x"), int("y"));
    let x_abs = int("tx") * Expr::i32(TILE_W) + x.clone();
    let y_abs = int("ty") * Expr::i32(TILE_H) + y.clone();

    let image = pixel(channels, x_abs.clone(), y_abs, plane_width.clone());
    let folded = pixel(
        channels,
        x_abs % Expr::i32(FOLD),
        y.clone(),
        Expr::i32(FOLD),
    );
    let tile = pixel(channels, x, y, Expr::i32(TILE_W));

    let mut loops = vec![("y", TILE_H), ("x", TILE_W)];
    if channels > 1 {
        loops.push(("c", channels));
    }
    let tile_extents = [channels, TILE_W, TILE_H];

    let copy_in = nest(
        &loops,
        Stmt::store(&input_copy, Expr::load(PIXEL, &input, image.clone()), folded.clone()),
    );
    let doubled = Expr::load(PIXEL, &input_copy, folded) * Expr::int(PIXEL, 2);
    let compute = nest(&loops, Stmt::store(&work, doubled, tile.clone()));
    let copy_out = nest(
        &loops,
        Stmt::store(&output_copy, Expr::load(PIXEL, &work, tile.clone()), tile.clone()),
    );
    let write_back = nest(
        &loops,
        Stmt::store(&output, Expr::load(PIXEL, &output_copy, tile), image),
    );

    let output_copy_stage = tile_stage(&output_copy, PIXEL, &tile_extents, copy_out, write_back);
    let work_stage = tile_stage(&work, PIXEL, &tile_extents, compute, output_copy_stage);
    let per_tile = Stmt::producer_consumer(&input_copy, copy_in, None, work_stage);
    let tiles = Stmt::for_loop(
        "tx",
        Expr::i32(0),
        plane_width / Expr::i32(TILE_W),
        ForKind::Serial,
        DeviceApi::HexagonDma,
        per_tile,
    );
    let row = Stmt::allocate(
        &input_copy,
        PIXEL,
        vec![Expr::i32(channels), Expr::i32(FOLD), Expr::i32(TILE_H)],
        Expr::bool(true),
        Stmt::block([tiles, Stmt::free(&input_copy)]),
    );
    let rows = Stmt::serial("ty", Expr::i32(0), plane_height / Expr::i32(TILE_H), row);
    Stmt::producer_consumer(output, rows, None, Stmt::no_op())
}
