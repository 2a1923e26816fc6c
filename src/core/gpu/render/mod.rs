// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Software rasterization
//!
//! VRAM-level operations (fill, upload, copy, CLUT refill) and the draw
//! dispatch tables. Draw commands select a concrete rasterization function
//! from their `{shading, texture, raw_texture, transparency}` flags; each
//! combination is monomorphized separately so the per-pixel loop carries no
//! runtime branching on the render state.

pub mod rasterizer;

use crate::core::gpu::commands::{
    DrawLineCommand, DrawPolygonCommand, DrawRectangleCommand, LineVertex, PolygonVertex,
    UpdateClutCommand,
};
use crate::core::gpu::{CommandParams, DrawingArea, Vram, VRAM_HEIGHT, VRAM_WIDTH};

/// Triangle rasterization entry point
pub type DrawTriangleFn = fn(
    &mut Vram,
    &DrawingArea,
    CommandParams,
    &DrawPolygonCommand,
    &PolygonVertex,
    &PolygonVertex,
    &PolygonVertex,
);

/// Rectangle rasterization entry point
pub type DrawRectangleFn = fn(&mut Vram, &DrawingArea, CommandParams, &DrawRectangleCommand);

/// Line rasterization entry point
pub type DrawLineFn =
    fn(&mut Vram, &DrawingArea, CommandParams, &DrawLineCommand, &LineVertex, &LineVertex);

/// Select the triangle function for a flag combination
pub fn draw_triangle_function(
    shading: bool,
    texture: bool,
    raw_texture: bool,
    transparency: bool,
) -> DrawTriangleFn {
    use rasterizer::draw_triangle;
    match (shading, texture, raw_texture, transparency) {
        (false, false, false, false) => draw_triangle::<false, false, false, false>,
        (false, false, false, true) => draw_triangle::<false, false, false, true>,
        (false, false, true, false) => draw_triangle::<false, false, true, false>,
        (false, false, true, true) => draw_triangle::<false, false, true, true>,
        (false, true, false, false) => draw_triangle::<false, true, false, false>,
        (false, true, false, true) => draw_triangle::<false, true, false, true>,
        (false, true, true, false) => draw_triangle::<false, true, true, false>,
        (false, true, true, true) => draw_triangle::<false, true, true, true>,
        (true, false, false, false) => draw_triangle::<true, false, false, false>,
        (true, false, false, true) => draw_triangle::<true, false, false, true>,
        (true, false, true, false) => draw_triangle::<true, false, true, false>,
        (true, false, true, true) => draw_triangle::<true, false, true, true>,
        (true, true, false, false) => draw_triangle::<true, true, false, false>,
        (true, true, false, true) => draw_triangle::<true, true, false, true>,
        (true, true, true, false) => draw_triangle::<true, true, true, false>,
        (true, true, true, true) => draw_triangle::<true, true, true, true>,
    }
}

/// Select the rectangle function for a flag combination
pub fn draw_rectangle_function(
    texture: bool,
    raw_texture: bool,
    transparency: bool,
) -> DrawRectangleFn {
    use rasterizer::draw_rectangle;
    match (texture, raw_texture, transparency) {
        (false, false, false) => draw_rectangle::<false, false, false>,
        (false, false, true) => draw_rectangle::<false, false, true>,
        (false, true, false) => draw_rectangle::<false, true, false>,
        (false, true, true) => draw_rectangle::<false, true, true>,
        (true, false, false) => draw_rectangle::<true, false, false>,
        (true, false, true) => draw_rectangle::<true, false, true>,
        (true, true, false) => draw_rectangle::<true, true, false>,
        (true, true, true) => draw_rectangle::<true, true, true>,
    }
}

/// Select the line function for a flag combination
pub fn draw_line_function(shading: bool, transparency: bool) -> DrawLineFn {
    use rasterizer::draw_line;
    match (shading, transparency) {
        (false, false) => draw_line::<false, false>,
        (false, true) => draw_line::<false, true>,
        (true, false) => draw_line::<true, false>,
        (true, true) => draw_line::<true, true>,
    }
}

/// Solid fill of a VRAM rectangle
///
/// The 24-bit color is converted to 15-bit once and written without mask
/// handling (hardware fills ignore the mask). In interlaced mode, rows
/// belonging to the field currently being displayed are skipped.
#[allow(clippy::too_many_arguments)]
pub fn fill_vram(
    vram: &mut Vram,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    color: u32,
    interlaced: bool,
    active_line_lsb: bool,
) {
    let color16 = rasterizer::color24_to_15(color);
    for row in 0..height {
        let vram_y = (y + row) % VRAM_HEIGHT;
        if interlaced && (vram_y & 1) == active_line_lsb as u32 {
            continue;
        }
        for col in 0..width {
            vram.set_pixel((x + col) % VRAM_WIDTH, vram_y, color16);
        }
    }
}

/// Upload pixel data into a VRAM rectangle
///
/// `data` holds little-endian 16-bit pixels, row-major, exactly
/// `width * height` of them. Coordinates wrap at the VRAM edges.
#[allow(clippy::too_many_arguments)]
pub fn write_vram(
    vram: &mut Vram,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    data: &[u8],
    set_mask: bool,
    check_mask: bool,
) {
    let mask_or = if set_mask { 0x8000 } else { 0 };
    for row in 0..height {
        let vram_y = (y + row) % VRAM_HEIGHT;
        for col in 0..width {
            let src = ((row * width + col) * 2) as usize;
            let value = u16::from_le_bytes([data[src], data[src + 1]]);
            let vram_x = (x + col) % VRAM_WIDTH;
            if check_mask && vram.pixel(vram_x, vram_y) & 0x8000 != 0 {
                continue;
            }
            vram.set_pixel(vram_x, vram_y, value | mask_or);
        }
    }
}

/// VRAM-to-VRAM rectangle copy
///
/// Overlapping rectangles copy through a temporary buffer, so a copy onto
/// itself leaves VRAM unchanged. Coordinates wrap at the VRAM edges.
#[allow(clippy::too_many_arguments)]
pub fn copy_vram(
    vram: &mut Vram,
    src_x: u32,
    src_y: u32,
    dst_x: u32,
    dst_y: u32,
    width: u32,
    height: u32,
    set_mask: bool,
    check_mask: bool,
) {
    let mask_or = if set_mask { 0x8000 } else { 0 };
    let mut staging = vec![0u16; (width * height) as usize];
    for row in 0..height {
        for col in 0..width {
            staging[(row * width + col) as usize] =
                vram.pixel(src_x + col, src_y + row);
        }
    }
    for row in 0..height {
        let vram_y = (dst_y + row) % VRAM_HEIGHT;
        for col in 0..width {
            let vram_x = (dst_x + col) % VRAM_WIDTH;
            if check_mask && vram.pixel(vram_x, vram_y) & 0x8000 != 0 {
                continue;
            }
            vram.set_pixel(vram_x, vram_y, staging[(row * width + col) as usize] | mask_or);
        }
    }
}

/// Refill the CLUT cache from VRAM
///
/// Loads 16 entries for 4-bit textures or 256 for 8-bit ones; the rest of
/// the cache keeps its previous contents, matching the hardware's cache
/// behavior.
pub fn update_clut(vram: &mut Vram, cmd: &UpdateClutCommand) {
    let count = if cmd.clut_is_8bit { 256 } else { 16 };
    let x = cmd.x();
    let y = cmd.y();
    for i in 0..count {
        let value = vram.pixel(x + i as u32, y);
        vram.clut_mut()[i] = value;
    }
}
