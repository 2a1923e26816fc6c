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

//! Triangle, rectangle, and line rasterization
//!
//! Triangles use barycentric interpolation over the clipped bounding box;
//! lines use Bresenham stepping with per-step attribute interpolation. Each
//! render-state combination is monomorphized through const generics, so the
//! inner loops contain no branches on shading, texturing, or transparency.
//!
//! Approximations relative to real hardware are acceptable here; the goal
//! is plausible pixels, not bit-exactness.

use crate::core::gpu::commands::{
    DrawLineCommand, DrawMode, DrawPolygonCommand, DrawRectangleCommand, LineVertex,
    PolygonVertex,
};
use crate::core::gpu::{CommandParams, DrawingArea, Vram};

/// PSX 4x4 ordered dither offsets, applied to 8-bit channels before the
/// 8-to-5-bit truncation
const DITHER_TABLE: [[i16; 4]; 4] = [
    [-4, 0, -3, 1],
    [2, -2, 3, -1],
    [-3, 1, -4, 0],
    [3, -1, 2, -2],
];

/// Convert a 24-bit command color (0x00BBGGRR) to 15-bit VRAM format
#[inline]
pub fn color24_to_15(color: u32) -> u16 {
    let r = ((color & 0xFF) >> 3) as u16;
    let g = (((color >> 8) & 0xFF) >> 3) as u16;
    let b = (((color >> 16) & 0xFF) >> 3) as u16;
    (b << 10) | (g << 5) | r
}

/// Split a 24-bit command color into 8-bit channels
#[inline]
fn unpack_color24(color: u32) -> (u8, u8, u8) {
    (
        (color & 0xFF) as u8,
        ((color >> 8) & 0xFF) as u8,
        ((color >> 16) & 0xFF) as u8,
    )
}

/// Split a 15-bit VRAM pixel into 5-bit channels
#[inline]
fn unpack_rgb15(color: u16) -> (u16, u16, u16) {
    (color & 0x1F, (color >> 5) & 0x1F, (color >> 10) & 0x1F)
}

/// Pack 5-bit channels into a 15-bit VRAM pixel (mask bit clear)
#[inline]
fn pack_rgb15(r: u16, g: u16, b: u16) -> u16 {
    (b << 10) | (g << 5) | r
}

/// Pack 8-bit channels into 15-bit, optionally dithering
#[inline]
fn rgb24_to_15_dithered(r: u8, g: u8, b: u8, x: i32, y: i32, dither: bool) -> u16 {
    if dither {
        let offset = DITHER_TABLE[(y & 3) as usize][(x & 3) as usize];
        let r = (r as i16 + offset).clamp(0, 255) as u16 >> 3;
        let g = (g as i16 + offset).clamp(0, 255) as u16 >> 3;
        let b = (b as i16 + offset).clamp(0, 255) as u16 >> 3;
        pack_rgb15(r, g, b)
    } else {
        pack_rgb15((r >> 3) as u16, (g >> 3) as u16, (b >> 3) as u16)
    }
}

/// Semi-transparency blend of two 15-bit colors
///
/// Modes: 0 = B/2 + F/2, 1 = B + F, 2 = B - F, 3 = B + F/4. Channels are
/// processed independently in 5-bit precision and clamped.
#[inline]
pub fn blend(mode: u8, background: u16, foreground: u16) -> u16 {
    let (br, bg, bb) = unpack_rgb15(background);
    let (fr, fg, fb) = unpack_rgb15(foreground);

    let (r, g, b) = match mode & 3 {
        0 => (
            (br / 2 + fr / 2).min(31),
            (bg / 2 + fg / 2).min(31),
            (bb / 2 + fb / 2).min(31),
        ),
        1 => ((br + fr).min(31), (bg + fg).min(31), (bb + fb).min(31)),
        2 => (
            br.saturating_sub(fr),
            bg.saturating_sub(fg),
            bb.saturating_sub(fb),
        ),
        _ => (
            (br + fr / 4).min(31),
            (bg + fg / 4).min(31),
            (bb + fb / 4).min(31),
        ),
    };

    pack_rgb15(r, g, b)
}

/// Sample a texel through the texture page and the CLUT cache
///
/// 4-bit and 8-bit depths index the cached palette; 15-bit reads VRAM
/// directly. Coordinates wrap at the VRAM edges.
#[inline]
fn sample_texture(vram: &Vram, draw_mode: DrawMode, u: u8, v: u8) -> u16 {
    let page_x = draw_mode.page_x();
    let page_y = draw_mode.page_y();
    match draw_mode.texture_depth() {
        0 => {
            // 4 texels per 16-bit word.
            let word = vram.pixel(page_x + (u as u32 / 4), page_y + v as u32);
            let index = (word >> ((u % 4) * 4)) & 0xF;
            vram.clut()[index as usize]
        }
        1 => {
            // 2 texels per 16-bit word.
            let word = vram.pixel(page_x + (u as u32 / 2), page_y + v as u32);
            let index = if u % 2 == 0 {
                word & 0xFF
            } else {
                (word >> 8) & 0xFF
            };
            vram.clut()[index as usize]
        }
        _ => vram.pixel(page_x + u as u32, page_y + v as u32),
    }
}

/// Modulate a texel with the primitive color
///
/// Each channel is `texel * color / 128`, clamped, which makes 0x80 the
/// identity tint.
#[inline]
fn modulate_texel(texel: u16, r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (tr, tg, tb) = unpack_rgb15(texel);
    let mr = (((tr << 3) as u32 * r as u32) >> 7).min(255) as u8;
    let mg = (((tg << 3) as u32 * g as u32) >> 7).min(255) as u8;
    let mb = (((tb << 3) as u32 * b as u32) >> 7).min(255) as u8;
    (mr, mg, mb)
}

/// Final pixel write with mask handling and optional blending
#[inline]
#[allow(clippy::too_many_arguments)]
fn put_pixel(
    vram: &mut Vram,
    x: u32,
    y: u32,
    params: CommandParams,
    blend_mode: u8,
    semi_transparent: bool,
    color16: u16,
    texel_mask: bool,
) {
    let dst = vram.pixel(x, y);
    if params.check_mask_before_draw() && dst & 0x8000 != 0 {
        return;
    }
    let mut out = if semi_transparent {
        blend(blend_mode, dst, color16 & 0x7FFF)
    } else {
        color16 & 0x7FFF
    };
    if texel_mask || params.set_mask_while_drawing() {
        out |= 0x8000;
    }
    vram.set_pixel(x, y, out);
}

/// Barycentric weights of a point relative to a triangle
///
/// # Returns
/// `(w0, w1, w2)` with `w0 + w1 + w2 == 1` for non-degenerate triangles;
/// all-negative weights for degenerate ones so no pixel passes the inside
/// test.
#[inline]
fn barycentric(px: i32, py: i32, v0: (i32, i32), v1: (i32, i32), v2: (i32, i32)) -> (f32, f32, f32) {
    let denom = ((v1.1 - v2.1) * (v0.0 - v2.0) + (v2.0 - v1.0) * (v0.1 - v2.1)) as f32;
    if denom == 0.0 {
        return (-1.0, -1.0, -1.0);
    }
    let w0 = (((v1.1 - v2.1) * (px - v2.0) + (v2.0 - v1.0) * (py - v2.1)) as f32) / denom;
    let w1 = (((v2.1 - v0.1) * (px - v2.0) + (v0.0 - v2.0) * (py - v2.1)) as f32) / denom;
    (w0, w1, 1.0 - w0 - w1)
}

/// Rasterize one triangle
///
/// Interpolates color when `SHADING`, texture coordinates when `TEXTURE`,
/// and applies semi-transparent blending when `TRANSPARENCY` (for textured
/// draws only on texels whose mask bit is set). Oversized primitives are
/// rejected like the hardware rejects them.
#[allow(clippy::too_many_arguments)]
pub(crate) fn draw_triangle<
    const SHADING: bool,
    const TEXTURE: bool,
    const RAW_TEXTURE: bool,
    const TRANSPARENCY: bool,
>(
    vram: &mut Vram,
    area: &DrawingArea,
    params: CommandParams,
    cmd: &DrawPolygonCommand,
    v0: &PolygonVertex,
    v1: &PolygonVertex,
    v2: &PolygonVertex,
) {
    let p0 = (v0.x as i32, v0.y as i32);
    let p1 = (v1.x as i32, v1.y as i32);
    let p2 = (v2.x as i32, v2.y as i32);

    let min_x = p0.0.min(p1.0).min(p2.0);
    let max_x = p0.0.max(p1.0).max(p2.0);
    let min_y = p0.1.min(p1.1).min(p2.1);
    let max_y = p0.1.max(p1.1).max(p2.1);

    // Hardware rejects primitives spanning more than 1023x511.
    if max_x - min_x >= 1024 || max_y - min_y >= 512 {
        return;
    }

    let min_x = min_x.max(area.left as i32);
    let max_x = max_x.min(area.right as i32);
    let min_y = min_y.max(area.top as i32);
    let max_y = max_y.min(area.bottom as i32);

    let dither = cmd.flags.dither() && (SHADING || (TEXTURE && !RAW_TEXTURE));
    let blend_mode = cmd.draw_mode.blend_mode();
    let (flat_r, flat_g, flat_b) = unpack_color24(v0.color);

    for y in min_y..=max_y {
        if params.interlaced() && (y & 1) == params.active_line_lsb() as i32 {
            continue;
        }
        for x in min_x..=max_x {
            let (w0, w1, w2) = barycentric(x, y, p0, p1, p2);
            if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                continue;
            }

            let (r, g, b) = if SHADING {
                let (r0, g0, b0) = unpack_color24(v0.color);
                let (r1, g1, b1) = unpack_color24(v1.color);
                let (r2, g2, b2) = unpack_color24(v2.color);
                (
                    (r0 as f32 * w0 + r1 as f32 * w1 + r2 as f32 * w2) as u8,
                    (g0 as f32 * w0 + g1 as f32 * w1 + g2 as f32 * w2) as u8,
                    (b0 as f32 * w0 + b1 as f32 * w1 + b2 as f32 * w2) as u8,
                )
            } else {
                (flat_r, flat_g, flat_b)
            };

            let mut texel_mask = false;
            let mut semi_transparent = TRANSPARENCY;
            let color16 = if TEXTURE {
                let u = (v0.u as f32 * w0 + v1.u as f32 * w1 + v2.u as f32 * w2) as u8;
                let v = (v0.v as f32 * w0 + v1.v as f32 * w1 + v2.v as f32 * w2) as u8;
                let (u, v) = cmd.window.apply(u, v);
                let texel = sample_texture(vram, cmd.draw_mode, u, v);
                if texel == 0 {
                    continue;
                }
                texel_mask = texel & 0x8000 != 0;
                if TRANSPARENCY {
                    // Textured transparency applies per texel.
                    semi_transparent = texel_mask;
                }
                if RAW_TEXTURE {
                    texel
                } else {
                    let (mr, mg, mb) = modulate_texel(texel, r, g, b);
                    rgb24_to_15_dithered(mr, mg, mb, x, y, dither)
                }
            } else {
                rgb24_to_15_dithered(r, g, b, x, y, dither)
            };

            put_pixel(
                vram,
                x as u32,
                y as u32,
                params,
                blend_mode,
                semi_transparent,
                color16,
                texel_mask,
            );
        }
    }
}

/// Rasterize one rectangle
///
/// Rectangles are never gouraud-shaded or dithered; texture coordinates
/// step one texel per pixel from the top-left corner.
pub(crate) fn draw_rectangle<const TEXTURE: bool, const RAW_TEXTURE: bool, const TRANSPARENCY: bool>(
    vram: &mut Vram,
    area: &DrawingArea,
    params: CommandParams,
    cmd: &DrawRectangleCommand,
) {
    let blend_mode = cmd.draw_mode.blend_mode();
    let (r, g, b) = unpack_color24(cmd.color);
    let flat16 = color24_to_15(cmd.color);

    for dy in 0..cmd.height as i32 {
        let y = cmd.y as i32 + dy;
        if y < area.top as i32 || y > area.bottom as i32 {
            continue;
        }
        if params.interlaced() && (y & 1) == params.active_line_lsb() as i32 {
            continue;
        }
        let tex_v = cmd.v.wrapping_add(dy as u8);
        for dx in 0..cmd.width as i32 {
            let x = cmd.x as i32 + dx;
            if x < area.left as i32 || x > area.right as i32 {
                continue;
            }

            let mut texel_mask = false;
            let mut semi_transparent = TRANSPARENCY;
            let color16 = if TEXTURE {
                let tex_u = cmd.u.wrapping_add(dx as u8);
                let (u, v) = cmd.window.apply(tex_u, tex_v);
                let texel = sample_texture(vram, cmd.draw_mode, u, v);
                if texel == 0 {
                    continue;
                }
                texel_mask = texel & 0x8000 != 0;
                if TRANSPARENCY {
                    semi_transparent = texel_mask;
                }
                if RAW_TEXTURE {
                    texel
                } else {
                    let (mr, mg, mb) = modulate_texel(texel, r, g, b);
                    rgb24_to_15_dithered(mr, mg, mb, x, y, false)
                }
            } else {
                flat16
            };

            put_pixel(
                vram,
                x as u32,
                y as u32,
                params,
                blend_mode,
                semi_transparent,
                color16,
                texel_mask,
            );
        }
    }
}

/// Rasterize one line segment with Bresenham stepping
///
/// Gouraud lines interpolate the color along the dominant axis.
pub(crate) fn draw_line<const SHADING: bool, const TRANSPARENCY: bool>(
    vram: &mut Vram,
    area: &DrawingArea,
    params: CommandParams,
    cmd: &DrawLineCommand,
    start: &LineVertex,
    end: &LineVertex,
) {
    let blend_mode = cmd.draw_mode.blend_mode();
    let dither = cmd.flags.dither() && SHADING;

    let x0 = start.x as i32;
    let y0 = start.y as i32;
    let x1 = end.x as i32;
    let y1 = end.y as i32;

    // Oversized segments are rejected like other primitives.
    if (x1 - x0).abs() >= 1024 || (y1 - y0).abs() >= 512 {
        return;
    }

    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    let steps = dx.max(-dy).max(1) as f32;
    let (r0, g0, b0) = unpack_color24(start.color);
    let (r1, g1, b1) = unpack_color24(end.color);
    let flat16 = color24_to_15(start.color);

    let mut x = x0;
    let mut y = y0;
    let mut step = 0i32;

    loop {
        let inside = x >= area.left as i32
            && x <= area.right as i32
            && y >= area.top as i32
            && y <= area.bottom as i32
            && !(params.interlaced() && (y & 1) == params.active_line_lsb() as i32);
        if inside {
            let color16 = if SHADING {
                let t = step as f32 / steps;
                let r = (r0 as f32 + (r1 as f32 - r0 as f32) * t) as u8;
                let g = (g0 as f32 + (g1 as f32 - g0 as f32) * t) as u8;
                let b = (b0 as f32 + (b1 as f32 - b0 as f32) * t) as u8;
                rgb24_to_15_dithered(r, g, b, x, y, dither)
            } else {
                flat16
            };
            put_pixel(
                vram,
                x as u32,
                y as u32,
                params,
                blend_mode,
                TRANSPARENCY,
                color16,
                false,
            );
        }

        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
        step += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gpu::commands::DrawFlags;
    use crate::core::gpu::TextureWindow;

    fn flat_triangle_cmd(color: u32) -> (DrawPolygonCommand, [PolygonVertex; 3]) {
        let vertices = [
            PolygonVertex {
                x: 10,
                y: 10,
                color,
                u: 0,
                v: 0,
            },
            PolygonVertex {
                x: 40,
                y: 10,
                color,
                u: 0,
                v: 0,
            },
            PolygonVertex {
                x: 10,
                y: 40,
                color,
                u: 0,
                v: 0,
            },
        ];
        let mut all = [PolygonVertex::default(); 4];
        all[..3].copy_from_slice(&vertices);
        (
            DrawPolygonCommand {
                flags: DrawFlags::new(),
                draw_mode: DrawMode(0),
                palette: 0,
                window: TextureWindow::default(),
                num_vertices: 3,
                vertices: all,
            },
            vertices,
        )
    }

    #[test]
    fn test_flat_triangle_fills_interior() {
        let mut vram = Vram::new();
        let (cmd, v) = flat_triangle_cmd(0x0000FF);
        draw_triangle::<false, false, false, false>(
            &mut vram,
            &DrawingArea::default(),
            CommandParams::default(),
            &cmd,
            &v[0],
            &v[1],
            &v[2],
        );
        // A point well inside the triangle is red, one outside untouched.
        assert_eq!(vram.pixel(15, 15), 0x001F);
        assert_eq!(vram.pixel(39, 39), 0x0000);
    }

    #[test]
    fn test_triangle_clipped_to_drawing_area() {
        let mut vram = Vram::new();
        let (cmd, v) = flat_triangle_cmd(0x0000FF);
        let area = DrawingArea {
            left: 0,
            top: 0,
            right: 12,
            bottom: 511,
        };
        draw_triangle::<false, false, false, false>(
            &mut vram,
            &area,
            CommandParams::default(),
            &cmd,
            &v[0],
            &v[1],
            &v[2],
        );
        assert_eq!(vram.pixel(11, 11), 0x001F);
        assert_eq!(vram.pixel(15, 15), 0x0000);
    }

    #[test]
    fn test_oversized_triangle_rejected() {
        let mut vram = Vram::new();
        let (mut cmd, mut v) = flat_triangle_cmd(0x0000FF);
        v[1].x = 10 + 1100;
        cmd.vertices[1].x = v[1].x;
        draw_triangle::<false, false, false, false>(
            &mut vram,
            &DrawingArea::default(),
            CommandParams::default(),
            &cmd,
            &v[0],
            &v[1],
            &v[2],
        );
        assert_eq!(vram.pixel(15, 11), 0x0000);
    }

    #[test]
    fn test_shaded_triangle_interpolates() {
        let mut vram = Vram::new();
        let (mut cmd, mut v) = flat_triangle_cmd(0);
        v[0].color = 0x0000FF; // red
        v[1].color = 0x0000FF;
        v[2].color = 0x0000FF;
        cmd.flags = DrawFlags::new().with_shading(true);
        draw_triangle::<true, false, false, false>(
            &mut vram,
            &DrawingArea::default(),
            CommandParams::default(),
            &cmd,
            &v[0],
            &v[1],
            &v[2],
        );
        // Uniform vertex colors interpolate to the same color everywhere.
        assert_eq!(vram.pixel(15, 15) & 0x1F, 0x1F);
    }

    #[test]
    fn test_transparent_triangle_blends_additively() {
        let mut vram = Vram::new();
        for y in 0..64 {
            for x in 0..64 {
                vram.set_pixel(x, y, pack_rgb15(10, 0, 0));
            }
        }
        let (mut cmd, v) = flat_triangle_cmd(0x0000FF);
        // Mode 1 is additive.
        cmd.draw_mode = DrawMode::new(0, 0, 1, 0);
        draw_triangle::<false, false, false, true>(
            &mut vram,
            &DrawingArea::default(),
            CommandParams::default(),
            &cmd,
            &v[0],
            &v[1],
            &v[2],
        );
        // 10 + 31 clamps to 31.
        assert_eq!(vram.pixel(15, 15) & 0x1F, 31);
    }

    #[test]
    fn test_mask_check_protects_pixels() {
        let mut vram = Vram::new();
        vram.set_pixel(15, 15, 0x8000);
        let (cmd, v) = flat_triangle_cmd(0x0000FF);
        draw_triangle::<false, false, false, false>(
            &mut vram,
            &DrawingArea::default(),
            CommandParams::new(false, false, false, true),
            &cmd,
            &v[0],
            &v[1],
            &v[2],
        );
        assert_eq!(vram.pixel(15, 15), 0x8000);
        assert_eq!(vram.pixel(16, 15), 0x001F);
    }

    #[test]
    fn test_textured_triangle_samples_clut() {
        let mut vram = Vram::new();
        // 4-bit texture page at (64, 0): every texel uses index 1.
        for y in 0..64 {
            for x in 0..16 {
                vram.set_pixel(64 + x, y, 0x1111);
            }
        }
        // CLUT at (0, 480) maps index 1 to green.
        vram.set_pixel(0, 480, 0);
        vram.set_pixel(1, 480, pack_rgb15(0, 31, 0));
        let clut_cmd = crate::core::gpu::commands::UpdateClutCommand {
            reg: 480 << 6,
            clut_is_8bit: false,
        };
        crate::core::gpu::render::update_clut(&mut vram, &clut_cmd);

        let (mut cmd, mut v) = flat_triangle_cmd(0x808080);
        cmd.flags = DrawFlags::new().with_texture(true).with_raw_texture(true);
        cmd.draw_mode = DrawMode::new(64, 0, 0, 0);
        for vertex in &mut v {
            vertex.u = 4;
            vertex.v = 4;
        }
        draw_triangle::<false, true, true, false>(
            &mut vram,
            &DrawingArea::default(),
            CommandParams::default(),
            &cmd,
            &v[0],
            &v[1],
            &v[2],
        );
        assert_eq!(vram.pixel(15, 15), pack_rgb15(0, 31, 0));
    }

    #[test]
    fn test_rectangle_flat_fill() {
        let mut vram = Vram::new();
        let cmd = DrawRectangleCommand {
            flags: DrawFlags::new(),
            draw_mode: DrawMode(0),
            palette: 0,
            window: TextureWindow::default(),
            x: 5,
            y: 5,
            width: 3,
            height: 2,
            color: 0xFF0000, // blue
            u: 0,
            v: 0,
        };
        draw_rectangle::<false, false, false>(
            &mut vram,
            &DrawingArea::default(),
            CommandParams::default(),
            &cmd,
        );
        assert_eq!(vram.pixel(5, 5), 31 << 10);
        assert_eq!(vram.pixel(7, 6), 31 << 10);
        assert_eq!(vram.pixel(8, 5), 0);
        assert_eq!(vram.pixel(5, 7), 0);
    }

    #[test]
    fn test_line_endpoints_drawn() {
        let mut vram = Vram::new();
        let cmd = DrawLineCommand {
            flags: DrawFlags::new(),
            draw_mode: DrawMode(0),
            vertices: vec![],
        };
        let a = LineVertex {
            x: 0,
            y: 0,
            color: 0x0000FF,
        };
        let b = LineVertex {
            x: 10,
            y: 10,
            color: 0x0000FF,
        };
        draw_line::<false, false>(
            &mut vram,
            &DrawingArea::default(),
            CommandParams::default(),
            &cmd,
            &a,
            &b,
        );
        assert_eq!(vram.pixel(0, 0), 0x001F);
        assert_eq!(vram.pixel(10, 10), 0x001F);
        assert_eq!(vram.pixel(5, 5), 0x001F);
    }

    #[test]
    fn test_blend_modes() {
        assert_eq!(blend(0, pack_rgb15(20, 20, 20), pack_rgb15(10, 10, 10)), pack_rgb15(15, 15, 15));
        assert_eq!(blend(1, pack_rgb15(20, 0, 0), pack_rgb15(20, 0, 0)), pack_rgb15(31, 0, 0));
        assert_eq!(blend(2, pack_rgb15(20, 5, 0), pack_rgb15(10, 10, 0)), pack_rgb15(10, 0, 0));
        assert_eq!(blend(3, pack_rgb15(8, 8, 8), pack_rgb15(8, 8, 8)), pack_rgb15(10, 10, 10));
    }
}
