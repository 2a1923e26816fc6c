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

//! Display readout
//!
//! Copies a VRAM slice into host pixel rows for texture upload. The 15-bit
//! path converts one 16-bit pixel per texel; the 24-bit path reassembles
//! packed RGB triples from the 16-bit word stream. Both have a straight
//! stride fast path for in-bounds reads and a wrapping slow path that
//! reduces every coordinate modulo the VRAM dimensions.

use crate::core::gpu::device::TextureFormat;
use crate::core::gpu::{Vram, VRAM_HEIGHT, VRAM_WIDTH};

/// Bytes per VRAM row
const VRAM_ROW_BYTES: u32 = VRAM_WIDTH * 2;

/// Convert one VRAM pixel to RGBA5551 output
///
/// Swaps the red and blue fields and clears the alpha bit.
#[inline]
fn vram16_to_rgba5551(value: u16) -> u16 {
    (value & 0x3E0) | ((value >> 10) & 0x1F) | ((value & 0x1F) << 10)
}

/// Convert one VRAM pixel to RGB565 output
#[inline]
fn vram16_to_rgb565(value: u16) -> u16 {
    ((value >> 10) & 0x1F) | ((((value >> 5) & 0x1F) << 1) << 5) | ((value & 0x1F) << 11)
}

/// Convert one VRAM pixel to RGBA8 output
#[inline]
fn vram16_to_rgba8(value: u16) -> u32 {
    let r = ((value & 0x1F) as u32) << 3;
    let g = (((value >> 5) & 0x1F) as u32) << 3;
    let b = (((value >> 10) & 0x1F) as u32) << 3;
    let a = if value & 0x8000 != 0 { 0xFF } else { 0 };
    r | (g << 8) | (b << 16) | (a << 24)
}

/// Convert one VRAM pixel to BGRA8 output
#[inline]
fn vram16_to_bgra8(value: u16) -> u32 {
    let r = ((value & 0x1F) as u32) << 3;
    let g = (((value >> 5) & 0x1F) as u32) << 3;
    let b = (((value >> 10) & 0x1F) as u32) << 3;
    b | (g << 8) | (r << 16) | 0xFF00_0000
}

/// 15-bit display readout
///
/// Reads a `width` x `height` pixel rectangle starting at
/// `(src_x, src_y)`, advancing `1 << line_skip` VRAM rows per output row,
/// and appends converted rows to `out`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn copy_out_15(
    vram: &Vram,
    format: TextureFormat,
    src_x: u32,
    src_y: u32,
    width: u32,
    height: u32,
    line_skip: u32,
    out: &mut Vec<u8>,
) {
    match format {
        TextureFormat::Rgba5551 => {
            copy_rows_16(vram, src_x, src_y, width, height, line_skip, vram16_to_rgba5551, out)
        }
        TextureFormat::Rgb565 => {
            copy_rows_16(vram, src_x, src_y, width, height, line_skip, vram16_to_rgb565, out)
        }
        TextureFormat::Rgba8 => {
            copy_rows_32(vram, src_x, src_y, width, height, line_skip, vram16_to_rgba8, out)
        }
        TextureFormat::Bgra8 => {
            copy_rows_32(vram, src_x, src_y, width, height, line_skip, vram16_to_bgra8, out)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn copy_rows_16(
    vram: &Vram,
    src_x: u32,
    src_y: u32,
    width: u32,
    height: u32,
    line_skip: u32,
    convert: fn(u16) -> u16,
    out: &mut Vec<u8>,
) {
    let pixels = vram.pixels();
    if src_x + width <= VRAM_WIDTH && src_y + (height << line_skip) <= VRAM_HEIGHT {
        // Straight stride walk.
        let mut row_start = (src_y * VRAM_WIDTH + src_x) as usize;
        let step = (VRAM_WIDTH << line_skip) as usize;
        for _ in 0..height {
            for &value in &pixels[row_start..row_start + width as usize] {
                out.extend_from_slice(&convert(value).to_le_bytes());
            }
            row_start += step;
        }
    } else {
        // Per-pixel wrap.
        let mut y = src_y;
        for _ in 0..height {
            let row = &pixels[((y % VRAM_HEIGHT) * VRAM_WIDTH) as usize..][..VRAM_WIDTH as usize];
            for col in src_x..src_x + width {
                out.extend_from_slice(&convert(row[(col % VRAM_WIDTH) as usize]).to_le_bytes());
            }
            y += 1 << line_skip;
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn copy_rows_32(
    vram: &Vram,
    src_x: u32,
    src_y: u32,
    width: u32,
    height: u32,
    line_skip: u32,
    convert: fn(u16) -> u32,
    out: &mut Vec<u8>,
) {
    let pixels = vram.pixels();
    if src_x + width <= VRAM_WIDTH && src_y + (height << line_skip) <= VRAM_HEIGHT {
        let mut row_start = (src_y * VRAM_WIDTH + src_x) as usize;
        let step = (VRAM_WIDTH << line_skip) as usize;
        for _ in 0..height {
            for &value in &pixels[row_start..row_start + width as usize] {
                out.extend_from_slice(&convert(value).to_le_bytes());
            }
            row_start += step;
        }
    } else {
        let mut y = src_y;
        for _ in 0..height {
            let row = &pixels[((y % VRAM_HEIGHT) * VRAM_WIDTH) as usize..][..VRAM_WIDTH as usize];
            for col in src_x..src_x + width {
                out.extend_from_slice(&convert(row[(col % VRAM_WIDTH) as usize]).to_le_bytes());
            }
            y += 1 << line_skip;
        }
    }
}

/// Read one byte of a VRAM row's 16-bit word stream, wrapping at the row
/// end
#[inline]
fn row_byte(row: &[u16], byte_index: u32) -> u8 {
    let wrapped = byte_index % VRAM_ROW_BYTES;
    let word = row[(wrapped / 2) as usize];
    (word >> ((wrapped & 1) * 8)) as u8
}

/// 24-bit display readout
///
/// Treats the VRAM row as a stream of packed RGB triples beginning
/// `skip_x` 24-bit pixels after byte `2 * src_x`. The wrapping path reads
/// every byte modulo the row stride, which matches a naive byte-wise
/// modulus implementation exactly.
#[allow(clippy::too_many_arguments)]
pub(crate) fn copy_out_24(
    vram: &Vram,
    format: TextureFormat,
    src_x: u32,
    src_y: u32,
    skip_x: u32,
    width: u32,
    height: u32,
    line_skip: u32,
    out: &mut Vec<u8>,
) {
    let pixels = vram.pixels();
    let start_byte = 2 * src_x + 3 * skip_x;
    let fast = start_byte + 3 * width <= VRAM_ROW_BYTES
        && src_y + (height << line_skip) <= VRAM_HEIGHT;

    let mut y = src_y;
    for _ in 0..height {
        let row = &pixels[((y % VRAM_HEIGHT) * VRAM_WIDTH) as usize..][..VRAM_WIDTH as usize];
        for col in 0..width {
            let base = start_byte + 3 * col;
            let (r, g, b) = if fast {
                // In-bounds: direct byte extraction from the word stream.
                let word0 = row[(base / 2) as usize];
                let word1 = row[(base / 2 + 1) as usize];
                if base & 1 == 0 {
                    (word0 as u8, (word0 >> 8) as u8, word1 as u8)
                } else {
                    ((word0 >> 8) as u8, word1 as u8, (word1 >> 8) as u8)
                }
            } else {
                (
                    row_byte(row, base),
                    row_byte(row, base + 1),
                    row_byte(row, base + 2),
                )
            };
            match format {
                TextureFormat::Rgba8 => out.extend_from_slice(&[r, g, b, 0xFF]),
                TextureFormat::Bgra8 => out.extend_from_slice(&[b, g, r, 0xFF]),
                TextureFormat::Rgb565 => {
                    let value = (((r as u16) >> 3) << 11)
                        | (((g as u16) >> 2) << 5)
                        | ((b as u16) >> 3);
                    out.extend_from_slice(&value.to_le_bytes());
                }
                TextureFormat::Rgba5551 => {
                    let value = (((r as u16) >> 3) << 10)
                        | (((g as u16) >> 3) << 5)
                        | ((b as u16) >> 3);
                    out.extend_from_slice(&value.to_le_bytes());
                }
            }
        }
        y += 1 << line_skip;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkerboard_vram() -> Vram {
        let mut vram = Vram::new();
        for y in 0..VRAM_HEIGHT {
            for x in 0..VRAM_WIDTH {
                vram.set_pixel(x, y, ((x * 7 + y * 13) & 0x7FFF) as u16);
            }
        }
        vram
    }

    /// Reference RGBA5551 conversion: swap R and B, drop the mask bit.
    fn rgba5551_out(value: u16) -> u16 {
        (value & 0x3E0) | ((value >> 10) & 0x1F) | ((value & 0x1F) << 10)
    }

    #[test]
    fn test_copy_out_15_rgba5551_swaps_channels() {
        let mut vram = Vram::new();
        // Pure red with the mask bit set.
        vram.set_pixel(8, 4, 0x801F);
        let mut out = Vec::new();
        copy_out_15(&vram, TextureFormat::Rgba5551, 8, 4, 4, 2, 0, &mut out);
        assert_eq!(out.len(), 4 * 2 * 2);
        // Red moves to bits 10-14 and the mask bit is cleared.
        let first = u16::from_le_bytes([out[0], out[1]]);
        assert_eq!(first, 0x7C00);
    }

    #[test]
    fn test_copy_out_15_rgb565_swaps_channels() {
        let mut vram = Vram::new();
        // Pure red and pure blue side by side.
        vram.set_pixel(0, 0, 0x001F);
        vram.set_pixel(1, 0, 0x7C00);
        let mut out = Vec::new();
        copy_out_15(&vram, TextureFormat::Rgb565, 0, 0, 2, 1, 0, &mut out);
        assert_eq!(u16::from_le_bytes([out[0], out[1]]), 0xF800);
        assert_eq!(u16::from_le_bytes([out[2], out[3]]), 0x001F);
    }

    #[test]
    fn test_copy_out_15_line_skip_doubles_stride() {
        let vram = checkerboard_vram();
        let mut out = Vec::new();
        copy_out_15(&vram, TextureFormat::Rgba5551, 0, 0, 1, 3, 1, &mut out);
        let rows: Vec<u16> = out
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(
            rows,
            vec![
                rgba5551_out(vram.pixel(0, 0)),
                rgba5551_out(vram.pixel(0, 2)),
                rgba5551_out(vram.pixel(0, 4)),
            ]
        );
    }

    #[test]
    fn test_copy_out_15_wrap_matches_naive() {
        let vram = checkerboard_vram();
        let mut out = Vec::new();
        let (src_x, src_y, w, h) = (VRAM_WIDTH - 2, VRAM_HEIGHT - 1, 5, 3);
        copy_out_15(&vram, TextureFormat::Rgba8, src_x, src_y, w, h, 0, &mut out);
        for row in 0..h {
            for col in 0..w {
                let expected = vram.pixel((src_x + col) % VRAM_WIDTH, (src_y + row) % VRAM_HEIGHT);
                let off = ((row * w + col) * 4) as usize;
                assert_eq!(out[off], ((expected & 0x1F) << 3) as u8);
            }
        }
    }

    #[test]
    fn test_copy_out_24_fast_path_reads_triples() {
        let mut vram = Vram::new();
        // Bytes 0.. of row 0: 01 02 03 04 05 06 ...
        for i in 0..16u32 {
            let low = (i * 2 + 1) as u16;
            let high = (i * 2 + 2) as u16;
            vram.set_pixel(i, 0, low | (high << 8));
        }
        let mut out = Vec::new();
        copy_out_24(&vram, TextureFormat::Rgba8, 0, 0, 0, 2, 1, 0, &mut out);
        assert_eq!(&out[..8], &[1, 2, 3, 0xFF, 4, 5, 6, 0xFF]);
    }

    #[test]
    fn test_copy_out_24_skip_x_offsets_stream() {
        let mut vram = Vram::new();
        for i in 0..16u32 {
            let low = (i * 2 + 1) as u16;
            let high = (i * 2 + 2) as u16;
            vram.set_pixel(i, 0, low | (high << 8));
        }
        let mut out = Vec::new();
        copy_out_24(&vram, TextureFormat::Rgba8, 0, 0, 1, 1, 1, 0, &mut out);
        assert_eq!(&out[..4], &[4, 5, 6, 0xFF]);
    }

    #[test]
    fn test_copy_out_24_wrap_matches_naive_modulus() {
        let vram = checkerboard_vram();
        let src_x = VRAM_WIDTH - 4;
        let width = 16;
        let mut wrapped = Vec::new();
        copy_out_24(&vram, TextureFormat::Rgba8, src_x, 10, 0, width, 1, 0, &mut wrapped);

        // Naive reference: byte-wise modulus over the row stream.
        let row = &vram.pixels()[(10 * VRAM_WIDTH) as usize..][..VRAM_WIDTH as usize];
        let byte_at = |i: u32| -> u8 {
            let i = i % (VRAM_WIDTH * 2);
            (row[(i / 2) as usize] >> ((i & 1) * 8)) as u8
        };
        for col in 0..width {
            let base = 2 * src_x + 3 * col;
            let off = (col * 4) as usize;
            assert_eq!(wrapped[off], byte_at(base));
            assert_eq!(wrapped[off + 1], byte_at(base + 1));
            assert_eq!(wrapped[off + 2], byte_at(base + 2));
        }
    }
}
