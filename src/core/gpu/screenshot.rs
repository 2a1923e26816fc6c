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

//! Screenshot output
//!
//! Screenshots are rendered on the GPU thread from the current display
//! texture and written as PNG or JPEG depending on the file extension.
//! Failures are reported in-band (log plus OSD message) and never affect
//! the worker.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};

use crate::core::error::{GpuError, Result};
use crate::core::gpu::device::TextureFormat;

/// What a screenshot captures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenshotMode {
    /// The display texture at its native (internal) resolution
    InternalResolution,
    /// The full window backbuffer, overlays included
    Window,
    /// The display rectangle as presented, without overlays
    Display,
}

/// Payload of a `RenderScreenshot` command
#[derive(Debug, Clone)]
pub struct ScreenshotRequest {
    /// Output file path; the extension selects PNG or JPEG
    pub path: PathBuf,
    /// What to capture
    pub mode: ScreenshotMode,
    /// JPEG quality (1-100); ignored for PNG
    pub quality: u8,
    /// Show an OSD message on completion
    pub show_osd_message: bool,
}

/// Convert tightly packed texture data to RGBA8 rows
pub fn texture_to_rgba8(width: u32, height: u32, format: TextureFormat, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity((width * height * 4) as usize);
    match format {
        TextureFormat::Rgba8 => out.extend_from_slice(data),
        TextureFormat::Bgra8 => {
            for px in data.chunks_exact(4) {
                out.extend_from_slice(&[px[2], px[1], px[0], px[3]]);
            }
        }
        TextureFormat::Rgb565 => {
            // R in the high bits, B in the low bits.
            for px in data.chunks_exact(2) {
                let v = u16::from_le_bytes([px[0], px[1]]);
                out.extend_from_slice(&[
                    (((v >> 11) & 0x1F) << 3) as u8,
                    (((v >> 5) & 0x3F) << 2) as u8,
                    ((v & 0x1F) << 3) as u8,
                    0xFF,
                ]);
            }
        }
        TextureFormat::Rgba5551 => {
            // R in bits 10-14, B in the low bits.
            for px in data.chunks_exact(2) {
                let v = u16::from_le_bytes([px[0], px[1]]);
                out.extend_from_slice(&[
                    (((v >> 10) & 0x1F) << 3) as u8,
                    (((v >> 5) & 0x1F) << 3) as u8,
                    ((v & 0x1F) << 3) as u8,
                    0xFF,
                ]);
            }
        }
    }
    out
}

/// Whether a path selects JPEG output
fn is_jpeg(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some(ext) if ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg")
    )
}

/// Write an RGBA8 image to a PNG or JPEG file
///
/// # Arguments
/// * `path` - Output path; extension selects the codec
/// * `width`, `height` - Image dimensions
/// * `rgba` - Tightly packed RGBA8 rows
/// * `quality` - JPEG quality (1-100)
pub fn write_image_file(path: &Path, width: u32, height: u32, rgba: &[u8], quality: u8) -> Result<()> {
    if width == 0 || height == 0 || rgba.len() < (width * height * 4) as usize {
        return Err(GpuError::InvalidState {
            message: format!("invalid {}x{} screenshot buffer", width, height),
        });
    }

    let file = File::create(path)?;
    let writer = BufWriter::new(file);

    if is_jpeg(path) {
        // JPEG has no alpha channel.
        let rgb: Vec<u8> = rgba
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect();
        JpegEncoder::new_with_quality(writer, quality.clamp(1, 100))
            .write_image(&rgb, width, height, ExtendedColorType::Rgb8)
            .map_err(|e| GpuError::IoError {
                message: format!("JPEG encode failed: {}", e),
            })
    } else {
        PngEncoder::new(writer)
            .write_image(rgba, width, height, ExtendedColorType::Rgba8)
            .map_err(|e| GpuError::IoError {
                message: format!("PNG encode failed: {}", e),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texture_to_rgba8_formats() {
        let bgra = [1u8, 2, 3, 4];
        assert_eq!(texture_to_rgba8(1, 1, TextureFormat::Bgra8, &bgra), vec![3, 2, 1, 4]);

        let rgb565 = 0b11111_000000_11111u16.to_le_bytes();
        assert_eq!(
            texture_to_rgba8(1, 1, TextureFormat::Rgb565, &rgb565),
            vec![0xF8, 0, 0xF8, 0xFF]
        );

        // Low five bits are blue in RGBA5551.
        let rgba5551 = 0x001Fu16.to_le_bytes();
        assert_eq!(
            texture_to_rgba8(1, 1, TextureFormat::Rgba5551, &rgba5551),
            vec![0, 0, 0xF8, 0xFF]
        );
    }

    #[test]
    fn test_write_png_and_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let rgba = vec![0x80u8; 4 * 4 * 4];

        let png = dir.path().join("shot.png");
        write_image_file(&png, 4, 4, &rgba, 90).unwrap();
        assert!(png.metadata().unwrap().len() > 0);

        let jpg = dir.path().join("shot.jpg");
        write_image_file(&jpg, 4, 4, &rgba, 90).unwrap();
        assert!(jpg.metadata().unwrap().len() > 0);
    }

    #[test]
    fn test_write_rejects_short_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.png");
        let err = write_image_file(&path, 4, 4, &[0u8; 8], 90);
        assert!(err.is_err());
    }
}
