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

//! Software renderer backend
//!
//! Interprets draw and VRAM commands directly against the worker-owned
//! VRAM image through the rasterizer's function-pointer tables, then copies
//! the displayed slice into a host texture for presentation. Supports
//! 15-bit and 24-bit readout, interlaced field extraction, and the
//! full-VRAM debug view.

pub mod copy_out;

use crate::core::error::Result;
use crate::core::gpu::backend::{chroma_smooth_rgba8, BackendContext, BackendCore};
use crate::core::gpu::commands::{
    CopyVramCommand, DrawLineCommand, DrawPolygonCommand, DrawPrecisePolygonCommand,
    DrawRectangleCommand, FillVramCommand, UpdateClutCommand, UpdateDisplayCommand, VramRect,
};
use crate::core::gpu::device::{GpuDevice, TextureFormat, TextureId};
use crate::core::gpu::render;
use crate::core::gpu::{VRAM_HEIGHT, VRAM_WIDTH};
use crate::core::save_state::GpuStateBlock;

/// Preference order for the 16-bit display format
const FORMATS_FOR_16BIT: [TextureFormat; 4] = [
    TextureFormat::Rgb565,
    TextureFormat::Rgba5551,
    TextureFormat::Rgba8,
    TextureFormat::Bgra8,
];

/// Preference order for the 24-bit display format
const FORMATS_FOR_24BIT: [TextureFormat; 4] = [
    TextureFormat::Rgba8,
    TextureFormat::Bgra8,
    TextureFormat::Rgb565,
    TextureFormat::Rgba5551,
];

/// The in-process rasterizer backend
pub struct SoftwareBackend {
    core: BackendCore,
    display_16bit_format: TextureFormat,
    display_24bit_format: TextureFormat,
    upload_texture: Option<TextureId>,
    upload_buffer: Vec<u8>,
}

impl SoftwareBackend {
    /// Initialize the backend
    ///
    /// Picks the display upload formats from the device's supported set and
    /// clears VRAM unless the previous backend's contents are carried over.
    pub fn new(ctx: &mut BackendContext<'_>, upload_vram: bool) -> Result<Self> {
        if !upload_vram {
            ctx.vram.reset();
        }
        let display_16bit_format = pick_format(ctx.device, &FORMATS_FOR_16BIT);
        let display_24bit_format = pick_format(ctx.device, &FORMATS_FOR_24BIT);
        log::debug!(
            "Software backend using {:?} for 16-bit and {:?} for 24-bit output",
            display_16bit_format,
            display_24bit_format
        );
        Ok(Self {
            core: BackendCore::new(),
            display_16bit_format,
            display_24bit_format,
            upload_texture: None,
            upload_buffer: Vec::new(),
        })
    }

    /// Shared core state
    pub fn core(&self) -> &BackendCore {
        &self.core
    }

    /// Shared core state, mutable
    pub fn core_mut(&mut self) -> &mut BackendCore {
        &mut self.core
    }

    /// Selected 16-bit upload format
    pub fn display_16bit_format(&self) -> TextureFormat {
        self.display_16bit_format
    }

    /// Selected 24-bit upload format
    pub fn display_24bit_format(&self) -> TextureFormat {
        self.display_24bit_format
    }

    pub(crate) fn read_vram(
        &mut self,
        ctx: &mut BackendContext<'_>,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) {
        self.core.read_vram_to_snapshot(ctx, x, y, width, height);
    }

    pub(crate) fn fill_vram(&mut self, ctx: &mut BackendContext<'_>, cmd: &FillVramCommand) {
        render::fill_vram(
            ctx.vram,
            cmd.rect.x as u32,
            cmd.rect.y as u32,
            cmd.rect.width as u32,
            cmd.rect.height as u32,
            cmd.color,
            ctx.params.interlaced(),
            ctx.params.active_line_lsb(),
        );
    }

    pub(crate) fn update_vram(&mut self, ctx: &mut BackendContext<'_>, rect: VramRect, data: &[u8]) {
        render::write_vram(
            ctx.vram,
            rect.x as u32,
            rect.y as u32,
            rect.width as u32,
            rect.height as u32,
            data,
            ctx.params.set_mask_while_drawing(),
            ctx.params.check_mask_before_draw(),
        );
    }

    pub(crate) fn copy_vram(&mut self, ctx: &mut BackendContext<'_>, cmd: &CopyVramCommand) {
        render::copy_vram(
            ctx.vram,
            cmd.src_x as u32,
            cmd.src_y as u32,
            cmd.dst_x as u32,
            cmd.dst_y as u32,
            cmd.width as u32,
            cmd.height as u32,
            ctx.params.set_mask_while_drawing(),
            ctx.params.check_mask_before_draw(),
        );
    }

    pub(crate) fn draw_polygon(&mut self, ctx: &mut BackendContext<'_>, cmd: &DrawPolygonCommand) {
        let draw = render::draw_triangle_function(
            cmd.flags.shading(),
            cmd.flags.texture(),
            cmd.flags.raw_texture(),
            cmd.flags.transparency(),
        );
        draw(
            ctx.vram,
            &self.core.draw_area,
            ctx.params,
            cmd,
            &cmd.vertices[0],
            &cmd.vertices[1],
            &cmd.vertices[2],
        );
        if cmd.flags.quad() && cmd.num_vertices == 4 {
            // Quads are two triangles sharing an edge.
            draw(
                ctx.vram,
                &self.core.draw_area,
                ctx.params,
                cmd,
                &cmd.vertices[2],
                &cmd.vertices[1],
                &cmd.vertices[3],
            );
        }
    }

    pub(crate) fn draw_precise_polygon(
        &mut self,
        ctx: &mut BackendContext<'_>,
        cmd: &DrawPrecisePolygonCommand,
    ) {
        // The software rasterizer has no sub-pixel path; fall back to the
        // native integer coordinates carried in the command.
        let native = cmd.to_native();
        self.draw_polygon(ctx, &native);
    }

    pub(crate) fn draw_rectangle(
        &mut self,
        ctx: &mut BackendContext<'_>,
        cmd: &DrawRectangleCommand,
    ) {
        let draw = render::draw_rectangle_function(
            cmd.flags.texture(),
            cmd.flags.raw_texture(),
            cmd.flags.transparency(),
        );
        draw(ctx.vram, &self.core.draw_area, ctx.params, cmd);
    }

    pub(crate) fn draw_line(&mut self, ctx: &mut BackendContext<'_>, cmd: &DrawLineCommand) {
        let draw = render::draw_line_function(cmd.flags.shading(), cmd.flags.transparency());
        for pair in cmd.vertices.chunks_exact(2) {
            draw(
                ctx.vram,
                &self.core.draw_area,
                ctx.params,
                cmd,
                &pair[0],
                &pair[1],
            );
        }
    }

    pub(crate) fn drawing_area_changed(&mut self, _ctx: &mut BackendContext<'_>) {
        // The clip rectangle lives in the core; nothing else to refresh.
    }

    pub(crate) fn update_clut(&mut self, ctx: &mut BackendContext<'_>, cmd: &UpdateClutCommand) {
        render::update_clut(ctx.vram, cmd);
    }

    pub(crate) fn clear_cache(&mut self, _ctx: &mut BackendContext<'_>) {}

    pub(crate) fn clear_vram(&mut self, ctx: &mut BackendContext<'_>) {
        ctx.vram.reset();
    }

    pub(crate) fn on_buffer_swapped(&mut self, _ctx: &mut BackendContext<'_>) {}

    pub(crate) fn load_state(&mut self, ctx: &mut BackendContext<'_>, block: &GpuStateBlock) {
        ctx.vram.load(&block.vram, &block.clut);
    }

    pub(crate) fn flush_render(&mut self, _ctx: &mut BackendContext<'_>) {}

    pub(crate) fn restore_device_context(&mut self, _ctx: &mut BackendContext<'_>) {}

    pub(crate) fn destroy(&mut self, device: &mut dyn GpuDevice) {
        if let Some(id) = self.upload_texture.take() {
            device.destroy_texture(id);
        }
    }

    /// Refresh the display texture from VRAM
    pub(crate) fn update_display(
        &mut self,
        ctx: &mut BackendContext<'_>,
        cmd: &UpdateDisplayCommand,
    ) {
        if ctx.settings.display_show_vram {
            // Debug view: the whole VRAM image, no display geometry.
            self.core.display_width = VRAM_WIDTH as i32;
            self.core.display_height = VRAM_HEIGHT as i32;
            self.core.display_vram_width = VRAM_WIDTH as i32;
            self.core.display_vram_height = VRAM_HEIGHT as i32;
            self.core.display_aspect_ratio = VRAM_WIDTH as f32 / VRAM_HEIGHT as f32;
            if let Err(e) = self.copy_out_and_upload(ctx, 0, 0, 0, VRAM_WIDTH, VRAM_HEIGHT, 0, false, false)
            {
                log::error!("Failed to update VRAM debug display: {}", e);
            }
            return;
        }

        if cmd.display_disabled {
            self.core.clear_display_texture();
            return;
        }

        let is_24bit = cmd.display_24bit;
        let interlaced = cmd.interlaced;
        let field = cmd.field as u32;
        let vram_offset_x = if is_24bit {
            cmd.start_x as u32
        } else {
            cmd.vram_left as u32
        };
        let vram_offset_y =
            cmd.vram_top as u32 + if interlaced && cmd.interleaved { field } else { 0 };
        let skip_x = if is_24bit {
            cmd.vram_left.saturating_sub(cmd.start_x) as u32
        } else {
            0
        };
        let read_width = cmd.vram_width as u32;
        let read_height = if interlaced {
            cmd.vram_height as u32 / 2
        } else {
            cmd.vram_height as u32
        };

        self.core.display_width = cmd.vram_width as i32;
        self.core.display_height = cmd.vram_height as i32;
        self.core.display_origin_left = 0;
        self.core.display_origin_top = 0;
        self.core.display_vram_width = cmd.vram_width as i32;
        self.core.display_vram_height = cmd.vram_height as i32;

        let result = if interlaced {
            let line_skip = cmd.interleaved as u32;
            self.copy_out_and_deinterlace(
                ctx,
                vram_offset_x,
                vram_offset_y,
                skip_x,
                read_width,
                read_height,
                line_skip,
                is_24bit,
                field,
            )
        } else {
            self.copy_out_and_upload(
                ctx,
                vram_offset_x,
                vram_offset_y,
                skip_x,
                read_width,
                read_height,
                0,
                is_24bit,
                true,
            )
        };
        if let Err(e) = result {
            log::error!("Failed to update display: {}", e);
        }
    }

    /// Pick the output format and fill the staging buffer
    #[allow(clippy::too_many_arguments)]
    fn copy_out(
        &mut self,
        ctx: &mut BackendContext<'_>,
        src_x: u32,
        src_y: u32,
        skip_x: u32,
        width: u32,
        height: u32,
        line_skip: u32,
        is_24bit: bool,
        apply_chroma: bool,
    ) -> TextureFormat {
        self.upload_buffer.clear();
        let format = if is_24bit {
            let format = self.display_24bit_format;
            copy_out::copy_out_24(
                ctx.vram,
                format,
                src_x,
                src_y,
                skip_x,
                width,
                height,
                line_skip,
                &mut self.upload_buffer,
            );
            format
        } else {
            let format = self.display_16bit_format;
            copy_out::copy_out_15(
                ctx.vram,
                format,
                src_x,
                src_y,
                width,
                height,
                line_skip,
                &mut self.upload_buffer,
            );
            format
        };

        if apply_chroma
            && is_24bit
            && ctx.settings.display_24bit_chroma_smoothing
            && format.bytes_per_pixel() == 4
        {
            chroma_smooth_rgba8(&mut self.upload_buffer, width, height);
        }

        format
    }

    #[allow(clippy::too_many_arguments)]
    fn copy_out_and_upload(
        &mut self,
        ctx: &mut BackendContext<'_>,
        src_x: u32,
        src_y: u32,
        skip_x: u32,
        width: u32,
        height: u32,
        line_skip: u32,
        is_24bit: bool,
        apply_chroma: bool,
    ) -> Result<()> {
        let format = self.copy_out(
            ctx, src_x, src_y, skip_x, width, height, line_skip, is_24bit, apply_chroma,
        );
        let texture = self.fetch_upload_texture(ctx.device, width, height, format)?;
        let stride = width * format.bytes_per_pixel();
        ctx.device
            .update_texture(texture, 0, 0, width, height, &self.upload_buffer, stride)?;
        self.core
            .set_display_texture(texture, None, 0, 0, width as i32, height as i32);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn copy_out_and_deinterlace(
        &mut self,
        ctx: &mut BackendContext<'_>,
        src_x: u32,
        src_y: u32,
        skip_x: u32,
        width: u32,
        height: u32,
        line_skip: u32,
        is_24bit: bool,
        field: u32,
    ) -> Result<()> {
        let format = self.copy_out(
            ctx, src_x, src_y, skip_x, width, height, line_skip, is_24bit, true,
        );
        // Borrow dance: the staging buffer moves out while the core weaves.
        let staging = std::mem::take(&mut self.upload_buffer);
        let result = self
            .core
            .deinterlace(ctx.device, field, &staging, width, height, format);
        self.upload_buffer = staging;
        result
    }

    fn fetch_upload_texture(
        &mut self,
        device: &mut dyn GpuDevice,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> Result<TextureId> {
        if let Some(id) = self.upload_texture {
            if device.texture_info(id) == Some((width, height, format)) {
                return Ok(id);
            }
            device.destroy_texture(id);
            self.upload_texture = None;
        }
        let id = device.create_texture(width, height, format)?;
        self.upload_texture = Some(id);
        Ok(id)
    }
}

/// First device-supported format in a preference list
fn pick_format(device: &dyn GpuDevice, preference: &[TextureFormat]) -> TextureFormat {
    for &format in preference {
        if device.supports_texture_format(format) {
            return format;
        }
    }
    preference[0]
}
