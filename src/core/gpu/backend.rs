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

//! Renderer backends
//!
//! The backend set is closed: [`GpuBackend`] is an enum over the software
//! and hardware variants, dispatched by match. [`BackendCore`] carries the
//! state and helpers both variants share: the display descriptor, the
//! deinterlace ring, chroma smoothing, presentation, and screenshots.
//! [`FramePacing`] is the bounded buffer between simulation rate and
//! present rate.
//!
//! Everything here runs on the GPU thread, except the producer-side half
//! of [`FramePacing`].

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use crate::core::error::{GpuError, Result};
use crate::core::gpu::commands::{BackendCommand, UpdateDisplayCommand};
use crate::core::gpu::device::{GpuDevice, PresentResult, TextureFormat, TextureId};
use crate::core::gpu::hardware::HardwareBackend;
use crate::core::gpu::host::Host;
use crate::core::gpu::screenshot::{
    texture_to_rgba8, write_image_file, ScreenshotMode, ScreenshotRequest,
};
use crate::core::gpu::software::SoftwareBackend;
use crate::core::gpu::{DrawingArea, Vram, CLUT_SIZE, VRAM_HEIGHT, VRAM_SIZE_WORDS, VRAM_WIDTH};
use crate::core::settings::GpuSettings;
use crate::core::threading::Semaphore;

/// Number of buffers in the deinterlace ring
pub const DEINTERLACE_BUFFER_COUNT: usize = 4;

/// Bounded in-flight frame counter
///
/// `begin_queue_frame` runs on the CPU thread before an update-display
/// record is published; `frame_presented` runs on the GPU thread after each
/// present of a queued frame. When the in-flight count exceeds the limit,
/// the producer parks on the semaphore until one present completes. This is
/// the only backpressure between the simulation and the display.
pub struct FramePacing {
    queued: AtomicU32,
    waiting: AtomicBool,
    sema: Semaphore,
    limit: u32,
}

impl FramePacing {
    /// Create a pacing gate allowing `limit` frames in flight (clamped to
    /// 1 to 3)
    pub fn new(limit: u32) -> Self {
        Self {
            queued: AtomicU32::new(0),
            waiting: AtomicBool::new(false),
            sema: Semaphore::new(),
            limit: limit.clamp(1, 3),
        }
    }

    /// Account a new in-flight frame
    ///
    /// # Returns
    /// `true` when the producer must wait for one present before queueing
    /// more work
    pub fn begin_queue_frame(&self) -> bool {
        let queued = self.queued.fetch_add(1, Ordering::AcqRel) + 1;
        queued > self.limit
    }

    /// Announce that the producer will wait for the next present
    ///
    /// Must be called before the display command is published so that the
    /// consumer cannot finish the present without seeing the flag.
    pub fn arm_wait(&self) {
        self.waiting.store(true, Ordering::SeqCst);
    }

    /// Park until a present completes (after [`FramePacing::arm_wait`])
    pub fn wait_for_one_queued_frame(&self) {
        self.sema.wait();
    }

    /// GPU-thread notification that a queued frame finished presenting
    pub fn frame_presented(&self) {
        let _ = self
            .queued
            .fetch_update(Ordering::AcqRel, Ordering::Relaxed, |v| {
                Some(v.saturating_sub(1))
            });
        if self.waiting.swap(false, Ordering::SeqCst) {
            self.sema.post();
        }
    }

    /// Current number of in-flight frames
    pub fn queued_frames(&self) -> u32 {
        self.queued.load(Ordering::Relaxed)
    }

    /// The configured in-flight limit
    pub fn limit(&self) -> u32 {
        self.limit
    }
}

/// CPU-visible snapshot filled by `ReadVram` commands
///
/// The producer publishes a `ReadVram` record, syncs, then reads the
/// requested rectangle from here. The CLUT is snapshotted alongside so
/// save-state capture needs no extra command.
pub struct ReadbackBuffer {
    /// VRAM snapshot, row-major, full size
    pub vram: Vec<u16>,
    /// CLUT snapshot
    pub clut: Vec<u16>,
}

impl Default for ReadbackBuffer {
    fn default() -> Self {
        Self {
            vram: vec![0u16; VRAM_SIZE_WORDS],
            clut: vec![0u16; CLUT_SIZE],
        }
    }
}

/// Everything a backend needs from the worker for one command
pub struct BackendContext<'a> {
    /// The active device
    pub device: &'a mut dyn GpuDevice,
    /// The worker-owned VRAM image
    pub vram: &'a mut Vram,
    /// GPU-side settings copy
    pub settings: &'a GpuSettings,
    /// Readback snapshot shared with the CPU thread
    pub readback: &'a Mutex<ReadbackBuffer>,
    /// Host facade (OSD messages from screenshot completion)
    pub host: &'a dyn Host,
    /// Parameters from the record header being dispatched
    pub params: crate::core::gpu::CommandParams,
}

struct FieldBuffer {
    width: u32,
    height: u32,
    format: TextureFormat,
    data: Vec<u8>,
}

/// Running counters exposed for debug overlays
#[derive(Debug, Clone, Copy, Default)]
pub struct BackendStats {
    /// Backend commands processed
    pub commands: u64,
    /// Draw commands processed
    pub draws: u64,
    /// VRAM fills, uploads, and copies processed
    pub vram_ops: u64,
}

/// State and helpers shared by both backend variants
pub struct BackendCore {
    /// Displayed width in pixels (after 24-bit and interlace adjustment)
    pub display_width: i32,
    /// Displayed height in pixels
    pub display_height: i32,
    /// Display origin (left) inside the output rectangle
    pub display_origin_left: i32,
    /// Display origin (top) inside the output rectangle
    pub display_origin_top: i32,
    /// Width of the source VRAM rectangle
    pub display_vram_width: i32,
    /// Height of the source VRAM rectangle
    pub display_vram_height: i32,
    /// Output aspect ratio; 0 derives it from the display size
    pub display_aspect_ratio: f32,

    /// Current display texture, if any
    pub display_texture: Option<TextureId>,
    /// Optional depth buffer paired with the display texture
    pub display_depth_buffer: Option<TextureId>,
    /// Viewed region inside the display texture (x, y, width, height)
    pub display_texture_view: (i32, i32, i32, i32),

    /// Active drawing (clip) area
    pub draw_area: DrawingArea,

    deinterlace_buffers: [Option<FieldBuffer>; DEINTERLACE_BUFFER_COUNT],
    current_deinterlace_buffer: usize,
    deinterlace_texture: Option<TextureId>,

    /// Statistics counters
    pub stats: BackendStats,
}

impl BackendCore {
    /// Fresh core with an empty display
    pub fn new() -> Self {
        Self {
            display_width: 0,
            display_height: 0,
            display_origin_left: 0,
            display_origin_top: 0,
            display_vram_width: 0,
            display_vram_height: 0,
            display_aspect_ratio: 4.0 / 3.0,
            display_texture: None,
            display_depth_buffer: None,
            display_texture_view: (0, 0, 0, 0),
            draw_area: DrawingArea::default(),
            deinterlace_buffers: [None, None, None, None],
            current_deinterlace_buffer: 0,
            deinterlace_texture: None,
            stats: BackendStats::default(),
        }
    }

    /// Publish a texture as the current display source
    pub fn set_display_texture(
        &mut self,
        texture: TextureId,
        depth_buffer: Option<TextureId>,
        view_x: i32,
        view_y: i32,
        view_width: i32,
        view_height: i32,
    ) {
        self.display_texture = Some(texture);
        self.display_depth_buffer = depth_buffer;
        self.display_texture_view = (view_x, view_y, view_width, view_height);
    }

    /// Drop the current display texture (blank display)
    pub fn clear_display_texture(&mut self) {
        self.display_texture = None;
        self.display_depth_buffer = None;
        self.display_texture_view = (0, 0, 0, 0);
    }

    /// Destroy the deinterlace ring textures
    pub fn destroy_deinterlace_textures(&mut self, device: &mut dyn GpuDevice) {
        if let Some(id) = self.deinterlace_texture.take() {
            device.destroy_texture(id);
        }
        for buffer in &mut self.deinterlace_buffers {
            *buffer = None;
        }
        self.current_deinterlace_buffer = 0;
    }

    /// Compute the letterboxed draw rectangle inside a window
    ///
    /// # Returns
    /// `(x, y, width, height)` of the destination rectangle
    pub fn calculate_draw_rect(&self, window_width: u32, window_height: u32) -> (i32, i32, u32, u32) {
        if self.display_width <= 0 || self.display_height <= 0 || window_width == 0 || window_height == 0
        {
            return (0, 0, window_width, window_height);
        }
        let aspect = if self.display_aspect_ratio > 0.0 {
            self.display_aspect_ratio
        } else {
            self.display_width as f32 / self.display_height as f32
        };
        let window_ratio = window_width as f32 / window_height as f32;
        let (width, height) = if window_ratio > aspect {
            (
                (window_height as f32 * aspect) as u32,
                window_height,
            )
        } else {
            (
                window_width,
                (window_width as f32 / aspect) as u32,
            )
        };
        (
            ((window_width - width) / 2) as i32,
            ((window_height - height) / 2) as i32,
            width,
            height,
        )
    }

    /// Draw the current display texture into the backbuffer
    ///
    /// Starts a present on the device; the worker finishes it (overlays,
    /// end-present, pacing).
    pub fn present_display(&mut self, device: &mut dyn GpuDevice) -> PresentResult {
        let result = device.begin_present();
        if result != PresentResult::Ok {
            return result;
        }
        if let Some(texture) = self.display_texture {
            let window = device.window_info();
            let (x, y, width, height) = self.calculate_draw_rect(window.width, window.height);
            device.draw_display_texture(texture, x, y, width, height);
        }
        PresentResult::Ok
    }

    /// Weave the current field with the previous one into a full-height
    /// deinterlace texture and make it the display source
    ///
    /// Fields rotate through a 4-deep ring so a stale previous field is
    /// still available after display size changes.
    pub fn deinterlace(
        &mut self,
        device: &mut dyn GpuDevice,
        field: u32,
        src: &[u8],
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> Result<()> {
        let index = self.current_deinterlace_buffer;
        let previous_index =
            (index + DEINTERLACE_BUFFER_COUNT - 1) % DEINTERLACE_BUFFER_COUNT;
        self.deinterlace_buffers[index] = Some(FieldBuffer {
            width,
            height,
            format,
            data: src.to_vec(),
        });
        self.current_deinterlace_buffer = (index + 1) % DEINTERLACE_BUFFER_COUNT;

        let row_bytes = (width * format.bytes_per_pixel()) as usize;
        let full_height = height * 2;
        let mut woven = vec![0u8; row_bytes * full_height as usize];

        let current = self.deinterlace_buffers[index].as_ref().map(|b| &b.data);
        let previous = self.deinterlace_buffers[previous_index]
            .as_ref()
            .filter(|b| b.width == width && b.height == height && b.format == format)
            .map(|b| &b.data);

        for y in 0..full_height {
            let source_row = (y / 2) as usize;
            let row_is_current_field = (y & 1) == (field & 1);
            let source = if row_is_current_field {
                current
            } else {
                previous.or(current)
            };
            if let Some(data) = source {
                let src_off = source_row * row_bytes;
                let dst_off = y as usize * row_bytes;
                woven[dst_off..dst_off + row_bytes]
                    .copy_from_slice(&data[src_off..src_off + row_bytes]);
            }
        }

        let texture = self.fetch_deinterlace_texture(device, width, full_height, format)?;
        device.update_texture(texture, 0, 0, width, full_height, &woven, row_bytes as u32)?;
        self.set_display_texture(texture, None, 0, 0, width as i32, full_height as i32);
        Ok(())
    }

    fn fetch_deinterlace_texture(
        &mut self,
        device: &mut dyn GpuDevice,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> Result<TextureId> {
        if let Some(id) = self.deinterlace_texture {
            if device.texture_info(id) == Some((width, height, format)) {
                return Ok(id);
            }
            device.destroy_texture(id);
            self.deinterlace_texture = None;
        }
        let id = device.create_texture(width, height, format)?;
        self.deinterlace_texture = Some(id);
        Ok(id)
    }

    /// Handle a screenshot request, reporting the outcome in-band
    pub fn render_screenshot(&mut self, ctx: &mut BackendContext<'_>, request: ScreenshotRequest) {
        match self.screenshot_pixels(ctx, request.mode) {
            Ok((width, height, rgba)) => {
                match write_image_file(&request.path, width, height, &rgba, request.quality) {
                    Ok(()) => {
                        log::info!("Saved screenshot to {}", request.path.display());
                        if request.show_osd_message {
                            ctx.host.add_osd_message(
                                "Screenshot",
                                "camera",
                                &format!("Screenshot saved to {}", request.path.display()),
                                crate::core::gpu::host::OSD_INFO_DURATION,
                            );
                        }
                    }
                    Err(e) => {
                        log::error!("Failed to save screenshot: {}", e);
                        if request.show_osd_message {
                            ctx.host.add_osd_message(
                                "Screenshot",
                                "camera",
                                &format!("Failed to save screenshot: {}", e),
                                crate::core::gpu::host::OSD_INFO_DURATION,
                            );
                        }
                    }
                }
            }
            Err(e) => {
                log::error!("Failed to render screenshot: {}", e);
            }
        }
    }

    fn screenshot_pixels(
        &self,
        ctx: &mut BackendContext<'_>,
        mode: ScreenshotMode,
    ) -> Result<(u32, u32, Vec<u8>)> {
        match mode {
            ScreenshotMode::Window => {
                if let Some((width, height, rgba)) = ctx.device.read_backbuffer() {
                    return Ok((width, height, rgba));
                }
                // Devices without backbuffer readback fall through to the
                // display texture.
                self.display_texture_rgba8(ctx)
            }
            ScreenshotMode::InternalResolution => self.display_texture_rgba8(ctx),
            ScreenshotMode::Display => {
                let (src_w, src_h, rgba) = self.display_texture_rgba8(ctx)?;
                let dst_w = self.display_width.max(1) as u32;
                let dst_h = self.display_height.max(1) as u32;
                if (src_w, src_h) == (dst_w, dst_h) {
                    Ok((src_w, src_h, rgba))
                } else {
                    Ok((dst_w, dst_h, scale_rgba8(&rgba, src_w, src_h, dst_w, dst_h)))
                }
            }
        }
    }

    fn display_texture_rgba8(&self, ctx: &mut BackendContext<'_>) -> Result<(u32, u32, Vec<u8>)> {
        let texture = self.display_texture.ok_or(GpuError::InvalidState {
            message: "no display texture to capture".to_string(),
        })?;
        let (width, height, format, data) = ctx.device.read_texture(texture)?;
        Ok((width, height, texture_to_rgba8(width, height, format, &data)))
    }

    /// Copy a VRAM rectangle (with wrap) into the shared readback snapshot
    pub fn read_vram_to_snapshot(
        &self,
        ctx: &mut BackendContext<'_>,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) {
        let mut readback = ctx.readback.lock().unwrap();
        for row in 0..height {
            let vram_y = (y + row) % VRAM_HEIGHT;
            for col in 0..width {
                let vram_x = (x + col) % VRAM_WIDTH;
                let index = (vram_y * VRAM_WIDTH + vram_x) as usize;
                readback.vram[index] = ctx.vram.pixel(vram_x, vram_y);
            }
        }
        readback.clut.copy_from_slice(ctx.vram.clut());
    }
}

impl Default for BackendCore {
    fn default() -> Self {
        Self::new()
    }
}

/// Nearest-neighbor scale of an RGBA8 image
pub(crate) fn scale_rgba8(src: &[u8], src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> Vec<u8> {
    let mut out = vec![0u8; (dst_w * dst_h * 4) as usize];
    for y in 0..dst_h {
        let sy = (y * src_h / dst_h).min(src_h.saturating_sub(1));
        for x in 0..dst_w {
            let sx = (x * src_w / dst_w).min(src_w.saturating_sub(1));
            let src_off = ((sy * src_w + sx) * 4) as usize;
            let dst_off = ((y * dst_w + x) * 4) as usize;
            out[dst_off..dst_off + 4].copy_from_slice(&src[src_off..src_off + 4]);
        }
    }
    out
}

/// Average the chroma of horizontally adjacent pixels, keeping luma
///
/// Approximates the hardware's 24-bit chroma interpolation; operates on
/// RGBA8 rows in place.
pub(crate) fn chroma_smooth_rgba8(buf: &mut [u8], width: u32, height: u32) {
    if width < 2 {
        return;
    }
    let source = buf.to_vec();
    let ycbcr = |off: usize| -> (f32, f32, f32) {
        let r = source[off] as f32;
        let g = source[off + 1] as f32;
        let b = source[off + 2] as f32;
        (
            0.299 * r + 0.587 * g + 0.114 * b,
            -0.168_736 * r - 0.331_264 * g + 0.5 * b,
            0.5 * r - 0.418_688 * g - 0.081_312 * b,
        )
    };
    for y in 0..height {
        for x in 0..width {
            let off = ((y * width + x) * 4) as usize;
            let left = ((y * width + x.saturating_sub(1)) * 4) as usize;
            let right = ((y * width + (x + 1).min(width - 1)) * 4) as usize;
            let (luma, _, _) = ycbcr(off);
            let (_, cb_l, cr_l) = ycbcr(left);
            let (_, cb_c, cr_c) = ycbcr(off);
            let (_, cb_r, cr_r) = ycbcr(right);
            let cb = (cb_l + 2.0 * cb_c + cb_r) / 4.0;
            let cr = (cr_l + 2.0 * cr_c + cr_r) / 4.0;
            buf[off] = (luma + 1.402 * cr).clamp(0.0, 255.0) as u8;
            buf[off + 1] = (luma - 0.344_136 * cb - 0.714_136 * cr).clamp(0.0, 255.0) as u8;
            buf[off + 2] = (luma + 1.772 * cb).clamp(0.0, 255.0) as u8;
        }
    }
}

/// The closed set of renderer backends
pub enum GpuBackend {
    /// In-process rasterizer
    Software(SoftwareBackend),
    /// Host-GPU accelerated variant
    Hardware(HardwareBackend),
}

impl GpuBackend {
    /// Whether this is the hardware variant
    pub fn is_hardware_renderer(&self) -> bool {
        matches!(self, GpuBackend::Hardware(_))
    }

    /// The shared core state
    pub fn core(&self) -> &BackendCore {
        match self {
            GpuBackend::Software(b) => b.core(),
            GpuBackend::Hardware(b) => b.core(),
        }
    }

    /// The shared core state, mutable
    pub fn core_mut(&mut self) -> &mut BackendCore {
        match self {
            GpuBackend::Software(b) => b.core_mut(),
            GpuBackend::Hardware(b) => b.core_mut(),
        }
    }

    /// Current resolution scale
    pub fn resolution_scale(&self) -> u32 {
        match self {
            GpuBackend::Software(_) => 1,
            GpuBackend::Hardware(b) => b.resolution_scale(),
        }
    }

    /// Recompute the automatic resolution scale from the window size
    pub fn update_resolution_scale(&mut self, ctx: &mut BackendContext<'_>) {
        if let GpuBackend::Hardware(b) = self {
            b.update_resolution_scale(ctx);
        }
    }

    /// Graphics state restore after external rendering (UI layer)
    pub fn restore_device_context(&mut self, ctx: &mut BackendContext<'_>) {
        match self {
            GpuBackend::Software(b) => b.restore_device_context(ctx),
            GpuBackend::Hardware(b) => b.restore_device_context(ctx),
        }
    }

    /// Flush pending rendering to the device
    pub fn flush_render(&mut self, ctx: &mut BackendContext<'_>) {
        match self {
            GpuBackend::Software(b) => b.flush_render(ctx),
            GpuBackend::Hardware(b) => b.flush_render(ctx),
        }
    }

    /// Begin presenting the current display texture
    pub fn present_display(&mut self, device: &mut dyn GpuDevice) -> PresentResult {
        self.core_mut().present_display(device)
    }

    /// Release device resources before the backend is dropped
    pub fn destroy(&mut self, device: &mut dyn GpuDevice) {
        match self {
            GpuBackend::Software(b) => b.destroy(device),
            GpuBackend::Hardware(b) => b.destroy(device),
        }
        let core = self.core_mut();
        core.destroy_deinterlace_textures(device);
        core.clear_display_texture();
    }

    /// Dispatch one decoded backend command
    pub fn handle_command(&mut self, ctx: &mut BackendContext<'_>, cmd: BackendCommand<'_>) {
        self.core_mut().stats.commands += 1;
        match cmd {
            BackendCommand::ClearVram => self.clear_vram(ctx),
            BackendCommand::ClearCache => self.clear_cache(ctx),
            BackendCommand::ReadVram(rect) => {
                self.read_vram(ctx, rect.x as u32, rect.y as u32, rect.width as u32, rect.height as u32);
            }
            BackendCommand::FillVram(fill) => {
                self.core_mut().stats.vram_ops += 1;
                self.fill_vram(ctx, fill);
            }
            BackendCommand::UpdateVram(rect, data) => {
                self.core_mut().stats.vram_ops += 1;
                self.update_vram(ctx, rect, data);
            }
            BackendCommand::CopyVram(copy) => {
                self.core_mut().stats.vram_ops += 1;
                self.copy_vram(ctx, copy);
            }
            BackendCommand::SetDrawingArea(cmd) => {
                self.core_mut().draw_area = cmd.area;
                self.drawing_area_changed(ctx);
            }
            BackendCommand::UpdateClut(cmd) => self.update_clut(ctx, cmd),
            BackendCommand::BufferSwapped => self.on_buffer_swapped(ctx),
            BackendCommand::UpdateResolutionScale => self.update_resolution_scale(ctx),
            BackendCommand::LoadState(block) => self.load_state(ctx, &block),
            BackendCommand::RenderScreenshot(request) => {
                self.core_mut().render_screenshot(ctx, *request);
            }
            BackendCommand::DrawPolygon(cmd) => {
                self.core_mut().stats.draws += 1;
                self.draw_polygon(ctx, &cmd);
            }
            BackendCommand::DrawPrecisePolygon(cmd) => {
                self.core_mut().stats.draws += 1;
                self.draw_precise_polygon(ctx, &cmd);
            }
            BackendCommand::DrawRectangle(cmd) => {
                self.core_mut().stats.draws += 1;
                self.draw_rectangle(ctx, &cmd);
            }
            BackendCommand::DrawLine(cmd) => {
                self.core_mut().stats.draws += 1;
                self.draw_line(ctx, &cmd);
            }
            BackendCommand::UpdateDisplay(cmd) => self.update_display(ctx, &cmd),
        }
    }

    /// Refresh the display texture from VRAM
    pub fn update_display(&mut self, ctx: &mut BackendContext<'_>, cmd: &UpdateDisplayCommand) {
        match self {
            GpuBackend::Software(b) => b.update_display(ctx, cmd),
            GpuBackend::Hardware(b) => b.update_display(ctx, cmd),
        }
    }

    fn clear_vram(&mut self, ctx: &mut BackendContext<'_>) {
        match self {
            GpuBackend::Software(b) => b.clear_vram(ctx),
            GpuBackend::Hardware(b) => b.clear_vram(ctx),
        }
    }

    fn clear_cache(&mut self, ctx: &mut BackendContext<'_>) {
        match self {
            GpuBackend::Software(b) => b.clear_cache(ctx),
            GpuBackend::Hardware(b) => b.clear_cache(ctx),
        }
    }

    fn read_vram(&mut self, ctx: &mut BackendContext<'_>, x: u32, y: u32, width: u32, height: u32) {
        match self {
            GpuBackend::Software(b) => b.read_vram(ctx, x, y, width, height),
            GpuBackend::Hardware(b) => b.read_vram(ctx, x, y, width, height),
        }
    }

    fn fill_vram(
        &mut self,
        ctx: &mut BackendContext<'_>,
        cmd: crate::core::gpu::commands::FillVramCommand,
    ) {
        match self {
            GpuBackend::Software(b) => b.fill_vram(ctx, &cmd),
            GpuBackend::Hardware(b) => b.fill_vram(ctx, &cmd),
        }
    }

    fn update_vram(
        &mut self,
        ctx: &mut BackendContext<'_>,
        rect: crate::core::gpu::commands::VramRect,
        data: &[u8],
    ) {
        match self {
            GpuBackend::Software(b) => b.update_vram(ctx, rect, data),
            GpuBackend::Hardware(b) => b.update_vram(ctx, rect, data),
        }
    }

    fn copy_vram(
        &mut self,
        ctx: &mut BackendContext<'_>,
        cmd: crate::core::gpu::commands::CopyVramCommand,
    ) {
        match self {
            GpuBackend::Software(b) => b.copy_vram(ctx, &cmd),
            GpuBackend::Hardware(b) => b.copy_vram(ctx, &cmd),
        }
    }

    fn drawing_area_changed(&mut self, ctx: &mut BackendContext<'_>) {
        match self {
            GpuBackend::Software(b) => b.drawing_area_changed(ctx),
            GpuBackend::Hardware(b) => b.drawing_area_changed(ctx),
        }
    }

    fn update_clut(
        &mut self,
        ctx: &mut BackendContext<'_>,
        cmd: crate::core::gpu::commands::UpdateClutCommand,
    ) {
        match self {
            GpuBackend::Software(b) => b.update_clut(ctx, &cmd),
            GpuBackend::Hardware(b) => b.update_clut(ctx, &cmd),
        }
    }

    fn on_buffer_swapped(&mut self, ctx: &mut BackendContext<'_>) {
        match self {
            GpuBackend::Software(b) => b.on_buffer_swapped(ctx),
            GpuBackend::Hardware(b) => b.on_buffer_swapped(ctx),
        }
    }

    fn load_state(
        &mut self,
        ctx: &mut BackendContext<'_>,
        block: &crate::core::save_state::GpuStateBlock,
    ) {
        match self {
            GpuBackend::Software(b) => b.load_state(ctx, block),
            GpuBackend::Hardware(b) => b.load_state(ctx, block),
        }
    }

    fn draw_polygon(
        &mut self,
        ctx: &mut BackendContext<'_>,
        cmd: &crate::core::gpu::commands::DrawPolygonCommand,
    ) {
        match self {
            GpuBackend::Software(b) => b.draw_polygon(ctx, cmd),
            GpuBackend::Hardware(b) => b.draw_polygon(ctx, cmd),
        }
    }

    fn draw_precise_polygon(
        &mut self,
        ctx: &mut BackendContext<'_>,
        cmd: &crate::core::gpu::commands::DrawPrecisePolygonCommand,
    ) {
        match self {
            GpuBackend::Software(b) => b.draw_precise_polygon(ctx, cmd),
            GpuBackend::Hardware(b) => b.draw_precise_polygon(ctx, cmd),
        }
    }

    fn draw_rectangle(
        &mut self,
        ctx: &mut BackendContext<'_>,
        cmd: &crate::core::gpu::commands::DrawRectangleCommand,
    ) {
        match self {
            GpuBackend::Software(b) => b.draw_rectangle(ctx, cmd),
            GpuBackend::Hardware(b) => b.draw_rectangle(ctx, cmd),
        }
    }

    fn draw_line(
        &mut self,
        ctx: &mut BackendContext<'_>,
        cmd: &crate::core::gpu::commands::DrawLineCommand,
    ) {
        match self {
            GpuBackend::Software(b) => b.draw_line(ctx, cmd),
            GpuBackend::Hardware(b) => b.draw_line(ctx, cmd),
        }
    }
}
