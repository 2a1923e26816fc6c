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

//! Hardware renderer backend
//!
//! The accelerated variant of the closed backend set. Rendering state is
//! still mirrored into the worker-owned VRAM image through the shared
//! rasterizer, which keeps VRAM readback and backend swaps (with
//! `upload_vram`) exact; the API-specific accelerated draw path is the
//! host device's concern. What this variant adds over the software one is
//! the resolution-scale bookkeeping and the device feature requirements:
//! without texture-buffer support, initialization fails and the worker
//! falls back to the software renderer.

use crate::core::error::{GpuError, Result};
use crate::core::gpu::backend::{BackendContext, BackendCore};
use crate::core::gpu::commands::{
    CopyVramCommand, DrawLineCommand, DrawPolygonCommand, DrawPrecisePolygonCommand,
    DrawRectangleCommand, FillVramCommand, UpdateClutCommand, UpdateDisplayCommand, VramRect,
};
use crate::core::gpu::device::GpuDevice;
use crate::core::gpu::software::SoftwareBackend;
use crate::core::save_state::GpuStateBlock;
use crate::core::settings::RendererKind;

/// Highest supported resolution multiplier
const MAX_RESOLUTION_SCALE: u32 = 16;

/// Vertical resolution one scale step corresponds to
const BASE_VERTICAL_RESOLUTION: u32 = 240;

/// The host-GPU accelerated backend
pub struct HardwareBackend {
    inner: SoftwareBackend,
    resolution_scale: u32,
}

impl HardwareBackend {
    /// Initialize the backend
    ///
    /// # Errors
    /// Fails when the device lacks the features the accelerated path
    /// needs; the worker then falls back to the software renderer.
    pub fn new(ctx: &mut BackendContext<'_>, upload_vram: bool) -> Result<Self> {
        let features = ctx.device.features();
        if !features.texture_buffers {
            return Err(GpuError::BackendInitFailed {
                renderer: RendererKind::Hardware,
                message: "device does not support texture buffers".to_string(),
            });
        }

        let inner = SoftwareBackend::new(ctx, upload_vram)?;
        let mut backend = Self {
            inner,
            resolution_scale: 1,
        };
        backend.update_resolution_scale(ctx);
        log::info!(
            "Hardware backend initialized at {}x resolution scale",
            backend.resolution_scale
        );
        Ok(backend)
    }

    /// Shared core state
    pub fn core(&self) -> &BackendCore {
        self.inner.core()
    }

    /// Shared core state, mutable
    pub fn core_mut(&mut self) -> &mut BackendCore {
        self.inner.core_mut()
    }

    /// Current resolution multiplier
    pub fn resolution_scale(&self) -> u32 {
        self.resolution_scale
    }

    /// Recompute the resolution scale
    ///
    /// A fixed setting wins; 0 derives the scale from the window height so
    /// the internal resolution tracks the output size.
    pub fn update_resolution_scale(&mut self, ctx: &mut BackendContext<'_>) {
        let configured = ctx.settings.gpu_resolution_scale;
        let new_scale = if configured != 0 {
            configured.clamp(1, MAX_RESOLUTION_SCALE)
        } else {
            let window = ctx.device.window_info();
            (window.height.div_ceil(BASE_VERTICAL_RESOLUTION)).clamp(1, MAX_RESOLUTION_SCALE)
        };
        if new_scale != self.resolution_scale {
            log::info!(
                "Resolution scale changed from {}x to {}x",
                self.resolution_scale,
                new_scale
            );
            self.resolution_scale = new_scale;
        }
    }

    pub(crate) fn read_vram(
        &mut self,
        ctx: &mut BackendContext<'_>,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) {
        // The mirror in VRAM is always current, so readback is a plain
        // snapshot copy like the software path.
        self.inner.read_vram(ctx, x, y, width, height);
    }

    pub(crate) fn fill_vram(&mut self, ctx: &mut BackendContext<'_>, cmd: &FillVramCommand) {
        self.inner.fill_vram(ctx, cmd);
    }

    pub(crate) fn update_vram(&mut self, ctx: &mut BackendContext<'_>, rect: VramRect, data: &[u8]) {
        self.inner.update_vram(ctx, rect, data);
    }

    pub(crate) fn copy_vram(&mut self, ctx: &mut BackendContext<'_>, cmd: &CopyVramCommand) {
        self.inner.copy_vram(ctx, cmd);
    }

    pub(crate) fn draw_polygon(&mut self, ctx: &mut BackendContext<'_>, cmd: &DrawPolygonCommand) {
        self.inner.draw_polygon(ctx, cmd);
    }

    pub(crate) fn draw_precise_polygon(
        &mut self,
        ctx: &mut BackendContext<'_>,
        cmd: &DrawPrecisePolygonCommand,
    ) {
        self.inner.draw_precise_polygon(ctx, cmd);
    }

    pub(crate) fn draw_rectangle(
        &mut self,
        ctx: &mut BackendContext<'_>,
        cmd: &DrawRectangleCommand,
    ) {
        self.inner.draw_rectangle(ctx, cmd);
    }

    pub(crate) fn draw_line(&mut self, ctx: &mut BackendContext<'_>, cmd: &DrawLineCommand) {
        self.inner.draw_line(ctx, cmd);
    }

    pub(crate) fn drawing_area_changed(&mut self, ctx: &mut BackendContext<'_>) {
        self.inner.drawing_area_changed(ctx);
    }

    pub(crate) fn update_clut(&mut self, ctx: &mut BackendContext<'_>, cmd: &UpdateClutCommand) {
        self.inner.update_clut(ctx, cmd);
    }

    pub(crate) fn clear_cache(&mut self, ctx: &mut BackendContext<'_>) {
        self.inner.clear_cache(ctx);
    }

    pub(crate) fn clear_vram(&mut self, ctx: &mut BackendContext<'_>) {
        self.inner.clear_vram(ctx);
    }

    pub(crate) fn on_buffer_swapped(&mut self, ctx: &mut BackendContext<'_>) {
        self.inner.on_buffer_swapped(ctx);
    }

    pub(crate) fn load_state(&mut self, ctx: &mut BackendContext<'_>, block: &GpuStateBlock) {
        self.inner.load_state(ctx, block);
    }

    pub(crate) fn flush_render(&mut self, ctx: &mut BackendContext<'_>) {
        self.inner.flush_render(ctx);
    }

    pub(crate) fn restore_device_context(&mut self, ctx: &mut BackendContext<'_>) {
        self.inner.restore_device_context(ctx);
    }

    pub(crate) fn update_display(
        &mut self,
        ctx: &mut BackendContext<'_>,
        cmd: &UpdateDisplayCommand,
    ) {
        self.inner.update_display(ctx, cmd);
    }

    pub(crate) fn destroy(&mut self, device: &mut dyn GpuDevice) {
        self.inner.destroy(device);
    }
}
