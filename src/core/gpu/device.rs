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

//! GPU device abstraction
//!
//! Backends render through a [`GpuDevice`], which bundles texture storage
//! and the main swapchain. Devices are created and destroyed only on the
//! GPU thread, inside the worker's reconfigure path. Real windowed devices
//! are provided by the host application through a [`DeviceFactory`]; the
//! in-crate [`HeadlessDevice`] keeps everything in CPU memory and is used
//! by tests, captures, and the demo binary.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::core::error::{GpuError, Result};
use crate::core::gpu::host::WindowInfo;
use crate::core::settings::{RenderApi, VsyncMode};

/// Device feature bits that settings can mask off
pub struct FeatureMask;

impl FeatureMask {
    /// Dual-source blending
    pub const DUAL_SOURCE_BLEND: u32 = 1 << 0;
    /// Framebuffer fetch
    pub const FRAMEBUFFER_FETCH: u32 = 1 << 1;
    /// Texture buffers
    pub const TEXTURE_BUFFERS: u32 = 1 << 2;
    /// Host memory import
    pub const MEMORY_IMPORT: u32 = 1 << 3;
    /// Raster order views
    pub const RASTER_ORDER_VIEWS: u32 = 1 << 4;
}

/// Capabilities reported by a device
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceFeatures {
    /// Presentation can be split into an explicit submit step
    pub explicit_present: bool,
    /// The device can schedule a present for a target time itself
    pub timed_present: bool,
    /// Exclusive fullscreen is supported
    pub exclusive_fullscreen: bool,
    /// Dual-source blending is usable
    pub dual_source_blend: bool,
    /// Framebuffer fetch is usable
    pub framebuffer_fetch: bool,
    /// Texture buffers are usable
    pub texture_buffers: bool,
    /// Host memory import is usable
    pub memory_import: bool,
    /// Raster order views are usable
    pub raster_order_views: bool,
}

/// Outcome of starting a present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentResult {
    /// The frame can be rendered and presented
    Ok,
    /// The swapchain asked to drop this frame
    SkipPresent,
    /// The device was lost and must be recreated
    DeviceLost,
    /// Exclusive fullscreen ownership was lost
    ExclusiveFullscreenLost,
}

/// Host texture pixel formats used for display upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFormat {
    /// 16-bit, 5-5-5 RGB plus alpha bit
    Rgba5551,
    /// 16-bit, 5-6-5 RGB
    Rgb565,
    /// 32-bit RGBA
    Rgba8,
    /// 32-bit BGRA
    Bgra8,
}

impl TextureFormat {
    /// Bytes per pixel for this format
    #[inline]
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            TextureFormat::Rgba5551 | TextureFormat::Rgb565 => 2,
            TextureFormat::Rgba8 | TextureFormat::Bgra8 => 4,
        }
    }
}

/// Opaque device texture handle
pub type TextureId = u32;

/// Parameters for device creation
#[derive(Debug, Clone)]
pub struct DeviceCreateRequest {
    /// Adapter selection string, empty for default
    pub adapter: String,
    /// Enable the API validation layer
    pub debug_device: bool,
    /// [`FeatureMask`] bits to disable
    pub disabled_features: u32,
    /// Window the main swapchain is created on
    pub window: WindowInfo,
    /// Initial vsync mode
    pub vsync: VsyncMode,
    /// Allow throttled presentation without blocking vsync
    pub allow_present_throttle: bool,
    /// Exclusive fullscreen request; `None` leaves it to the device
    pub exclusive_fullscreen: Option<bool>,
}

/// A host GPU device with its main swapchain
///
/// All methods are invoked on the GPU thread only.
pub trait GpuDevice: Send {
    /// The API this device was created with
    fn render_api(&self) -> RenderApi;

    /// Device capabilities
    fn features(&self) -> DeviceFeatures;

    /// Whether the device can sample and present this texture format
    fn supports_texture_format(&self, format: TextureFormat) -> bool;

    /// Create a texture
    fn create_texture(&mut self, width: u32, height: u32, format: TextureFormat)
        -> Result<TextureId>;

    /// Upload pixel rows into a texture region
    ///
    /// `stride` is the byte distance between source rows.
    #[allow(clippy::too_many_arguments)]
    fn update_texture(
        &mut self,
        id: TextureId,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        data: &[u8],
        stride: u32,
    ) -> Result<()>;

    /// Read a whole texture back
    ///
    /// # Returns
    /// `(width, height, format, tightly packed pixels)`
    fn read_texture(&self, id: TextureId) -> Result<(u32, u32, TextureFormat, Vec<u8>)>;

    /// Size and format of a texture, if it exists
    fn texture_info(&self, id: TextureId) -> Option<(u32, u32, TextureFormat)>;

    /// Destroy a texture; unknown handles are ignored
    fn destroy_texture(&mut self, id: TextureId);

    /// Whether a main swapchain exists
    fn has_main_swap_chain(&self) -> bool;

    /// Window info of the main swapchain
    fn window_info(&self) -> WindowInfo;

    /// Resize the main swapchain buffers
    fn resize_buffers(&mut self, width: u32, height: u32, scale: f32) -> Result<()>;

    /// Change the vsync mode
    fn set_vsync_mode(&mut self, mode: VsyncMode, allow_present_throttle: bool) -> Result<()>;

    /// Whether presents block on vertical blank in the current mode
    fn is_vsync_blocking(&self) -> bool;

    /// Sleep until the next reasonable present slot (idle pacing)
    fn throttle_presentation(&mut self);

    /// Whether the swapchain asks to drop the next frame
    fn should_skip_presenting(&self) -> bool;

    /// Begin presenting a frame to the main swapchain
    fn begin_present(&mut self) -> PresentResult;

    /// Composite a texture into the backbuffer
    ///
    /// Scales `id` to the destination rectangle with nearest filtering.
    fn draw_display_texture(
        &mut self,
        id: TextureId,
        dst_x: i32,
        dst_y: i32,
        dst_width: u32,
        dst_height: u32,
    );

    /// Finish the present
    ///
    /// With `explicit_present` the queue submission is deferred until
    /// [`GpuDevice::submit_present`]; otherwise a non-zero `present_time`
    /// schedules the flip for that monotonic-nanosecond deadline.
    fn end_present(&mut self, explicit_present: bool, present_time: u64);

    /// Submit a present deferred by `end_present(true, ..)`
    fn submit_present(&mut self);

    /// Flush queued device work without presenting
    fn flush(&mut self);

    /// Read the backbuffer of the last completed present
    ///
    /// # Returns
    /// `(width, height, RGBA8 rows)`, or `None` when the device cannot
    /// read back its backbuffer
    fn read_backbuffer(&self) -> Option<(u32, u32, Vec<u8>)>;

    /// Enable or disable GPU timing collection
    fn set_gpu_timing_enabled(&mut self, enabled: bool);

    /// Whether GPU timing collection is enabled
    fn gpu_timing_enabled(&self) -> bool;
}

/// Creates devices for the worker's reconfigure path
pub trait DeviceFactory: Send + Sync {
    /// Create a device for the given API
    fn create_device(
        &self,
        api: RenderApi,
        request: &DeviceCreateRequest,
    ) -> Result<Box<dyn GpuDevice>>;
}

/// Shared knobs and counters for [`HeadlessDevice`] instances
///
/// The device itself lives on the GPU thread; tests hold a clone of this
/// handle to observe presents and inject failures.
#[derive(Default)]
pub struct HeadlessControls {
    /// Report `should_skip_presenting` as true
    pub skip_present: AtomicBool,
    /// Present results injected ahead of real ones (device-loss tests)
    pub forced_present_results: Mutex<VecDeque<PresentResult>>,
    /// Number of completed presents
    pub present_count: AtomicU32,
    /// Number of idle throttle sleeps
    pub throttle_count: AtomicU32,
    /// Number of devices created so far
    pub device_count: AtomicU32,
}

impl HeadlessControls {
    /// Create a fresh control block
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a present result to be returned by the next `begin_present`
    pub fn force_present_result(&self, result: PresentResult) {
        self.forced_present_results
            .lock()
            .unwrap()
            .push_back(result);
    }
}

struct HeadlessTexture {
    width: u32,
    height: u32,
    format: TextureFormat,
    data: Vec<u8>,
}

/// CPU-memory device
///
/// Textures and the backbuffer are plain byte vectors; presents complete
/// immediately. Supports every [`TextureFormat`].
pub struct HeadlessDevice {
    api: RenderApi,
    window: WindowInfo,
    vsync: VsyncMode,
    disabled_features: u32,
    textures: HashMap<TextureId, HeadlessTexture>,
    next_texture_id: TextureId,
    backbuffer: Vec<u8>,
    gpu_timing: bool,
    controls: Arc<HeadlessControls>,
}

impl HeadlessDevice {
    fn new(api: RenderApi, request: &DeviceCreateRequest, controls: Arc<HeadlessControls>) -> Self {
        let window = request.window;
        Self {
            api,
            window,
            vsync: request.vsync,
            disabled_features: request.disabled_features,
            textures: HashMap::new(),
            next_texture_id: 1,
            backbuffer: vec![0u8; (window.width * window.height * 4) as usize],
            gpu_timing: false,
            controls,
        }
    }

    /// The backbuffer as tightly packed RGBA8 rows
    pub fn backbuffer(&self) -> &[u8] {
        &self.backbuffer
    }
}

impl GpuDevice for HeadlessDevice {
    fn render_api(&self) -> RenderApi {
        self.api
    }

    fn features(&self) -> DeviceFeatures {
        DeviceFeatures {
            explicit_present: false,
            timed_present: false,
            exclusive_fullscreen: false,
            dual_source_blend: self.disabled_features & FeatureMask::DUAL_SOURCE_BLEND == 0,
            framebuffer_fetch: false,
            texture_buffers: self.disabled_features & FeatureMask::TEXTURE_BUFFERS == 0,
            memory_import: false,
            raster_order_views: false,
        }
    }

    fn supports_texture_format(&self, _format: TextureFormat) -> bool {
        true
    }

    fn create_texture(
        &mut self,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> Result<TextureId> {
        if width == 0 || height == 0 {
            return Err(GpuError::InvalidState {
                message: format!("cannot create {}x{} texture", width, height),
            });
        }
        let id = self.next_texture_id;
        self.next_texture_id += 1;
        self.textures.insert(
            id,
            HeadlessTexture {
                width,
                height,
                format,
                data: vec![0u8; (width * height * format.bytes_per_pixel()) as usize],
            },
        );
        Ok(id)
    }

    #[allow(clippy::too_many_arguments)]
    fn update_texture(
        &mut self,
        id: TextureId,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        data: &[u8],
        stride: u32,
    ) -> Result<()> {
        let texture = self.textures.get_mut(&id).ok_or(GpuError::InvalidState {
            message: format!("unknown texture {}", id),
        })?;
        if x + width > texture.width || y + height > texture.height {
            return Err(GpuError::InvalidState {
                message: format!("texture {} update out of bounds", id),
            });
        }
        let bpp = texture.format.bytes_per_pixel();
        let row_bytes = (width * bpp) as usize;
        let dst_stride = (texture.width * bpp) as usize;
        for row in 0..height as usize {
            let src_off = row * stride as usize;
            let dst_off = (y as usize + row) * dst_stride + (x * bpp) as usize;
            texture.data[dst_off..dst_off + row_bytes]
                .copy_from_slice(&data[src_off..src_off + row_bytes]);
        }
        Ok(())
    }

    fn read_texture(&self, id: TextureId) -> Result<(u32, u32, TextureFormat, Vec<u8>)> {
        let texture = self.textures.get(&id).ok_or(GpuError::InvalidState {
            message: format!("unknown texture {}", id),
        })?;
        Ok((
            texture.width,
            texture.height,
            texture.format,
            texture.data.clone(),
        ))
    }

    fn texture_info(&self, id: TextureId) -> Option<(u32, u32, TextureFormat)> {
        self.textures
            .get(&id)
            .map(|t| (t.width, t.height, t.format))
    }

    fn destroy_texture(&mut self, id: TextureId) {
        self.textures.remove(&id);
    }

    fn has_main_swap_chain(&self) -> bool {
        !self.window.surfaceless
    }

    fn window_info(&self) -> WindowInfo {
        self.window
    }

    fn resize_buffers(&mut self, width: u32, height: u32, scale: f32) -> Result<()> {
        self.window.width = width;
        self.window.height = height;
        self.window.scale = scale;
        self.backbuffer = vec![0u8; (width * height * 4) as usize];
        Ok(())
    }

    fn set_vsync_mode(&mut self, mode: VsyncMode, _allow_present_throttle: bool) -> Result<()> {
        self.vsync = mode;
        Ok(())
    }

    fn is_vsync_blocking(&self) -> bool {
        self.vsync == VsyncMode::Fifo
    }

    fn throttle_presentation(&mut self) {
        self.controls.throttle_count.fetch_add(1, Ordering::Relaxed);
        std::thread::sleep(std::time::Duration::from_micros(500));
    }

    fn should_skip_presenting(&self) -> bool {
        self.controls.skip_present.load(Ordering::Relaxed)
    }

    fn begin_present(&mut self) -> PresentResult {
        if let Some(result) = self
            .controls
            .forced_present_results
            .lock()
            .unwrap()
            .pop_front()
        {
            return result;
        }
        self.backbuffer.fill(0);
        PresentResult::Ok
    }

    fn draw_display_texture(
        &mut self,
        id: TextureId,
        dst_x: i32,
        dst_y: i32,
        dst_width: u32,
        dst_height: u32,
    ) {
        let Some(texture) = self.textures.get(&id) else {
            return;
        };
        if texture.width == 0 || texture.height == 0 || dst_width == 0 || dst_height == 0 {
            return;
        }
        let out_w = self.window.width as i32;
        let out_h = self.window.height as i32;
        for dy in 0..dst_height as i32 {
            let oy = dst_y + dy;
            if oy < 0 || oy >= out_h {
                continue;
            }
            let sy = (dy as u32 * texture.height / dst_height).min(texture.height - 1);
            for dx in 0..dst_width as i32 {
                let ox = dst_x + dx;
                if ox < 0 || ox >= out_w {
                    continue;
                }
                let sx = (dx as u32 * texture.width / dst_width).min(texture.width - 1);
                let rgba = sample_rgba8(texture, sx, sy);
                let dst = ((oy * out_w + ox) * 4) as usize;
                self.backbuffer[dst..dst + 4].copy_from_slice(&rgba);
            }
        }
    }

    fn end_present(&mut self, _explicit_present: bool, _present_time: u64) {
        self.controls.present_count.fetch_add(1, Ordering::Relaxed);
    }

    fn submit_present(&mut self) {}

    fn flush(&mut self) {}

    fn read_backbuffer(&self) -> Option<(u32, u32, Vec<u8>)> {
        Some((
            self.window.width,
            self.window.height,
            self.backbuffer.clone(),
        ))
    }

    fn set_gpu_timing_enabled(&mut self, enabled: bool) {
        self.gpu_timing = enabled;
    }

    fn gpu_timing_enabled(&self) -> bool {
        self.gpu_timing
    }
}

/// Convert one texel of any supported format to RGBA8
fn sample_rgba8(texture: &HeadlessTexture, x: u32, y: u32) -> [u8; 4] {
    let bpp = texture.format.bytes_per_pixel();
    let off = ((y * texture.width + x) * bpp) as usize;
    match texture.format {
        TextureFormat::Rgba8 => {
            let d = &texture.data[off..off + 4];
            [d[0], d[1], d[2], d[3]]
        }
        TextureFormat::Bgra8 => {
            let d = &texture.data[off..off + 4];
            [d[2], d[1], d[0], d[3]]
        }
        TextureFormat::Rgb565 => {
            // R in the high bits, B in the low bits.
            let v = u16::from_le_bytes([texture.data[off], texture.data[off + 1]]);
            let r = (((v >> 11) & 0x1F) << 3) as u8;
            let g = (((v >> 5) & 0x3F) << 2) as u8;
            let b = ((v & 0x1F) << 3) as u8;
            [r, g, b, 0xFF]
        }
        TextureFormat::Rgba5551 => {
            // R in bits 10-14, B in the low bits; composite opaque.
            let v = u16::from_le_bytes([texture.data[off], texture.data[off + 1]]);
            let r = (((v >> 10) & 0x1F) << 3) as u8;
            let g = (((v >> 5) & 0x1F) << 3) as u8;
            let b = ((v & 0x1F) << 3) as u8;
            [r, g, b, 0xFF]
        }
    }
}

/// Factory producing [`HeadlessDevice`] instances
pub struct HeadlessDeviceFactory {
    controls: Arc<HeadlessControls>,
    fail_next_creates: AtomicU32,
}

impl HeadlessDeviceFactory {
    /// Create a factory with fresh controls
    pub fn new() -> Self {
        Self {
            controls: Arc::new(HeadlessControls::new()),
            fail_next_creates: AtomicU32::new(0),
        }
    }

    /// The control block shared with every created device
    pub fn controls(&self) -> Arc<HeadlessControls> {
        self.controls.clone()
    }

    /// Make the next `count` creation attempts fail (error-path tests)
    pub fn fail_next_creates(&self, count: u32) {
        self.fail_next_creates.store(count, Ordering::Relaxed);
    }
}

impl Default for HeadlessDeviceFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceFactory for HeadlessDeviceFactory {
    fn create_device(
        &self,
        api: RenderApi,
        request: &DeviceCreateRequest,
    ) -> Result<Box<dyn GpuDevice>> {
        if api == RenderApi::None {
            return Err(GpuError::DeviceCreationFailed {
                api,
                message: "no rendering API selected".to_string(),
            });
        }
        let failures = self.fail_next_creates.load(Ordering::Relaxed);
        if failures > 0 {
            self.fail_next_creates.store(failures - 1, Ordering::Relaxed);
            return Err(GpuError::DeviceCreationFailed {
                api,
                message: "injected creation failure".to_string(),
            });
        }
        self.controls.device_count.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(HeadlessDevice::new(
            api,
            request,
            self.controls.clone(),
        )))
    }
}
