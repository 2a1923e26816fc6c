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

//! GPU worker settings
//!
//! The CPU thread owns the authoritative settings; every reconfigure command
//! carries a full snapshot of this structure, and the GPU thread keeps its
//! own copy so that the two sides never share mutable configuration.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Renderer backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RendererKind {
    /// In-process software rasterizer
    Software,
    /// Host-GPU accelerated backend
    Hardware,
}

impl fmt::Display for RendererKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RendererKind::Software => write!(f, "Software"),
            RendererKind::Hardware => write!(f, "Hardware"),
        }
    }
}

/// Host rendering API used for device creation and presentation
///
/// The software renderer also needs a device for presentation; it simply
/// keeps whatever API is already active instead of forcing a switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenderApi {
    /// No device
    None,
    /// In-process CPU device (tests, headless captures)
    Headless,
    /// Vulkan
    Vulkan,
    /// OpenGL / OpenGL ES
    OpenGl,
    /// Direct3D 11
    Direct3D11,
    /// Direct3D 12
    Direct3D12,
    /// Metal
    Metal,
}

impl fmt::Display for RenderApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderApi::None => write!(f, "None"),
            RenderApi::Headless => write!(f, "Headless"),
            RenderApi::Vulkan => write!(f, "Vulkan"),
            RenderApi::OpenGl => write!(f, "OpenGL"),
            RenderApi::Direct3D11 => write!(f, "Direct3D 11"),
            RenderApi::Direct3D12 => write!(f, "Direct3D 12"),
            RenderApi::Metal => write!(f, "Metal"),
        }
    }
}

/// Exclusive fullscreen policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExclusiveFullscreenControl {
    /// Let the device decide based on the fullscreen request
    Automatic,
    /// Always request exclusive fullscreen when going fullscreen
    Allowed,
    /// Never request exclusive fullscreen
    Disallowed,
}

/// Swapchain vsync mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VsyncMode {
    /// Present immediately, allow tearing
    Disabled,
    /// Block on vertical blank
    Fifo,
    /// Triple-buffered, latest-frame-wins
    Mailbox,
}

/// GPU worker configuration
///
/// Every field changes observable worker behavior:
///
/// - `gpu_renderer` selects the hardware backend or forces software.
/// - `gpu_render_api` selects the device API used for hardware rendering
///   and for software presentation when no device is active yet.
/// - `gpu_adapter` is the device selection string (empty = default).
/// - `gpu_use_debug_device` enables the API validation layer.
/// - The `gpu_disable_*` flags mask individual device feature bits.
/// - `gpu_resolution_scale` is the internal resolution multiplier
///   (0 = derive automatically from the window size).
/// - `display_exclusive_fullscreen_control` gates exclusive fullscreen.
/// - `display_24bit_chroma_smoothing` enables the 24-bit smoothing pass.
/// - `display_show_gpu_usage` enables GPU timing collection.
/// - `display_show_vram` bypasses display geometry and shows all of VRAM.
/// - `command_queue_size`, `wake_threshold` and `max_queued_frames` tune
///   the command ring and frame pacing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuSettings {
    /// Selected renderer backend
    pub gpu_renderer: RendererKind,

    /// Rendering API used for device creation
    pub gpu_render_api: RenderApi,

    /// Adapter (physical device) selection string, empty for default
    pub gpu_adapter: String,

    /// Enable the rendering API's validation/debug layer
    pub gpu_use_debug_device: bool,

    /// Mask the dual-source blending feature bit
    pub gpu_disable_dual_source_blend: bool,

    /// Mask the framebuffer-fetch feature bit
    pub gpu_disable_framebuffer_fetch: bool,

    /// Mask the texture-buffers feature bit
    pub gpu_disable_texture_buffers: bool,

    /// Mask the memory-import feature bit
    pub gpu_disable_memory_import: bool,

    /// Mask the raster-order-views feature bit
    pub gpu_disable_raster_order_views: bool,

    /// Internal resolution multiplier, 0 = automatic
    pub gpu_resolution_scale: u32,

    /// Exclusive fullscreen policy
    pub display_exclusive_fullscreen_control: ExclusiveFullscreenControl,

    /// Chroma smoothing for 24-bit display output
    pub display_24bit_chroma_smoothing: bool,

    /// Collect GPU timing statistics
    pub display_show_gpu_usage: bool,

    /// Debug flag: display the entire 1024x512 VRAM instead of the
    /// configured display rectangle
    pub display_show_vram: bool,

    /// Command ring capacity in bytes
    pub command_queue_size: u32,

    /// Pending-byte threshold at which a plain publish also wakes the
    /// GPU thread
    pub wake_threshold: u32,

    /// Maximum number of in-flight presented frames (1 to 3)
    pub max_queued_frames: u32,
}

impl Default for GpuSettings {
    fn default() -> Self {
        Self {
            gpu_renderer: RendererKind::Software,
            gpu_render_api: RenderApi::Headless,
            gpu_adapter: String::new(),
            gpu_use_debug_device: false,
            gpu_disable_dual_source_blend: false,
            gpu_disable_framebuffer_fetch: false,
            gpu_disable_texture_buffers: false,
            gpu_disable_memory_import: false,
            gpu_disable_raster_order_views: false,
            gpu_resolution_scale: 1,
            display_exclusive_fullscreen_control: ExclusiveFullscreenControl::Automatic,
            display_24bit_chroma_smoothing: false,
            display_show_gpu_usage: false,
            display_show_vram: false,
            command_queue_size: 16 * 1024 * 1024,
            wake_threshold: 64 * 1024,
            max_queued_frames: 2,
        }
    }
}

impl GpuSettings {
    /// Compute the device feature mask from the `gpu_disable_*` flags
    ///
    /// # Returns
    /// Bitmask of [`crate::core::gpu::device::FeatureMask`] bits to disable
    pub fn disabled_feature_mask(&self) -> u32 {
        use crate::core::gpu::device::FeatureMask;

        let mut mask = 0;
        if self.gpu_disable_dual_source_blend {
            mask |= FeatureMask::DUAL_SOURCE_BLEND;
        }
        if self.gpu_disable_framebuffer_fetch {
            mask |= FeatureMask::FRAMEBUFFER_FETCH;
        }
        if self.gpu_disable_texture_buffers {
            mask |= FeatureMask::TEXTURE_BUFFERS;
        }
        if self.gpu_disable_memory_import {
            mask |= FeatureMask::MEMORY_IMPORT;
        }
        if self.gpu_disable_raster_order_views {
            mask |= FeatureMask::RASTER_ORDER_VIEWS;
        }
        mask
    }

    /// Determine the rendering API required for a renderer choice
    ///
    /// The software renderer keeps the currently active API when one exists,
    /// since it only needs the device for presentation.
    ///
    /// # Arguments
    /// * `renderer` - The renderer being configured
    /// * `current_api` - The API of the active device, or `RenderApi::None`
    ///
    /// # Returns
    /// The API the device must be created with
    pub fn render_api_for_renderer(
        &self,
        renderer: RendererKind,
        current_api: RenderApi,
    ) -> RenderApi {
        if renderer == RendererKind::Software && current_api != RenderApi::None {
            current_api
        } else {
            self.gpu_render_api
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = GpuSettings::default();
        assert_eq!(settings.gpu_renderer, RendererKind::Software);
        assert_eq!(settings.command_queue_size, 16 * 1024 * 1024);
        assert_eq!(settings.wake_threshold, 64 * 1024);
        assert_eq!(settings.max_queued_frames, 2);
        assert_eq!(settings.gpu_resolution_scale, 1);
    }

    #[test]
    fn test_disabled_feature_mask() {
        use crate::core::gpu::device::FeatureMask;

        let mut settings = GpuSettings::default();
        assert_eq!(settings.disabled_feature_mask(), 0);

        settings.gpu_disable_dual_source_blend = true;
        settings.gpu_disable_raster_order_views = true;
        let mask = settings.disabled_feature_mask();
        assert_ne!(mask & FeatureMask::DUAL_SOURCE_BLEND, 0);
        assert_ne!(mask & FeatureMask::RASTER_ORDER_VIEWS, 0);
        assert_eq!(mask & FeatureMask::FRAMEBUFFER_FETCH, 0);
    }

    #[test]
    fn test_render_api_for_software_keeps_current() {
        let settings = GpuSettings::default();
        assert_eq!(
            settings.render_api_for_renderer(RendererKind::Software, RenderApi::Vulkan),
            RenderApi::Vulkan
        );
        assert_eq!(
            settings.render_api_for_renderer(RendererKind::Software, RenderApi::None),
            RenderApi::Headless
        );
        assert_eq!(
            settings.render_api_for_renderer(RendererKind::Hardware, RenderApi::Vulkan),
            RenderApi::Headless
        );
    }
}
