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

//! Host facade
//!
//! The GPU worker talks to the embedding application through this trait:
//! window acquisition, fullscreen transitions, on-screen messages, fatal
//! errors, and the hooks of the host's immediate-mode UI layer. All methods
//! are called from the GPU thread except where noted.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::core::error::{GpuError, Result};
use crate::core::settings::RenderApi;

/// Display duration for critical-error OSD messages, in seconds
pub const OSD_CRITICAL_ERROR_DURATION: f32 = 10.0;

/// Display duration for informational OSD messages, in seconds
pub const OSD_INFO_DURATION: f32 = 5.0;

/// Information about the host render window
///
/// The GPU thread publishes a copy after every window change; the CPU
/// thread reads it back through
/// [`crate::core::gpu::worker::GpuThread::render_window_info`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowInfo {
    /// Surface width in pixels
    pub width: u32,
    /// Surface height in pixels
    pub height: u32,
    /// UI scale factor
    pub scale: f32,
    /// No drawable surface is attached (headless or minimized)
    pub surfaceless: bool,
}

impl Default for WindowInfo {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            scale: 1.0,
            surfaceless: true,
        }
    }
}

/// Callback surface the GPU worker consumes
///
/// Implementations must be thread-safe: the worker invokes these from the
/// GPU thread while the CPU thread may be running concurrently.
pub trait Host: Send + Sync {
    /// Obtain a render window for device creation
    ///
    /// # Arguments
    /// * `api` - Rendering API the device will be created with
    /// * `fullscreen` - Whether the window should start fullscreen
    /// * `exclusive_fullscreen_requested` - Whether exclusive fullscreen
    ///   will be attempted on this window
    fn acquire_render_window(
        &self,
        api: RenderApi,
        fullscreen: bool,
        exclusive_fullscreen_requested: bool,
    ) -> Result<WindowInfo>;

    /// Release the window previously acquired
    fn release_render_window(&self);

    /// Current fullscreen state
    fn is_fullscreen(&self) -> bool;

    /// Request a fullscreen transition
    fn set_fullscreen(&self, fullscreen: bool);

    /// Show an on-screen message
    ///
    /// # Arguments
    /// * `id` - Stable key; a message with the same key replaces the old one
    /// * `icon` - Icon glyph name, may be empty
    /// * `text` - Message text
    /// * `duration` - Display duration in seconds
    fn add_osd_message(&self, id: &str, icon: &str, text: &str, duration: f32);

    /// Report an unrecoverable error to the user
    fn report_fatal_error(&self, title: &str, description: &str);

    /// Queue a callable for execution on the CPU thread
    fn run_on_cpu_thread(&self, func: Box<dyn FnOnce() + Send>);

    /// A frame finished presenting on the GPU thread
    fn frame_done_on_gpu_thread(&self, frame_number: u32);

    /// The render window changed size
    ///
    /// Delivered on the CPU thread through
    /// [`Host::run_on_cpu_thread`].
    fn on_render_window_resized(&self, _width: u32, _height: u32) {}

    /// The fullscreen UI was started or stopped
    fn on_fullscreen_ui_started_or_stopped(&self, running: bool);

    /// The fullscreen UI became active or inactive
    fn on_fullscreen_ui_active_changed(&self, active: bool);

    /// Render OSD messages, overlays, cursors, and debug windows into the
    /// current UI frame
    fn render_overlays(&self);

    /// Finish the current UI frame without drawing it
    fn end_ui_frame(&self);

    /// Begin a new UI frame
    fn new_ui_frame(&self);

    /// Bring up the fullscreen UI layer
    ///
    /// # Returns
    /// `true` on success
    fn initialize_fullscreen_ui(&self) -> bool;

    /// Tear down the fullscreen UI layer if it is running
    fn shutdown_fullscreen_ui(&self);
}

/// Minimal host for headless operation
///
/// Provides a surfaceless window of a fixed size, logs OSD messages, and
/// runs CPU-thread callables inline. Useful for captures, tests, and the
/// demo binary; a real frontend supplies its own implementation.
pub struct HeadlessHost {
    width: u32,
    height: u32,
    fullscreen: AtomicBool,
    fullscreen_ui: AtomicBool,
}

impl HeadlessHost {
    /// Create a host exposing a `width` x `height` surface
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            fullscreen: AtomicBool::new(false),
            fullscreen_ui: AtomicBool::new(false),
        }
    }
}

impl Host for HeadlessHost {
    fn acquire_render_window(
        &self,
        api: RenderApi,
        fullscreen: bool,
        _exclusive_fullscreen_requested: bool,
    ) -> Result<WindowInfo> {
        if api == RenderApi::None {
            return Err(GpuError::WindowAcquisitionFailed {
                message: "no rendering API requested".to_string(),
            });
        }
        self.fullscreen.store(fullscreen, Ordering::Relaxed);
        Ok(WindowInfo {
            width: self.width,
            height: self.height,
            scale: 1.0,
            surfaceless: false,
        })
    }

    fn release_render_window(&self) {}

    fn is_fullscreen(&self) -> bool {
        self.fullscreen.load(Ordering::Relaxed)
    }

    fn set_fullscreen(&self, fullscreen: bool) {
        self.fullscreen.store(fullscreen, Ordering::Relaxed);
    }

    fn add_osd_message(&self, id: &str, _icon: &str, text: &str, _duration: f32) {
        log::info!("OSD [{}]: {}", id, text);
    }

    fn report_fatal_error(&self, title: &str, description: &str) {
        log::error!("Fatal error: {}: {}", title, description);
    }

    fn run_on_cpu_thread(&self, func: Box<dyn FnOnce() + Send>) {
        // No CPU-thread event loop to queue onto; run inline.
        func();
    }

    fn frame_done_on_gpu_thread(&self, _frame_number: u32) {}

    fn on_fullscreen_ui_started_or_stopped(&self, running: bool) {
        self.fullscreen_ui.store(running, Ordering::Relaxed);
    }

    fn on_fullscreen_ui_active_changed(&self, _active: bool) {}

    fn render_overlays(&self) {}

    fn end_ui_frame(&self) {}

    fn new_ui_frame(&self) {}

    fn initialize_fullscreen_ui(&self) -> bool {
        self.fullscreen_ui.store(true, Ordering::Relaxed);
        true
    }

    fn shutdown_fullscreen_ui(&self) {
        self.fullscreen_ui.store(false, Ordering::Relaxed);
    }
}
