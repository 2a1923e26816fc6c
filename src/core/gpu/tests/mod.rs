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

//! GPU worker tests
//!
//! Tests are organized into the following modules:
//! - `commands`: record family encoding and decoding
//! - `ring`: command ring cursors, wraparound, and the wake protocol
//! - `software`: software backend display readout
//! - `worker`: GPU thread lifecycle, reconfiguration, and presentation

mod commands;
mod ring;
mod software;

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use crate::core::error::{GpuError, Result};
use crate::core::gpu::host::{Host, WindowInfo};
use crate::core::settings::RenderApi;

/// Host double recording every callback for assertions
pub(crate) struct TestHost {
    pub width: u32,
    pub height: u32,
    pub osd_messages: Mutex<Vec<(String, String)>>,
    pub fatal_errors: Mutex<Vec<String>>,
    pub resizes: Mutex<Vec<(u32, u32)>>,
    pub new_ui_frames: AtomicU32,
    pub end_ui_frames: AtomicU32,
    pub overlay_renders: AtomicU32,
    pub frames_done: AtomicU32,
    pub window_acquires: AtomicU32,
    pub window_releases: AtomicU32,
    pub fullscreen: AtomicBool,
    pub fullscreen_ui_running: AtomicBool,
    pub fail_window_acquire: AtomicBool,
}

impl TestHost {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            osd_messages: Mutex::new(Vec::new()),
            fatal_errors: Mutex::new(Vec::new()),
            resizes: Mutex::new(Vec::new()),
            new_ui_frames: AtomicU32::new(0),
            end_ui_frames: AtomicU32::new(0),
            overlay_renders: AtomicU32::new(0),
            frames_done: AtomicU32::new(0),
            window_acquires: AtomicU32::new(0),
            window_releases: AtomicU32::new(0),
            fullscreen: AtomicBool::new(false),
            fullscreen_ui_running: AtomicBool::new(false),
            fail_window_acquire: AtomicBool::new(false),
        }
    }

    pub fn osd_message_ids(&self) -> Vec<String> {
        self.osd_messages
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }
}

impl Host for TestHost {
    fn acquire_render_window(
        &self,
        _api: RenderApi,
        fullscreen: bool,
        _exclusive_fullscreen_requested: bool,
    ) -> Result<WindowInfo> {
        if self.fail_window_acquire.load(Ordering::Relaxed) {
            return Err(GpuError::WindowAcquisitionFailed {
                message: "injected failure".to_string(),
            });
        }
        self.window_acquires.fetch_add(1, Ordering::Relaxed);
        self.fullscreen.store(fullscreen, Ordering::Relaxed);
        Ok(WindowInfo {
            width: self.width,
            height: self.height,
            scale: 1.0,
            surfaceless: false,
        })
    }

    fn release_render_window(&self) {
        self.window_releases.fetch_add(1, Ordering::Relaxed);
    }

    fn is_fullscreen(&self) -> bool {
        self.fullscreen.load(Ordering::Relaxed)
    }

    fn set_fullscreen(&self, fullscreen: bool) {
        self.fullscreen.store(fullscreen, Ordering::Relaxed);
    }

    fn add_osd_message(&self, id: &str, _icon: &str, text: &str, _duration: f32) {
        self.osd_messages
            .lock()
            .unwrap()
            .push((id.to_string(), text.to_string()));
    }

    fn report_fatal_error(&self, title: &str, description: &str) {
        self.fatal_errors
            .lock()
            .unwrap()
            .push(format!("{}: {}", title, description));
    }

    fn run_on_cpu_thread(&self, func: Box<dyn FnOnce() + Send>) {
        func();
    }

    fn frame_done_on_gpu_thread(&self, _frame_number: u32) {
        self.frames_done.fetch_add(1, Ordering::Relaxed);
    }

    fn on_render_window_resized(&self, width: u32, height: u32) {
        self.resizes.lock().unwrap().push((width, height));
    }

    fn on_fullscreen_ui_started_or_stopped(&self, running: bool) {
        self.fullscreen_ui_running.store(running, Ordering::Relaxed);
    }

    fn on_fullscreen_ui_active_changed(&self, _active: bool) {}

    fn render_overlays(&self) {
        self.overlay_renders.fetch_add(1, Ordering::Relaxed);
    }

    fn end_ui_frame(&self) {
        self.end_ui_frames.fetch_add(1, Ordering::Relaxed);
    }

    fn new_ui_frame(&self) {
        self.new_ui_frames.fetch_add(1, Ordering::Relaxed);
    }

    fn initialize_fullscreen_ui(&self) -> bool {
        self.fullscreen_ui_running.store(true, Ordering::Relaxed);
        true
    }

    fn shutdown_fullscreen_ui(&self) {
        self.fullscreen_ui_running.store(false, Ordering::Relaxed);
    }
}
