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

//! Shared fixtures for integration tests

use std::sync::Arc;

use prism_core::core::gpu::commands::{
    DrawFlags, DrawMode, DrawPolygonCommand, PolygonVertex, UpdateDisplayCommand,
};
use prism_core::core::gpu::device::{HeadlessControls, HeadlessDeviceFactory};
use prism_core::core::gpu::host::HeadlessHost;
use prism_core::core::gpu::worker::GpuThread;
use prism_core::core::gpu::{CommandParams, TextureWindow};
use prism_core::core::settings::{GpuSettings, RendererKind};

/// A started worker with a software backend on a headless device
pub struct GpuFixture {
    pub gpu: GpuThread,
    pub controls: Arc<HeadlessControls>,
}

impl GpuFixture {
    /// Start the worker and create the software backend
    pub fn software(settings: GpuSettings) -> Self {
        let host = Arc::new(HeadlessHost::new(640, 480));
        let factory = Arc::new(HeadlessDeviceFactory::new());
        let controls = factory.controls();
        let mut gpu = GpuThread::start(host, factory, settings).unwrap();
        gpu.create_backend(RendererKind::Software, false, false, false)
            .unwrap();
        Self { gpu, controls }
    }

    /// Tear the backend down and join the worker
    pub fn finish(mut self) {
        self.gpu.destroy_backend();
        self.gpu.shutdown();
    }
}

/// A flat triangle covering the upper-left of the display area
pub fn test_triangle(color: u32) -> DrawPolygonCommand {
    let mut vertices = [PolygonVertex::default(); 4];
    vertices[0] = PolygonVertex {
        x: 0,
        y: 0,
        color,
        u: 0,
        v: 0,
    };
    vertices[1] = PolygonVertex {
        x: 63,
        y: 0,
        color,
        u: 0,
        v: 0,
    };
    vertices[2] = PolygonVertex {
        x: 0,
        y: 63,
        color,
        u: 0,
        v: 0,
    };
    DrawPolygonCommand {
        flags: DrawFlags::new(),
        draw_mode: DrawMode(0),
        palette: 0,
        window: TextureWindow::default(),
        num_vertices: 3,
        vertices,
    }
}

/// A display update for a 320x240 scanout with presentation enabled
pub fn presented_display() -> UpdateDisplayCommand {
    UpdateDisplayCommand {
        vram_left: 0,
        vram_top: 0,
        vram_width: 320,
        vram_height: 240,
        present_frame: true,
        ..UpdateDisplayCommand::default()
    }
}

/// Default parameters (no interlace, no masking)
pub fn default_params() -> CommandParams {
    CommandParams::default()
}
