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

//! End-to-end GPU worker tests through the public API

mod common;

use std::sync::atomic::Ordering;

use common::fixtures::{default_params, presented_display, test_triangle, GpuFixture};
use prism_core::core::gpu::screenshot::ScreenshotMode;
use prism_core::core::settings::GpuSettings;

#[test]
fn test_draw_present_and_read_back() {
    let fixture = GpuFixture::software(GpuSettings::default());
    let gpu = &fixture.gpu;

    // Red triangle into a cleared framebuffer, then present.
    gpu.push_fill_vram(0, 0, 320, 240, 0x000000, default_params());
    gpu.push_draw_polygon(&test_triangle(0x0000FF), default_params());
    gpu.push_update_display(&presented_display(), default_params());
    gpu.sync(false);

    assert_eq!(fixture.controls.present_count.load(Ordering::Relaxed), 1);

    // Inside the triangle is red, outside stays black.
    assert_eq!(gpu.read_vram(10, 10, 1, 1)[0], 0x001F);
    assert_eq!(gpu.read_vram(200, 200, 1, 1)[0], 0x0000);

    fixture.finish();
}

#[test]
fn test_commands_observed_in_publish_order() {
    let fixture = GpuFixture::software(GpuSettings::default());
    let gpu = &fixture.gpu;

    // Later fills overwrite earlier ones; the final color proves order.
    gpu.push_fill_vram(50, 50, 4, 4, 0x0000FF, default_params());
    gpu.push_fill_vram(50, 50, 4, 4, 0x00FF00, default_params());
    gpu.push_fill_vram(50, 50, 4, 4, 0xFF0000, default_params());
    let pixels = gpu.read_vram(50, 50, 4, 4);
    assert!(pixels.iter().all(|&p| p == 31 << 10));

    fixture.finish();
}

#[test]
fn test_small_ring_wraps_transparently() {
    // A deliberately tiny ring forces constant wraparound while a burst
    // of fills flows through.
    let settings = GpuSettings {
        command_queue_size: 4096,
        wake_threshold: 256,
        ..GpuSettings::default()
    };
    let fixture = GpuFixture::software(settings);
    let gpu = &fixture.gpu;

    for i in 0..500u16 {
        gpu.push_fill_vram(i % 64, i / 64, 1, 1, 0xFFFFFF, default_params());
    }
    gpu.sync(false);

    let pixels = gpu.read_vram(0, 0, 64, 8);
    assert!(pixels.iter().take(500).all(|&p| p == 0x7FFF));

    fixture.finish();
}

#[test]
fn test_screenshot_of_presented_frame() {
    let fixture = GpuFixture::software(GpuSettings::default());
    let gpu = &fixture.gpu;

    gpu.push_fill_vram(0, 0, 320, 240, 0x00FF00, default_params());
    gpu.push_update_display(&presented_display(), default_params());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("present.png");
    gpu.save_screenshot(path.clone(), ScreenshotMode::InternalResolution, 90, false);
    gpu.sync(false);

    let image = image::open(&path).unwrap().to_rgba8();
    assert_eq!(image.dimensions(), (320, 240));
    // Green dominates the captured pixel.
    let pixel = image.get_pixel(10, 10);
    assert!(pixel[1] > 200 && pixel[0] < 16 && pixel[2] < 16);

    fixture.finish();
}

#[test]
fn test_save_state_survives_backend_recreation() {
    let mut fixture = GpuFixture::software(GpuSettings::default());

    fixture
        .gpu
        .push_fill_vram(0, 0, 128, 128, 0xFF00FF, default_params());
    let block = fixture.gpu.capture_state();

    // Recreate the backend from scratch (VRAM cleared), then restore.
    fixture
        .gpu
        .create_backend(
            prism_core::core::settings::RendererKind::Software,
            false,
            false,
            false,
        )
        .unwrap();
    assert_eq!(fixture.gpu.read_vram(0, 0, 1, 1)[0], 0);

    fixture.gpu.load_state(block);
    let restored = fixture.gpu.read_vram(0, 0, 128, 128);
    let expected = (31 << 10) | 31;
    assert!(restored.iter().all(|&p| p == expected));

    fixture.finish();
}
