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

//! Software backend tests
//!
//! Exercises the backend directly against a headless device, without the
//! worker thread in between.

use std::sync::Mutex;

use super::TestHost;
use crate::core::gpu::backend::{BackendContext, ReadbackBuffer};
use crate::core::gpu::commands::UpdateDisplayCommand;
use crate::core::gpu::device::{
    DeviceCreateRequest, DeviceFactory, GpuDevice, HeadlessDeviceFactory, TextureFormat,
};
use crate::core::gpu::host::WindowInfo;
use crate::core::gpu::software::SoftwareBackend;
use crate::core::gpu::{CommandParams, Vram, VRAM_HEIGHT, VRAM_WIDTH};
use crate::core::settings::{GpuSettings, RenderApi, VsyncMode};

struct Fixture {
    device: Box<dyn GpuDevice>,
    vram: Vram,
    settings: GpuSettings,
    readback: Mutex<ReadbackBuffer>,
    host: TestHost,
}

impl Fixture {
    fn new() -> Self {
        let factory = HeadlessDeviceFactory::new();
        let device = factory
            .create_device(
                RenderApi::Headless,
                &DeviceCreateRequest {
                    adapter: String::new(),
                    debug_device: false,
                    disabled_features: 0,
                    window: WindowInfo {
                        width: 640,
                        height: 480,
                        scale: 1.0,
                        surfaceless: false,
                    },
                    vsync: VsyncMode::Disabled,
                    allow_present_throttle: false,
                    exclusive_fullscreen: None,
                },
            )
            .unwrap();
        Self {
            device,
            vram: Vram::new(),
            settings: GpuSettings::default(),
            readback: Mutex::new(ReadbackBuffer::default()),
            host: TestHost::new(640, 480),
        }
    }

    fn ctx(&mut self) -> BackendContext<'_> {
        BackendContext {
            device: self.device.as_mut(),
            vram: &mut self.vram,
            settings: &self.settings,
            readback: &self.readback,
            host: &self.host,
            params: CommandParams::default(),
        }
    }
}

fn display_cmd(width: u16, height: u16) -> UpdateDisplayCommand {
    UpdateDisplayCommand {
        vram_left: 0,
        vram_top: 0,
        vram_width: width,
        vram_height: height,
        ..UpdateDisplayCommand::default()
    }
}

#[test]
fn test_format_preference_order() {
    let mut fixture = Fixture::new();
    let backend = SoftwareBackend::new(&mut fixture.ctx(), false).unwrap();
    // The headless device supports everything, so the first preference
    // wins in both lists.
    assert_eq!(backend.display_16bit_format(), TextureFormat::Rgb565);
    assert_eq!(backend.display_24bit_format(), TextureFormat::Rgba8);
}

#[test]
fn test_initialize_clears_vram_unless_uploading() {
    let mut fixture = Fixture::new();
    fixture.vram.set_pixel(5, 5, 0x1234);
    let _ = SoftwareBackend::new(&mut fixture.ctx(), true).unwrap();
    assert_eq!(fixture.vram.pixel(5, 5), 0x1234);

    let _ = SoftwareBackend::new(&mut fixture.ctx(), false).unwrap();
    assert_eq!(fixture.vram.pixel(5, 5), 0);
}

#[test]
fn test_update_display_15bit() {
    let mut fixture = Fixture::new();
    let mut backend = SoftwareBackend::new(&mut fixture.ctx(), false).unwrap();
    // Pure red in the top-left corner.
    fixture.vram.set_pixel(0, 0, 0x001F);

    backend.update_display(&mut fixture.ctx(), &display_cmd(4, 2));

    let texture = backend.core().display_texture.expect("display texture set");
    let (width, height, format, data) = fixture.device.read_texture(texture).unwrap();
    assert_eq!((width, height), (4, 2));
    assert_eq!(format, TextureFormat::Rgb565);
    // Red moves to the high five bits in RGB565.
    assert_eq!(u16::from_le_bytes([data[0], data[1]]), 0xF800);
    assert_eq!(u16::from_le_bytes([data[2], data[3]]), 0);
}

#[test]
fn test_update_display_disabled_clears_texture() {
    let mut fixture = Fixture::new();
    let mut backend = SoftwareBackend::new(&mut fixture.ctx(), false).unwrap();
    backend.update_display(&mut fixture.ctx(), &display_cmd(4, 2));
    assert!(backend.core().display_texture.is_some());

    let mut cmd = display_cmd(4, 2);
    cmd.display_disabled = true;
    backend.update_display(&mut fixture.ctx(), &cmd);
    assert!(backend.core().display_texture.is_none());
}

#[test]
fn test_show_vram_reads_whole_image() {
    let mut fixture = Fixture::new();
    let mut backend = SoftwareBackend::new(&mut fixture.ctx(), false).unwrap();
    fixture.settings.display_show_vram = true;

    // Display geometry is tiny, but the debug flag wins.
    backend.update_display(&mut fixture.ctx(), &display_cmd(4, 2));

    let texture = backend.core().display_texture.expect("display texture set");
    let (width, height, _, _) = fixture.device.read_texture(texture).unwrap();
    assert_eq!((width, height), (VRAM_WIDTH, VRAM_HEIGHT));
}

#[test]
fn test_update_display_24bit() {
    let mut fixture = Fixture::new();
    let mut backend = SoftwareBackend::new(&mut fixture.ctx(), false).unwrap();
    // Byte stream 01 02 03 04 05 06 at the start of row 0.
    fixture.vram.set_pixel(0, 0, 0x0201);
    fixture.vram.set_pixel(1, 0, 0x0403);
    fixture.vram.set_pixel(2, 0, 0x0605);

    let mut cmd = display_cmd(2, 1);
    cmd.display_24bit = true;
    backend.update_display(&mut fixture.ctx(), &cmd);

    let texture = backend.core().display_texture.expect("display texture set");
    let (_, _, format, data) = fixture.device.read_texture(texture).unwrap();
    assert_eq!(format, TextureFormat::Rgba8);
    assert_eq!(&data[..8], &[1, 2, 3, 0xFF, 4, 5, 6, 0xFF]);
}

#[test]
fn test_update_display_interlaced_weaves_full_height() {
    let mut fixture = Fixture::new();
    let mut backend = SoftwareBackend::new(&mut fixture.ctx(), false).unwrap();

    let mut cmd = display_cmd(8, 4);
    cmd.interlaced = true;
    cmd.interleaved = true;
    cmd.field = 0;
    backend.update_display(&mut fixture.ctx(), &cmd);

    // 4 display rows, two per field, woven back to full height.
    let texture = backend.core().display_texture.expect("display texture set");
    let (width, height, _, _) = fixture.device.read_texture(texture).unwrap();
    assert_eq!((width, height), (8, 4));
}

#[test]
fn test_read_vram_fills_snapshot() {
    let mut fixture = Fixture::new();
    let mut backend = SoftwareBackend::new(&mut fixture.ctx(), false).unwrap();
    fixture.vram.set_pixel(100, 50, 0x7C1F);
    fixture.vram.clut_mut()[3] = 0x0F0F;

    backend.read_vram(&mut fixture.ctx(), 96, 48, 16, 8);

    let readback = fixture.readback.lock().unwrap();
    assert_eq!(readback.vram[(50 * VRAM_WIDTH + 100) as usize], 0x7C1F);
    assert_eq!(readback.clut[3], 0x0F0F);
}

#[test]
fn test_load_state_overwrites_vram_and_clut() {
    let mut fixture = Fixture::new();
    let mut backend = SoftwareBackend::new(&mut fixture.ctx(), false).unwrap();

    let mut vram = vec![0u16; crate::core::gpu::VRAM_SIZE_WORDS];
    vram[42] = 0x4242;
    let mut clut = vec![0u16; crate::core::gpu::CLUT_SIZE];
    clut[7] = 0x0077;
    let block = crate::core::save_state::GpuStateBlock::new(vram, clut);

    backend.load_state(&mut fixture.ctx(), &block);
    assert_eq!(fixture.vram.pixels()[42], 0x4242);
    assert_eq!(fixture.vram.clut()[7], 0x0077);
}
