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

//! Headless GPU worker demo
//!
//! Spins up the GPU thread with a headless device, renders an animated
//! test scene through the command ring, and optionally writes the final
//! frame to a screenshot file. Useful for smoke-testing the worker without
//! a frontend.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use log::info;

use prism_core::core::gpu::commands::{
    DrawFlags, DrawMode, DrawPolygonCommand, PolygonVertex, UpdateDisplayCommand,
};
use prism_core::core::gpu::device::HeadlessDeviceFactory;
use prism_core::core::gpu::host::HeadlessHost;
use prism_core::core::gpu::screenshot::ScreenshotMode;
use prism_core::core::gpu::worker::GpuThread;
use prism_core::core::gpu::{CommandParams, TextureWindow};
use prism_core::core::settings::{GpuSettings, RendererKind};

/// GPU worker demo driver
#[derive(Parser)]
#[command(name = "prism-gpu")]
#[command(about = "Headless GPU worker demo", long_about = None)]
struct Args {
    /// Number of frames to render
    #[arg(short = 'n', long, default_value = "60")]
    frames: u32,

    /// Display width in pixels
    #[arg(long, default_value = "320")]
    width: u16,

    /// Display height in pixels
    #[arg(long, default_value = "240")]
    height: u16,

    /// Use the hardware backend variant
    #[arg(long)]
    hardware: bool,

    /// Write the final frame to this file (.png or .jpg)
    #[arg(short = 's', long)]
    screenshot: Option<PathBuf>,

    /// Write a GPU save-state block to this file
    #[arg(long)]
    save_state: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("prism-gpu v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    let renderer = if args.hardware {
        RendererKind::Hardware
    } else {
        RendererKind::Software
    };

    let host = Arc::new(HeadlessHost::new(args.width as u32 * 2, args.height as u32 * 2));
    let factory = Arc::new(HeadlessDeviceFactory::new());
    let mut gpu = GpuThread::start(host, factory, GpuSettings::default())?;
    gpu.create_backend(renderer, false, false, false)?;

    info!(
        "Rendering {} frames at {}x{} with the {} renderer",
        args.frames, args.width, args.height, renderer
    );

    let params = CommandParams::default();
    for frame in 0..args.frames {
        // Sky gradient background.
        gpu.push_fill_vram(0, 0, args.width, args.height, 0x402000, params);

        // A shaded triangle spinning its colors over time.
        let phase = (frame % 96) as u32;
        let mut vertices = [PolygonVertex::default(); 4];
        vertices[0] = PolygonVertex {
            x: (args.width / 2) as i16,
            y: 20,
            color: 0x0000FF + (phase << 16),
            u: 0,
            v: 0,
        };
        vertices[1] = PolygonVertex {
            x: 30,
            y: (args.height - 30) as i16,
            color: 0x00FF00 + phase,
            u: 0,
            v: 0,
        };
        vertices[2] = PolygonVertex {
            x: (args.width - 30) as i16,
            y: (args.height - 30) as i16,
            color: 0xFF0000 + (phase << 8),
            u: 0,
            v: 0,
        };
        let triangle = DrawPolygonCommand {
            flags: DrawFlags::new().with_shading(true).with_dither(true),
            draw_mode: DrawMode(0),
            palette: 0,
            window: TextureWindow::default(),
            num_vertices: 3,
            vertices,
        };
        gpu.push_draw_polygon(&triangle, params);

        let display = UpdateDisplayCommand {
            vram_left: 0,
            vram_top: 0,
            vram_width: args.width,
            vram_height: args.height,
            present_frame: true,
            ..UpdateDisplayCommand::default()
        };
        gpu.push_update_display(&display, params);
    }
    gpu.sync(false);
    info!("All frames presented");

    if let Some(path) = &args.screenshot {
        gpu.save_screenshot(path.clone(), ScreenshotMode::InternalResolution, 90, false);
        gpu.sync(false);
        info!("Screenshot written to {}", path.display());
    }

    if let Some(path) = &args.save_state {
        let block = gpu.capture_state();
        block.save_to_file(path)?;
        info!("Save state written to {}", path.display());
    }

    gpu.destroy_backend();
    gpu.shutdown();
    info!("GPU worker shut down cleanly");

    Ok(())
}
