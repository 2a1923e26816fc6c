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

//! Command ring throughput benchmarks
//!
//! Measures the CPU-thread cost of pushing work through the ring to a
//! live GPU thread, which is the hot path during emulation.

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};

use prism_core::core::gpu::device::HeadlessDeviceFactory;
use prism_core::core::gpu::host::HeadlessHost;
use prism_core::core::gpu::worker::GpuThread;
use prism_core::core::gpu::CommandParams;
use prism_core::core::settings::{GpuSettings, RendererKind};

fn bench_fill_commands(c: &mut Criterion) {
    let host = Arc::new(HeadlessHost::new(640, 480));
    let factory = Arc::new(HeadlessDeviceFactory::new());
    let mut gpu = GpuThread::start(host, factory, GpuSettings::default()).unwrap();
    gpu.create_backend(RendererKind::Software, false, false, false)
        .unwrap();

    c.bench_function("push_1000_fills_and_sync", |b| {
        b.iter(|| {
            for i in 0..1000u16 {
                gpu.push_fill_vram(i % 512, i % 256, 4, 4, 0x123456, CommandParams::default());
            }
            gpu.sync(false);
        })
    });

    c.bench_function("push_vram_upload_and_sync", |b| {
        let data = vec![0x7FFFu16; 64 * 64];
        b.iter(|| {
            gpu.push_update_vram(0, 0, 64, 64, &data, CommandParams::default());
            gpu.sync(false);
        })
    });

    gpu.destroy_backend();
    gpu.shutdown();
}

criterion_group!(benches, bench_fill_commands);
criterion_main!(benches);
