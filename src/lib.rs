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

//! PlayStation 1 emulator GPU worker subsystem
//!
//! This library implements the rendering half of a PlayStation 1 emulator:
//! the command ring that carries rendering work from the emulated-CPU thread
//! to a dedicated GPU thread, the GPU thread's lifecycle and reconfiguration
//! state machine, and a software rasterizer backend that interprets those
//! commands against a 1024x512 16bpp video memory image.
//!
//! The emulated CPU core, disc drive, audio, and host window system are
//! external collaborators; the [`core::gpu::host::Host`] trait is the
//! boundary towards the embedding application.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use prism_core::core::gpu::device::HeadlessDeviceFactory;
//! use prism_core::core::gpu::host::HeadlessHost;
//! use prism_core::core::gpu::worker::GpuThread;
//! use prism_core::core::settings::{GpuSettings, RendererKind};
//!
//! let host = Arc::new(HeadlessHost::new(640, 480));
//! let factory = Arc::new(HeadlessDeviceFactory::new());
//! let mut gpu = GpuThread::start(host, factory, GpuSettings::default()).unwrap();
//! gpu.create_backend(RendererKind::Software, false, false, false).unwrap();
//! // ... push commands ...
//! gpu.destroy_backend();
//! gpu.shutdown();
//! ```

pub mod core;
