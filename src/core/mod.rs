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

//! Core GPU worker components
//!
//! This module contains the building blocks of the GPU worker subsystem:
//! - GPU command ring and record family (CPU thread to GPU thread)
//! - GPU worker thread (backend lifecycle, presentation, recovery)
//! - Software rasterizer backend and VRAM image
//! - Host facade and GPU device abstraction
//! - Settings, errors, save-state block

pub mod error;
pub mod gpu;
pub mod save_state;
pub mod settings;
pub mod threading;

// Re-export commonly used types
pub use error::{GpuError, Result};
pub use gpu::worker::GpuThread;
pub use settings::{GpuSettings, RendererKind};
