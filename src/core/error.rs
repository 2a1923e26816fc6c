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

/// GPU worker error types
use std::fmt;

use crate::core::settings::{RenderApi, RendererKind};

/// Result type for GPU worker operations
pub type Result<T> = std::result::Result<T, GpuError>;

/// GPU worker error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GpuError {
    /// Host GPU device creation failed
    DeviceCreationFailed {
        /// The rendering API that was requested
        api: RenderApi,
        /// Error description from the device layer
        message: String,
    },

    /// Renderer backend initialization failed
    BackendInitFailed {
        /// The backend that was requested
        renderer: RendererKind,
        /// Error description from the backend
        message: String,
    },

    /// The host could not provide a render window
    WindowAcquisitionFailed {
        /// Error description from the host
        message: String,
    },

    /// The main swapchain could not be resized
    SwapchainResizeFailed {
        /// Requested width in pixels
        width: u32,
        /// Requested height in pixels
        height: u32,
        /// Error description from the device layer
        message: String,
    },

    /// The fullscreen UI layer failed to initialize
    FullscreenUiInitFailed,

    /// An operation required a GPU device but none exists
    NoDevice,

    /// An operation was issued in an invalid worker state
    InvalidState {
        /// Description of the violated precondition
        message: String,
    },

    /// I/O error (screenshot or save-state files)
    IoError {
        /// Error message
        message: String,
    },

    /// Save state was produced by an incompatible version
    SaveStateVersionMismatch {
        /// Version this build writes
        expected: u32,
        /// Version found in the file
        got: u32,
    },
}

impl fmt::Display for GpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuError::DeviceCreationFailed { api, message } => {
                write!(f, "Failed to create {} GPU device: {}", api, message)
            }
            GpuError::BackendInitFailed { renderer, message } => {
                write!(f, "Failed to initialize {} renderer: {}", renderer, message)
            }
            GpuError::WindowAcquisitionFailed { message } => {
                write!(f, "Failed to acquire render window: {}", message)
            }
            GpuError::SwapchainResizeFailed {
                width,
                height,
                message,
            } => {
                write!(
                    f,
                    "Failed to resize swapchain to {}x{}: {}",
                    width, height, message
                )
            }
            GpuError::FullscreenUiInitFailed => {
                write!(f, "Failed to initialize fullscreen UI")
            }
            GpuError::NoDevice => {
                write!(f, "No GPU device available")
            }
            GpuError::InvalidState { message } => {
                write!(f, "Invalid GPU worker state: {}", message)
            }
            GpuError::IoError { message } => {
                write!(f, "I/O error: {}", message)
            }
            GpuError::SaveStateVersionMismatch { expected, got } => {
                write!(
                    f,
                    "Incompatible save state version: expected {}, got {}",
                    expected, got
                )
            }
        }
    }
}

impl std::error::Error for GpuError {}

impl From<std::io::Error> for GpuError {
    fn from(err: std::io::Error) -> Self {
        GpuError::IoError {
            message: err.to_string(),
        }
    }
}
