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

//! GPU save-state block
//!
//! The GPU's persisted state is the raw VRAM image (1024x512 16-bit pixels)
//! plus the CLUT cache, serialized with bincode inside the emulator's larger
//! save-state stream. Loading goes through the command ring as a `LoadState`
//! record carrying the pre-decoded block, so the overwrite happens on the
//! GPU thread in command order.
//!
//! # Version Compatibility
//!
//! The block carries a version number; loading a block written by an
//! incompatible version fails with
//! [`crate::core::error::GpuError::SaveStateVersionMismatch`].

use bincode::{config, Decode, Encode};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use crate::core::error::{GpuError, Result};
use crate::core::gpu::{CLUT_SIZE, VRAM_SIZE_WORDS};

/// GPU state block version for compatibility checking
pub const GPU_STATE_VERSION: u32 = 1;

/// Metadata recorded with each state block
#[derive(Debug, Clone, Serialize, Deserialize, Encode, Decode)]
pub struct GpuStateMetadata {
    /// Creation time, RFC 3339
    pub created_at: String,
    /// Free-form tag supplied by the frontend
    pub tag: String,
}

impl Default for GpuStateMetadata {
    fn default() -> Self {
        Self {
            created_at: Utc::now().to_rfc3339(),
            tag: String::new(),
        }
    }
}

/// Serialized GPU state: VRAM plus CLUT
#[derive(Debug, Clone, Serialize, Deserialize, Encode, Decode)]
pub struct GpuStateBlock {
    /// Version number for compatibility checking
    pub version: u32,

    /// Block metadata
    pub metadata: GpuStateMetadata,

    /// VRAM pixels, row-major, 1024x512
    pub vram: Vec<u16>,

    /// CLUT cache, 256 entries
    pub clut: Vec<u16>,
}

impl GpuStateBlock {
    /// Create a block from VRAM and CLUT snapshots
    pub fn new(vram: Vec<u16>, clut: Vec<u16>) -> Self {
        debug_assert_eq!(vram.len(), VRAM_SIZE_WORDS);
        debug_assert_eq!(clut.len(), CLUT_SIZE);
        Self {
            version: GPU_STATE_VERSION,
            metadata: GpuStateMetadata::default(),
            vram,
            clut,
        }
    }

    /// Validate the version field
    pub fn check_version(&self) -> Result<()> {
        if self.version != GPU_STATE_VERSION {
            return Err(GpuError::SaveStateVersionMismatch {
                expected: GPU_STATE_VERSION,
                got: self.version,
            });
        }
        Ok(())
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::encode_to_vec(self, config::standard()).map_err(|e| GpuError::IoError {
            message: format!("failed to encode GPU state: {}", e),
        })
    }

    /// Deserialize from bytes and validate the version
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let (block, _): (Self, usize) = bincode::decode_from_slice(data, config::standard())
            .map_err(|e| GpuError::IoError {
                message: format!("failed to decode GPU state: {}", e),
            })?;
        block.check_version()?;
        Ok(block)
    }

    /// Write the block to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = self.to_bytes()?;
        let mut file = File::create(path)?;
        file.write_all(&bytes)?;
        Ok(())
    }

    /// Read a block from a file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        Self::from_bytes(&bytes)
    }
}
