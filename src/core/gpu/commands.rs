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

//! GPU command record family
//!
//! Commands travel through the ring as variable-sized byte records. Every
//! record starts with an 8-byte header; the payload layout is determined by
//! the record type. All multi-byte fields are little-endian at explicit
//! offsets so that the wire format never depends on struct layout.
//!
//! Header layout:
//!
//! | Offset | Field  | Type |
//! |--------|--------|------|
//! | 0      | type   | u8   |
//! | 1      | (pad)  | u8   |
//! | 2      | params | u16  |
//! | 4      | size   | u32  |
//!
//! `size` counts the whole record including the header, rounded up to a
//! 4-byte multiple. Records never cross the ring's capacity boundary; the
//! tail is padded with a `Wraparound` record instead.

use crate::core::error::Result;
use crate::core::gpu::screenshot::ScreenshotRequest;
use crate::core::gpu::TextureWindow;
use crate::core::save_state::GpuStateBlock;
use crate::core::settings::{GpuSettings, RendererKind, VsyncMode};

/// Size of the common record header in bytes
pub const HEADER_SIZE: u32 = 8;

/// Command record types
///
/// Values less than or equal to `Shutdown` are worker-control records; all
/// greater values are routed to the active backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum CommandType {
    /// Padding record that advances the reader to offset 0
    Wraparound = 0,
    /// Type-erased callable executed on the GPU thread
    AsyncCall = 1,
    /// Backend/device reconfiguration request
    Reconfigure = 2,
    /// Final record; the GPU thread exits after consuming it
    Shutdown = 3,

    /// Zero all of VRAM and the CLUT cache
    ClearVram = 4,
    /// Invalidate any backend texture caches
    ClearCache = 5,
    /// Copy a VRAM rectangle into the readback snapshot
    ReadVram = 6,
    /// Solid fill of a VRAM rectangle
    FillVram = 7,
    /// Upload pixel data into a VRAM rectangle
    UpdateVram = 8,
    /// VRAM-to-VRAM rectangle copy
    CopyVram = 9,
    /// Change the drawing (clip) area
    SetDrawingArea = 10,
    /// Refill the CLUT cache from VRAM
    UpdateClut = 11,
    /// Display buffer swap notification
    BufferSwapped = 12,
    /// Recompute the automatic resolution scale
    UpdateResolutionScale = 13,
    /// Overwrite VRAM and CLUT from a save state
    LoadState = 14,
    /// Write a screenshot file from the current display
    RenderScreenshot = 15,
    /// Rasterize a triangle or quad
    DrawPolygon = 16,
    /// Rasterize a triangle or quad with sub-pixel coordinates
    DrawPrecisePolygon = 17,
    /// Rasterize an axis-aligned rectangle
    DrawRectangle = 18,
    /// Rasterize a line strip
    DrawLine = 19,
    /// Select the displayed VRAM region and present
    UpdateDisplay = 20,
}

impl CommandType {
    /// Decode a type byte
    ///
    /// # Returns
    /// `None` for bytes outside the known range
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => CommandType::Wraparound,
            1 => CommandType::AsyncCall,
            2 => CommandType::Reconfigure,
            3 => CommandType::Shutdown,
            4 => CommandType::ClearVram,
            5 => CommandType::ClearCache,
            6 => CommandType::ReadVram,
            7 => CommandType::FillVram,
            8 => CommandType::UpdateVram,
            9 => CommandType::CopyVram,
            10 => CommandType::SetDrawingArea,
            11 => CommandType::UpdateClut,
            12 => CommandType::BufferSwapped,
            13 => CommandType::UpdateResolutionScale,
            14 => CommandType::LoadState,
            15 => CommandType::RenderScreenshot,
            16 => CommandType::DrawPolygon,
            17 => CommandType::DrawPrecisePolygon,
            18 => CommandType::DrawRectangle,
            19 => CommandType::DrawLine,
            20 => CommandType::UpdateDisplay,
            _ => return None,
        })
    }

    /// Whether this record is routed to the backend rather than handled by
    /// the worker loop itself
    #[inline]
    pub fn is_backend_command(self) -> bool {
        self > CommandType::Shutdown
    }
}

/// Round a record size up to the 4-byte slot granularity
#[inline]
pub const fn align_slot_size(size: u32) -> u32 {
    (size + 3) & !3
}

// Little-endian field accessors. Byte slices have no alignment guarantees
// inside the ring, so every access goes through these.

#[inline]
pub(crate) fn read_u16(buf: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([buf[off], buf[off + 1]])
}

#[inline]
pub(crate) fn read_i16(buf: &[u8], off: usize) -> i16 {
    read_u16(buf, off) as i16
}

#[inline]
pub(crate) fn read_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

#[inline]
pub(crate) fn read_u64(buf: &[u8], off: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[off..off + 8]);
    u64::from_le_bytes(bytes)
}

#[inline]
pub(crate) fn read_f32(buf: &[u8], off: usize) -> f32 {
    f32::from_bits(read_u32(buf, off))
}

#[inline]
pub(crate) fn write_u16(buf: &mut [u8], off: usize, value: u16) {
    buf[off..off + 2].copy_from_slice(&value.to_le_bytes());
}

#[inline]
pub(crate) fn write_i16(buf: &mut [u8], off: usize, value: i16) {
    write_u16(buf, off, value as u16);
}

#[inline]
pub(crate) fn write_u32(buf: &mut [u8], off: usize, value: u32) {
    buf[off..off + 4].copy_from_slice(&value.to_le_bytes());
}

#[inline]
pub(crate) fn write_u64(buf: &mut [u8], off: usize, value: u64) {
    buf[off..off + 8].copy_from_slice(&value.to_le_bytes());
}

#[inline]
pub(crate) fn write_f32(buf: &mut [u8], off: usize, value: f32) {
    write_u32(buf, off, value.to_bits());
}

/// Store a boxed payload into a record as a raw pointer
///
/// The GPU thread reconstitutes the box with [`decode_boxed`] and drops it
/// in place, so every encoded pointer is consumed exactly once.
pub(crate) fn encode_boxed<T>(payload: &mut [u8], value: Box<T>) {
    let ptr = Box::into_raw(value) as usize as u64;
    write_u64(payload, 0, ptr);
}

/// Reconstitute a boxed payload stored by [`encode_boxed`]
///
/// # Safety
/// The payload must have been produced by `encode_boxed::<T>` for the same
/// `T`, and must not have been decoded before.
pub(crate) unsafe fn decode_boxed<T>(payload: &[u8]) -> Box<T> {
    let ptr = read_u64(payload, 0) as usize as *mut T;
    Box::from_raw(ptr)
}

/// Type-erased callable executed on the GPU thread between commands
pub type AsyncCallFn = Box<dyn FnOnce(&mut crate::core::gpu::worker::WorkerState) + Send>;

/// Payload of a `Reconfigure` record
///
/// Produced on the CPU thread and consumed on the GPU thread. The result
/// cell lives on the producer's stack; writing through it is sound because
/// `publish_and_sync` does not return until this record has been processed.
pub struct ReconfigureRequest {
    /// Renderer to create, or `None` to tear the backend down
    pub renderer: Option<RendererKind>,
    /// Preserve current VRAM contents into the new backend
    pub upload_vram: bool,
    /// Fullscreen request for a recreated device
    pub fullscreen: Option<bool>,
    /// Start (true) or stop (false) the fullscreen UI
    pub start_fullscreen_ui: Option<bool>,
    /// Vsync mode to apply
    pub vsync_mode: VsyncMode,
    /// Allow throttled presentation without blocking vsync
    pub allow_present_throttle: bool,
    /// Destroy and recreate the device even if the API matches
    pub force_recreate_device: bool,
    /// Settings snapshot the GPU thread adopts
    pub settings: GpuSettings,
    result: *mut Option<Result<()>>,
}

impl ReconfigureRequest {
    /// Create a request whose outcome is written to `result`
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        renderer: Option<RendererKind>,
        upload_vram: bool,
        fullscreen: Option<bool>,
        start_fullscreen_ui: Option<bool>,
        vsync_mode: VsyncMode,
        allow_present_throttle: bool,
        force_recreate_device: bool,
        settings: GpuSettings,
        result: *mut Option<Result<()>>,
    ) -> Self {
        Self {
            renderer,
            upload_vram,
            fullscreen,
            start_fullscreen_ui,
            vsync_mode,
            allow_present_throttle,
            force_recreate_device,
            settings,
            result,
        }
    }

    /// Publish the outcome back to the waiting producer
    pub(crate) fn set_result(&self, value: Result<()>) {
        // The producer is parked in publish_and_sync until this record has
        // been consumed, which keeps the cell alive and unaliased.
        unsafe {
            *self.result = Some(value);
        }
    }
}

/// A rectangle in VRAM coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VramRect {
    /// Left edge X coordinate
    pub x: u16,
    /// Top edge Y coordinate
    pub y: u16,
    /// Width in pixels
    pub width: u16,
    /// Height in pixels
    pub height: u16,
}

impl VramRect {
    /// Payload bytes of a rectangle record
    pub const ENCODED_SIZE: u32 = 8;

    /// Create a rectangle
    pub fn new(x: u16, y: u16, width: u16, height: u16) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub(crate) fn encode(&self, buf: &mut [u8]) {
        write_u16(buf, 0, self.x);
        write_u16(buf, 2, self.y);
        write_u16(buf, 4, self.width);
        write_u16(buf, 6, self.height);
    }

    pub(crate) fn decode(buf: &[u8]) -> Self {
        Self {
            x: read_u16(buf, 0),
            y: read_u16(buf, 2),
            width: read_u16(buf, 4),
            height: read_u16(buf, 6),
        }
    }
}

/// `FillVram` payload: rectangle plus fill color
#[derive(Debug, Clone, Copy)]
pub struct FillVramCommand {
    /// Destination rectangle
    pub rect: VramRect,
    /// 24-bit fill color
    pub color: u32,
}

impl FillVramCommand {
    /// Payload size in bytes
    pub const ENCODED_SIZE: u32 = VramRect::ENCODED_SIZE + 4;

    pub(crate) fn encode(&self, buf: &mut [u8]) {
        self.rect.encode(buf);
        write_u32(buf, 8, self.color);
    }

    pub(crate) fn decode(buf: &[u8]) -> Self {
        Self {
            rect: VramRect::decode(buf),
            color: read_u32(buf, 8),
        }
    }
}

/// `CopyVram` payload
#[derive(Debug, Clone, Copy)]
pub struct CopyVramCommand {
    /// Source rectangle origin X
    pub src_x: u16,
    /// Source rectangle origin Y
    pub src_y: u16,
    /// Destination origin X
    pub dst_x: u16,
    /// Destination origin Y
    pub dst_y: u16,
    /// Width in pixels
    pub width: u16,
    /// Height in pixels
    pub height: u16,
}

impl CopyVramCommand {
    /// Payload size in bytes
    pub const ENCODED_SIZE: u32 = 12;

    pub(crate) fn encode(&self, buf: &mut [u8]) {
        write_u16(buf, 0, self.src_x);
        write_u16(buf, 2, self.src_y);
        write_u16(buf, 4, self.dst_x);
        write_u16(buf, 6, self.dst_y);
        write_u16(buf, 8, self.width);
        write_u16(buf, 10, self.height);
    }

    pub(crate) fn decode(buf: &[u8]) -> Self {
        Self {
            src_x: read_u16(buf, 0),
            src_y: read_u16(buf, 2),
            dst_x: read_u16(buf, 4),
            dst_y: read_u16(buf, 6),
            width: read_u16(buf, 8),
            height: read_u16(buf, 10),
        }
    }
}

/// `SetDrawingArea` payload
#[derive(Debug, Clone, Copy)]
pub struct SetDrawingAreaCommand {
    /// New drawing area, all edges inclusive
    pub area: crate::core::gpu::DrawingArea,
}

impl SetDrawingAreaCommand {
    /// Payload size in bytes
    pub const ENCODED_SIZE: u32 = 8;

    pub(crate) fn encode(&self, buf: &mut [u8]) {
        write_u16(buf, 0, self.area.left);
        write_u16(buf, 2, self.area.top);
        write_u16(buf, 4, self.area.right);
        write_u16(buf, 6, self.area.bottom);
    }

    pub(crate) fn decode(buf: &[u8]) -> Self {
        Self {
            area: crate::core::gpu::DrawingArea {
                left: read_u16(buf, 0),
                top: read_u16(buf, 2),
                right: read_u16(buf, 4),
                bottom: read_u16(buf, 6),
            },
        }
    }
}

/// `UpdateClut` payload
///
/// The palette register packs the CLUT position in VRAM: bits 0-5 are the
/// X coordinate in 16-pixel steps, bits 6-14 the Y coordinate.
#[derive(Debug, Clone, Copy)]
pub struct UpdateClutCommand {
    /// Raw palette register value
    pub reg: u16,
    /// Load 256 entries (8-bit textures) instead of 16
    pub clut_is_8bit: bool,
}

impl UpdateClutCommand {
    /// Payload size in bytes
    pub const ENCODED_SIZE: u32 = 4;

    /// CLUT X position in VRAM pixels
    #[inline]
    pub fn x(&self) -> u32 {
        ((self.reg & 0x3F) as u32) * 16
    }

    /// CLUT Y position in VRAM pixels
    #[inline]
    pub fn y(&self) -> u32 {
        ((self.reg >> 6) & 0x1FF) as u32
    }

    pub(crate) fn encode(&self, buf: &mut [u8]) {
        write_u16(buf, 0, self.reg);
        buf[2] = self.clut_is_8bit as u8;
        buf[3] = 0;
    }

    pub(crate) fn decode(buf: &[u8]) -> Self {
        Self {
            reg: read_u16(buf, 0),
            clut_is_8bit: buf[2] != 0,
        }
    }
}

/// `UpdateDisplay` payload
///
/// Describes which VRAM rectangle is scanned out, how (24-bit, interlaced),
/// and whether the worker should present a frame after the backend has
/// refreshed the display texture.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateDisplayCommand {
    /// Displayed VRAM rectangle left edge
    pub vram_left: u16,
    /// Displayed VRAM rectangle top edge
    pub vram_top: u16,
    /// Displayed VRAM rectangle width
    pub vram_width: u16,
    /// Displayed VRAM rectangle height
    pub vram_height: u16,
    /// 24-bit scanout start X (VRAM pixels); only used in 24-bit mode
    pub start_x: u16,
    /// Interlace field being displayed (0 or 1)
    pub field: u8,
    /// Display is disabled; the display texture is cleared
    pub display_disabled: bool,
    /// VRAM is scanned out as packed 24-bit triples
    pub display_24bit: bool,
    /// Interlaced display is active
    pub interlaced: bool,
    /// Interlaced fields are interleaved in VRAM (line skip)
    pub interleaved: bool,
    /// Present a frame after updating the display texture
    pub present_frame: bool,
    /// The present may be skipped under compositor pressure
    pub allow_present_skip: bool,
    /// Scheduled present time from
    /// [`crate::core::threading::monotonic_nanos`], 0 = immediate
    pub present_time: u64,
}

impl UpdateDisplayCommand {
    /// Payload size in bytes
    pub const ENCODED_SIZE: u32 = 20;

    const FLAG_DISABLED: u8 = 1 << 0;
    const FLAG_24BIT: u8 = 1 << 1;
    const FLAG_INTERLACED: u8 = 1 << 2;
    const FLAG_INTERLEAVED: u8 = 1 << 3;
    const FLAG_PRESENT: u8 = 1 << 4;
    const FLAG_ALLOW_SKIP: u8 = 1 << 5;

    pub(crate) fn encode(&self, buf: &mut [u8]) {
        write_u16(buf, 0, self.vram_left);
        write_u16(buf, 2, self.vram_top);
        write_u16(buf, 4, self.vram_width);
        write_u16(buf, 6, self.vram_height);
        write_u16(buf, 8, self.start_x);
        buf[10] = self.field;
        let mut flags = 0;
        if self.display_disabled {
            flags |= Self::FLAG_DISABLED;
        }
        if self.display_24bit {
            flags |= Self::FLAG_24BIT;
        }
        if self.interlaced {
            flags |= Self::FLAG_INTERLACED;
        }
        if self.interleaved {
            flags |= Self::FLAG_INTERLEAVED;
        }
        if self.present_frame {
            flags |= Self::FLAG_PRESENT;
        }
        if self.allow_present_skip {
            flags |= Self::FLAG_ALLOW_SKIP;
        }
        buf[11] = flags;
        write_u64(buf, 12, self.present_time);
    }

    pub(crate) fn decode(buf: &[u8]) -> Self {
        let flags = buf[11];
        Self {
            vram_left: read_u16(buf, 0),
            vram_top: read_u16(buf, 2),
            vram_width: read_u16(buf, 4),
            vram_height: read_u16(buf, 6),
            start_x: read_u16(buf, 8),
            field: buf[10],
            display_disabled: flags & Self::FLAG_DISABLED != 0,
            display_24bit: flags & Self::FLAG_24BIT != 0,
            interlaced: flags & Self::FLAG_INTERLACED != 0,
            interleaved: flags & Self::FLAG_INTERLEAVED != 0,
            present_frame: flags & Self::FLAG_PRESENT != 0,
            allow_present_skip: flags & Self::FLAG_ALLOW_SKIP != 0,
            present_time: read_u64(buf, 12),
        }
    }
}

/// Render state flags shared by all draw commands
///
/// # Examples
///
/// ```
/// use prism_core::core::gpu::commands::DrawFlags;
///
/// let flags = DrawFlags::new().with_shading(true).with_quad(true);
/// assert!(flags.shading());
/// assert!(flags.quad());
/// assert!(!flags.texture());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawFlags(pub u16);

impl DrawFlags {
    const SHADING: u16 = 1 << 0;
    const TEXTURE: u16 = 1 << 1;
    const RAW_TEXTURE: u16 = 1 << 2;
    const TRANSPARENCY: u16 = 1 << 3;
    const QUAD: u16 = 1 << 4;
    const DITHER: u16 = 1 << 5;

    /// Empty flag set
    pub fn new() -> Self {
        Self(0)
    }

    /// Gouraud shading (per-vertex colors)
    #[inline]
    pub fn shading(self) -> bool {
        self.0 & Self::SHADING != 0
    }

    /// Texture mapping enabled
    #[inline]
    pub fn texture(self) -> bool {
        self.0 & Self::TEXTURE != 0
    }

    /// Raw texture (no color modulation)
    #[inline]
    pub fn raw_texture(self) -> bool {
        self.0 & Self::RAW_TEXTURE != 0
    }

    /// Semi-transparent blending enabled
    #[inline]
    pub fn transparency(self) -> bool {
        self.0 & Self::TRANSPARENCY != 0
    }

    /// Four vertices forming a quad (drawn as two triangles)
    #[inline]
    pub fn quad(self) -> bool {
        self.0 & Self::QUAD != 0
    }

    /// Dithering enabled
    #[inline]
    pub fn dither(self) -> bool {
        self.0 & Self::DITHER != 0
    }

    /// Set the shading flag
    pub fn with_shading(self, on: bool) -> Self {
        self.with(Self::SHADING, on)
    }

    /// Set the texture flag
    pub fn with_texture(self, on: bool) -> Self {
        self.with(Self::TEXTURE, on)
    }

    /// Set the raw-texture flag
    pub fn with_raw_texture(self, on: bool) -> Self {
        self.with(Self::RAW_TEXTURE, on)
    }

    /// Set the transparency flag
    pub fn with_transparency(self, on: bool) -> Self {
        self.with(Self::TRANSPARENCY, on)
    }

    /// Set the quad flag
    pub fn with_quad(self, on: bool) -> Self {
        self.with(Self::QUAD, on)
    }

    /// Set the dither flag
    pub fn with_dither(self, on: bool) -> Self {
        self.with(Self::DITHER, on)
    }

    fn with(self, bit: u16, on: bool) -> Self {
        if on {
            Self(self.0 | bit)
        } else {
            Self(self.0 & !bit)
        }
    }
}

/// Texture page and blend state register for draw commands
///
/// Layout follows the GP0(0xE1) draw mode word: bits 0-3 texture page X
/// base (in 64-pixel steps), bit 4 texture page Y base (0 or 256), bits 5-6
/// semi-transparency mode, bits 7-8 texture color depth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawMode(pub u16);

impl DrawMode {
    /// Build a draw mode register from its fields
    pub fn new(page_x: u16, page_y: u16, blend_mode: u8, texture_depth: u8) -> Self {
        Self(
            (page_x / 64 & 0xF)
                | if page_y >= 256 { 1 << 4 } else { 0 }
                | (((blend_mode & 3) as u16) << 5)
                | (((texture_depth & 3) as u16) << 7),
        )
    }

    /// Texture page base X in VRAM pixels
    #[inline]
    pub fn page_x(self) -> u32 {
        ((self.0 & 0xF) as u32) * 64
    }

    /// Texture page base Y in VRAM pixels
    #[inline]
    pub fn page_y(self) -> u32 {
        (((self.0 >> 4) & 1) as u32) * 256
    }

    /// Semi-transparency mode (0-3)
    #[inline]
    pub fn blend_mode(self) -> u8 {
        ((self.0 >> 5) & 3) as u8
    }

    /// Texture color depth (0 = 4-bit, 1 = 8-bit, 2 = 15-bit)
    #[inline]
    pub fn texture_depth(self) -> u8 {
        ((self.0 >> 7) & 3) as u8
    }
}

/// A polygon vertex with integer coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PolygonVertex {
    /// X coordinate in VRAM space (drawing offset already applied)
    pub x: i16,
    /// Y coordinate in VRAM space
    pub y: i16,
    /// 24-bit color, 0x00BBGGRR
    pub color: u32,
    /// Texture U coordinate
    pub u: u8,
    /// Texture V coordinate
    pub v: u8,
}

impl PolygonVertex {
    /// Encoded size in bytes
    pub const ENCODED_SIZE: u32 = 12;

    pub(crate) fn encode(&self, buf: &mut [u8]) {
        write_i16(buf, 0, self.x);
        write_i16(buf, 2, self.y);
        write_u32(buf, 4, self.color);
        buf[8] = self.u;
        buf[9] = self.v;
        buf[10] = 0;
        buf[11] = 0;
    }

    pub(crate) fn decode(buf: &[u8]) -> Self {
        Self {
            x: read_i16(buf, 0),
            y: read_i16(buf, 2),
            color: read_u32(buf, 4),
            u: buf[8],
            v: buf[9],
        }
    }
}

/// A polygon vertex with sub-pixel coordinates
///
/// Carries both the precise position and the native integer position the
/// software rasterizer falls back to.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PreciseVertex {
    /// Sub-pixel X coordinate
    pub x: f32,
    /// Sub-pixel Y coordinate
    pub y: f32,
    /// Native integer X coordinate
    pub native_x: i16,
    /// Native integer Y coordinate
    pub native_y: i16,
    /// 24-bit color, 0x00BBGGRR
    pub color: u32,
    /// Texture U coordinate
    pub u: u8,
    /// Texture V coordinate
    pub v: u8,
}

impl PreciseVertex {
    /// Encoded size in bytes
    pub const ENCODED_SIZE: u32 = 20;

    pub(crate) fn encode(&self, buf: &mut [u8]) {
        write_f32(buf, 0, self.x);
        write_f32(buf, 4, self.y);
        write_i16(buf, 8, self.native_x);
        write_i16(buf, 10, self.native_y);
        write_u32(buf, 12, self.color);
        buf[16] = self.u;
        buf[17] = self.v;
        buf[18] = 0;
        buf[19] = 0;
    }

    pub(crate) fn decode(buf: &[u8]) -> Self {
        Self {
            x: read_f32(buf, 0),
            y: read_f32(buf, 4),
            native_x: read_i16(buf, 8),
            native_y: read_i16(buf, 10),
            color: read_u32(buf, 12),
            u: buf[16],
            v: buf[17],
        }
    }

    /// Project to the integer vertex the software rasterizer consumes
    pub fn to_native(&self) -> PolygonVertex {
        PolygonVertex {
            x: self.native_x,
            y: self.native_y,
            color: self.color,
            u: self.u,
            v: self.v,
        }
    }
}

/// A line vertex
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineVertex {
    /// X coordinate in VRAM space
    pub x: i16,
    /// Y coordinate in VRAM space
    pub y: i16,
    /// 24-bit color, 0x00BBGGRR
    pub color: u32,
}

impl LineVertex {
    /// Encoded size in bytes
    pub const ENCODED_SIZE: u32 = 8;

    pub(crate) fn encode(&self, buf: &mut [u8]) {
        write_i16(buf, 0, self.x);
        write_i16(buf, 2, self.y);
        write_u32(buf, 4, self.color);
    }

    pub(crate) fn decode(buf: &[u8]) -> Self {
        Self {
            x: read_i16(buf, 0),
            y: read_i16(buf, 2),
            color: read_u32(buf, 4),
        }
    }
}

/// `DrawPolygon` payload: fixed header plus 3 or 4 trailing vertices
#[derive(Debug, Clone, Copy)]
pub struct DrawPolygonCommand {
    /// Render state flags
    pub flags: DrawFlags,
    /// Texture page / blend register
    pub draw_mode: DrawMode,
    /// Palette register for 4/8-bit textures
    pub palette: u16,
    /// Texture window active for this draw
    pub window: TextureWindow,
    /// Number of valid vertices (3 or 4)
    pub num_vertices: u8,
    /// Vertex storage; entries past `num_vertices` are unused
    pub vertices: [PolygonVertex; 4],
}

impl DrawPolygonCommand {
    const FIXED_SIZE: u32 = 12;

    /// Payload size for a vertex count
    pub fn payload_size(num_vertices: u32) -> u32 {
        Self::FIXED_SIZE + num_vertices * PolygonVertex::ENCODED_SIZE
    }

    pub(crate) fn encode(&self, buf: &mut [u8]) {
        write_u16(buf, 0, self.flags.0);
        write_u16(buf, 2, self.draw_mode.0);
        write_u16(buf, 4, self.palette);
        buf[6] = self.num_vertices;
        buf[7] = 0;
        write_u32(buf, 8, self.window.to_u32());
        let mut off = Self::FIXED_SIZE as usize;
        for vertex in &self.vertices[..self.num_vertices as usize] {
            vertex.encode(&mut buf[off..off + PolygonVertex::ENCODED_SIZE as usize]);
            off += PolygonVertex::ENCODED_SIZE as usize;
        }
    }

    pub(crate) fn decode(buf: &[u8]) -> Self {
        let num_vertices = buf[6].min(4);
        let mut vertices = [PolygonVertex::default(); 4];
        let mut off = Self::FIXED_SIZE as usize;
        for vertex in vertices.iter_mut().take(num_vertices as usize) {
            *vertex = PolygonVertex::decode(&buf[off..off + PolygonVertex::ENCODED_SIZE as usize]);
            off += PolygonVertex::ENCODED_SIZE as usize;
        }
        Self {
            flags: DrawFlags(read_u16(buf, 0)),
            draw_mode: DrawMode(read_u16(buf, 2)),
            palette: read_u16(buf, 4),
            window: TextureWindow::from_u32(read_u32(buf, 8)),
            num_vertices,
            vertices,
        }
    }
}

/// `DrawPrecisePolygon` payload
#[derive(Debug, Clone, Copy)]
pub struct DrawPrecisePolygonCommand {
    /// Render state flags
    pub flags: DrawFlags,
    /// Texture page / blend register
    pub draw_mode: DrawMode,
    /// Palette register for 4/8-bit textures
    pub palette: u16,
    /// Texture window active for this draw
    pub window: TextureWindow,
    /// Number of valid vertices (3 or 4)
    pub num_vertices: u8,
    /// Vertex storage; entries past `num_vertices` are unused
    pub vertices: [PreciseVertex; 4],
}

impl DrawPrecisePolygonCommand {
    const FIXED_SIZE: u32 = 12;

    /// Payload size for a vertex count
    pub fn payload_size(num_vertices: u32) -> u32 {
        Self::FIXED_SIZE + num_vertices * PreciseVertex::ENCODED_SIZE
    }

    pub(crate) fn encode(&self, buf: &mut [u8]) {
        write_u16(buf, 0, self.flags.0);
        write_u16(buf, 2, self.draw_mode.0);
        write_u16(buf, 4, self.palette);
        buf[6] = self.num_vertices;
        buf[7] = 0;
        write_u32(buf, 8, self.window.to_u32());
        let mut off = Self::FIXED_SIZE as usize;
        for vertex in &self.vertices[..self.num_vertices as usize] {
            vertex.encode(&mut buf[off..off + PreciseVertex::ENCODED_SIZE as usize]);
            off += PreciseVertex::ENCODED_SIZE as usize;
        }
    }

    pub(crate) fn decode(buf: &[u8]) -> Self {
        let num_vertices = buf[6].min(4);
        let mut vertices = [PreciseVertex::default(); 4];
        let mut off = Self::FIXED_SIZE as usize;
        for vertex in vertices.iter_mut().take(num_vertices as usize) {
            *vertex = PreciseVertex::decode(&buf[off..off + PreciseVertex::ENCODED_SIZE as usize]);
            off += PreciseVertex::ENCODED_SIZE as usize;
        }
        Self {
            flags: DrawFlags(read_u16(buf, 0)),
            draw_mode: DrawMode(read_u16(buf, 2)),
            palette: read_u16(buf, 4),
            window: TextureWindow::from_u32(read_u32(buf, 8)),
            num_vertices,
            vertices,
        }
    }

    /// Convert to the integer polygon command the rasterizer consumes
    pub fn to_native(&self) -> DrawPolygonCommand {
        let mut vertices = [PolygonVertex::default(); 4];
        for (dst, src) in vertices
            .iter_mut()
            .zip(self.vertices.iter())
            .take(self.num_vertices as usize)
        {
            *dst = src.to_native();
        }
        DrawPolygonCommand {
            flags: self.flags,
            draw_mode: self.draw_mode,
            palette: self.palette,
            window: self.window,
            num_vertices: self.num_vertices,
            vertices,
        }
    }
}

/// `DrawRectangle` payload
#[derive(Debug, Clone, Copy)]
pub struct DrawRectangleCommand {
    /// Render state flags (quad/shading unused for rectangles)
    pub flags: DrawFlags,
    /// Texture page / blend register
    pub draw_mode: DrawMode,
    /// Palette register for 4/8-bit textures
    pub palette: u16,
    /// Texture window active for this draw
    pub window: TextureWindow,
    /// Top-left X coordinate in VRAM space
    pub x: i16,
    /// Top-left Y coordinate in VRAM space
    pub y: i16,
    /// Width in pixels
    pub width: u16,
    /// Height in pixels
    pub height: u16,
    /// 24-bit color, 0x00BBGGRR
    pub color: u32,
    /// Texture U coordinate of the top-left corner
    pub u: u8,
    /// Texture V coordinate of the top-left corner
    pub v: u8,
}

impl DrawRectangleCommand {
    /// Payload size in bytes
    pub const ENCODED_SIZE: u32 = 28;

    pub(crate) fn encode(&self, buf: &mut [u8]) {
        write_u16(buf, 0, self.flags.0);
        write_u16(buf, 2, self.draw_mode.0);
        write_u16(buf, 4, self.palette);
        buf[6] = 0;
        buf[7] = 0;
        write_u32(buf, 8, self.window.to_u32());
        write_i16(buf, 12, self.x);
        write_i16(buf, 14, self.y);
        write_u16(buf, 16, self.width);
        write_u16(buf, 18, self.height);
        write_u32(buf, 20, self.color);
        buf[24] = self.u;
        buf[25] = self.v;
        buf[26] = 0;
        buf[27] = 0;
    }

    pub(crate) fn decode(buf: &[u8]) -> Self {
        Self {
            flags: DrawFlags(read_u16(buf, 0)),
            draw_mode: DrawMode(read_u16(buf, 2)),
            palette: read_u16(buf, 4),
            window: TextureWindow::from_u32(read_u32(buf, 8)),
            x: read_i16(buf, 12),
            y: read_i16(buf, 14),
            width: read_u16(buf, 16),
            height: read_u16(buf, 18),
            color: read_u32(buf, 20),
            u: buf[24],
            v: buf[25],
        }
    }
}

/// `DrawLine` payload: fixed header plus trailing vertex list
///
/// Vertices are consumed pairwise, so a polyline of N segments carries
/// 2N vertices.
#[derive(Debug, Clone)]
pub struct DrawLineCommand {
    /// Render state flags (only shading and transparency apply)
    pub flags: DrawFlags,
    /// Blend state register
    pub draw_mode: DrawMode,
    /// Line vertices
    pub vertices: Vec<LineVertex>,
}

impl DrawLineCommand {
    const FIXED_SIZE: u32 = 8;

    /// Payload size for a vertex count
    pub fn payload_size(num_vertices: u32) -> u32 {
        Self::FIXED_SIZE + num_vertices * LineVertex::ENCODED_SIZE
    }

    pub(crate) fn encode(&self, buf: &mut [u8]) {
        write_u16(buf, 0, self.flags.0);
        write_u16(buf, 2, self.draw_mode.0);
        write_u16(buf, 4, self.vertices.len() as u16);
        buf[6] = 0;
        buf[7] = 0;
        let mut off = Self::FIXED_SIZE as usize;
        for vertex in &self.vertices {
            vertex.encode(&mut buf[off..off + LineVertex::ENCODED_SIZE as usize]);
            off += LineVertex::ENCODED_SIZE as usize;
        }
    }

    pub(crate) fn decode(buf: &[u8]) -> Self {
        let count = read_u16(buf, 4) as usize;
        let mut vertices = Vec::with_capacity(count);
        let mut off = Self::FIXED_SIZE as usize;
        for _ in 0..count {
            vertices.push(LineVertex::decode(
                &buf[off..off + LineVertex::ENCODED_SIZE as usize],
            ));
            off += LineVertex::ENCODED_SIZE as usize;
        }
        Self {
            flags: DrawFlags(read_u16(buf, 0)),
            draw_mode: DrawMode(read_u16(buf, 2)),
            vertices,
        }
    }
}

/// A decoded backend command
///
/// Bulk pixel data stays borrowed from the ring; the slot remains valid for
/// the duration of the dispatch because the read cursor is only advanced
/// after the batch.
pub enum BackendCommand<'a> {
    /// Zero VRAM and the CLUT cache
    ClearVram,
    /// Invalidate texture caches
    ClearCache,
    /// Copy a VRAM rectangle into the readback snapshot
    ReadVram(VramRect),
    /// Solid fill
    FillVram(FillVramCommand),
    /// Pixel upload; data is raw little-endian u16 pixels
    UpdateVram(VramRect, &'a [u8]),
    /// VRAM-to-VRAM copy
    CopyVram(CopyVramCommand),
    /// Clip rectangle change
    SetDrawingArea(SetDrawingAreaCommand),
    /// CLUT cache refill
    UpdateClut(UpdateClutCommand),
    /// Display buffer swap notification
    BufferSwapped,
    /// Recompute the automatic resolution scale
    UpdateResolutionScale,
    /// Overwrite VRAM and CLUT from a save state
    LoadState(Box<GpuStateBlock>),
    /// Write a screenshot file
    RenderScreenshot(Box<ScreenshotRequest>),
    /// Triangle or quad
    DrawPolygon(DrawPolygonCommand),
    /// Triangle or quad with sub-pixel coordinates
    DrawPrecisePolygon(DrawPrecisePolygonCommand),
    /// Axis-aligned rectangle
    DrawRectangle(DrawRectangleCommand),
    /// Line strip
    DrawLine(DrawLineCommand),
    /// Display scanout change, optionally presenting
    UpdateDisplay(UpdateDisplayCommand),
}

/// Decode a backend-range record from its payload bytes
///
/// Trusts the payload to have been produced by the matching builder; the
/// boxed variants reconstitute pointers, so this stays crate-internal.
pub(crate) fn decode_backend_command(ty: CommandType, payload: &[u8]) -> BackendCommand<'_> {
    debug_assert!(ty.is_backend_command());
    match ty {
        CommandType::ClearVram => BackendCommand::ClearVram,
        CommandType::ClearCache => BackendCommand::ClearCache,
        CommandType::ReadVram => BackendCommand::ReadVram(VramRect::decode(payload)),
        CommandType::FillVram => BackendCommand::FillVram(FillVramCommand::decode(payload)),
        CommandType::UpdateVram => {
            let rect = VramRect::decode(payload);
            let data_len = (rect.width as usize) * (rect.height as usize) * 2;
            let data = &payload[VramRect::ENCODED_SIZE as usize..][..data_len];
            BackendCommand::UpdateVram(rect, data)
        }
        CommandType::CopyVram => BackendCommand::CopyVram(CopyVramCommand::decode(payload)),
        CommandType::SetDrawingArea => {
            BackendCommand::SetDrawingArea(SetDrawingAreaCommand::decode(payload))
        }
        CommandType::UpdateClut => BackendCommand::UpdateClut(UpdateClutCommand::decode(payload)),
        CommandType::BufferSwapped => BackendCommand::BufferSwapped,
        CommandType::UpdateResolutionScale => BackendCommand::UpdateResolutionScale,
        CommandType::LoadState => {
            // Consumed exactly once: the producer encoded a fresh box.
            BackendCommand::LoadState(unsafe { decode_boxed::<GpuStateBlock>(payload) })
        }
        CommandType::RenderScreenshot => {
            BackendCommand::RenderScreenshot(unsafe { decode_boxed::<ScreenshotRequest>(payload) })
        }
        CommandType::DrawPolygon => {
            BackendCommand::DrawPolygon(DrawPolygonCommand::decode(payload))
        }
        CommandType::DrawPrecisePolygon => {
            BackendCommand::DrawPrecisePolygon(DrawPrecisePolygonCommand::decode(payload))
        }
        CommandType::DrawRectangle => {
            BackendCommand::DrawRectangle(DrawRectangleCommand::decode(payload))
        }
        CommandType::DrawLine => BackendCommand::DrawLine(DrawLineCommand::decode(payload)),
        CommandType::UpdateDisplay => {
            BackendCommand::UpdateDisplay(UpdateDisplayCommand::decode(payload))
        }
        _ => unreachable!("worker-control command routed to backend"),
    }
}
