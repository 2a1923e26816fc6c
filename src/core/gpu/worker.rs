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

//! GPU worker thread
//!
//! [`GpuThread`] is the CPU-thread handle: it starts the worker, builds and
//! publishes command records, and tears everything down. [`WorkerState`] is
//! the GPU-thread side: it drains the ring, dispatches to the active
//! backend, reconfigures devices and backends, presents frames, and
//! recovers from device loss.
//!
//! Lifecycle states, derived from what currently exists:
//! - Idle: no device
//! - DeviceOnly: device but no backend (fullscreen UI only)
//! - Running: device and backend
//!
//! The worker leaves Running through a reconfigure record and exits through
//! the final `Shutdown` record, which must be the last record ever
//! published.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::core::error::{GpuError, Result};
use crate::core::gpu::backend::{
    BackendContext, BackendStats, FramePacing, GpuBackend, ReadbackBuffer,
};
use crate::core::gpu::commands::{
    decode_backend_command, decode_boxed, encode_boxed, AsyncCallFn, BackendCommand, CommandType,
    CopyVramCommand, DrawLineCommand, DrawPolygonCommand, DrawPrecisePolygonCommand,
    DrawRectangleCommand, FillVramCommand, ReconfigureRequest, SetDrawingAreaCommand,
    UpdateClutCommand, UpdateDisplayCommand, VramRect, HEADER_SIZE,
};
use crate::core::gpu::device::{DeviceCreateRequest, DeviceFactory, PresentResult};
use crate::core::gpu::hardware::HardwareBackend;
use crate::core::gpu::host::{Host, WindowInfo, OSD_CRITICAL_ERROR_DURATION};
use crate::core::gpu::ring::{CommandRing, RingConfig};
use crate::core::gpu::screenshot::{ScreenshotMode, ScreenshotRequest};
use crate::core::gpu::software::SoftwareBackend;
use crate::core::gpu::{CommandParams, DrawingArea, Vram, VRAM_HEIGHT, VRAM_WIDTH};
use crate::core::save_state::GpuStateBlock;
use crate::core::settings::{
    ExclusiveFullscreenControl, GpuSettings, RenderApi, RendererKind, VsyncMode,
};

/// Consecutive presents that may be skipped before one is forced through
pub const MAX_SKIPPED_PRESENT_COUNT: u32 = 50;

/// Minimum interval between device-loss recoveries; a second loss inside
/// this window is fatal
const MIN_TIME_BETWEEN_DEVICE_RESETS: Duration = Duration::from_secs(15);

/// Derived worker lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    /// No device exists
    Idle,
    /// A device exists but no backend (fullscreen UI only)
    DeviceOnly,
    /// Device and backend exist
    Running,
}

/// State shared between the CPU-thread handle and the GPU thread
pub(crate) struct SharedState {
    pub ring: CommandRing,
    pub pacing: FramePacing,
    pub readback: Mutex<ReadbackBuffer>,
    pub window_info: RwLock<WindowInfo>,
    pub run_idle: AtomicBool,
    pub requested_renderer: Mutex<Option<RendererKind>>,
}

/// CPU-thread handle to the GPU worker
///
/// Creating one spawns the GPU thread; [`GpuThread::shutdown`] publishes
/// the final record and joins it. All `push_*` methods build a command
/// record in the ring; ordering between them is the publish order.
pub struct GpuThread {
    shared: Arc<SharedState>,
    host: Arc<dyn Host>,
    join: Option<JoinHandle<()>>,
    settings: GpuSettings,
    vsync_mode: VsyncMode,
    allow_present_throttle: bool,
}

impl GpuThread {
    /// Start the GPU thread
    ///
    /// # Arguments
    /// * `host` - Host facade the worker calls back into
    /// * `factory` - Device factory used by reconfiguration
    /// * `settings` - Initial settings (ring sizing is taken from here)
    pub fn start(
        host: Arc<dyn Host>,
        factory: Arc<dyn DeviceFactory>,
        settings: GpuSettings,
    ) -> Result<Self> {
        let shared = Arc::new(SharedState {
            ring: CommandRing::new(RingConfig {
                capacity: settings.command_queue_size,
                wake_threshold: settings.wake_threshold,
            }),
            pacing: FramePacing::new(settings.max_queued_frames),
            readback: Mutex::new(ReadbackBuffer::default()),
            window_info: RwLock::new(WindowInfo::default()),
            run_idle: AtomicBool::new(false),
            requested_renderer: Mutex::new(None),
        });

        let worker = WorkerState::new(shared.clone(), host.clone(), factory, settings.clone());
        let join = std::thread::Builder::new()
            .name("GPU Thread".to_string())
            .spawn(move || worker.run())
            .map_err(|e| GpuError::InvalidState {
                message: format!("failed to spawn GPU thread: {}", e),
            })?;

        Ok(Self {
            shared,
            host,
            join: Some(join),
            settings,
            vsync_mode: VsyncMode::Disabled,
            allow_present_throttle: false,
        })
    }

    /// Whether the GPU thread is running
    pub fn is_started(&self) -> bool {
        self.join.is_some()
    }

    /// The CPU-side settings copy
    pub fn settings(&self) -> &GpuSettings {
        &self.settings
    }

    /// The renderer most recently requested by the CPU thread
    pub fn requested_renderer(&self) -> Option<RendererKind> {
        *self.shared.requested_renderer.lock().unwrap()
    }

    /// Latest render window information published by the GPU thread
    pub fn render_window_info(&self) -> WindowInfo {
        *self.shared.window_info.read().unwrap()
    }

    /// The frame pacing gate (test observability)
    pub fn frame_pacing(&self) -> &crate::core::gpu::backend::FramePacing {
        &self.shared.pacing
    }

    /// Create (or replace) the renderer backend
    ///
    /// Blocks until the GPU thread has completed the reconfiguration; the
    /// new configuration is active when this returns.
    pub fn create_backend(
        &mut self,
        renderer: RendererKind,
        upload_vram: bool,
        fullscreen: bool,
        force_recreate_device: bool,
    ) -> Result<()> {
        *self.shared.requested_renderer.lock().unwrap() = Some(renderer);
        self.reconfigure(
            Some(renderer),
            upload_vram,
            fullscreen.then_some(true),
            None,
            force_recreate_device,
        )
    }

    /// Destroy the renderer backend (and the device, unless the fullscreen
    /// UI still needs it)
    pub fn destroy_backend(&mut self) {
        if let Err(e) = self.reconfigure(None, false, None, None, false) {
            log::error!("Failed to destroy GPU backend: {}", e);
        }
        *self.shared.requested_renderer.lock().unwrap() = None;
    }

    /// Bring up the fullscreen UI
    pub fn start_fullscreen_ui(&mut self, fullscreen: bool) -> Result<()> {
        if self.requested_renderer().is_some() {
            // A device already exists; just flip the flag on the thread.
            self.run_on_thread(|w| w.set_fullscreen_ui_requested(true));
            return Ok(());
        }
        self.reconfigure(None, false, Some(fullscreen), Some(true), false)
    }

    /// Tear down the fullscreen UI
    pub fn stop_fullscreen_ui(&mut self) {
        if self.requested_renderer().is_some() {
            self.run_on_thread(|w| w.set_fullscreen_ui_requested(false));
            return;
        }
        if let Err(e) = self.reconfigure(None, false, None, Some(false), false) {
            log::error!("Failed to stop fullscreen UI: {}", e);
        }
    }

    fn reconfigure(
        &self,
        renderer: Option<RendererKind>,
        upload_vram: bool,
        fullscreen: Option<bool>,
        start_fullscreen_ui: Option<bool>,
        force_recreate_device: bool,
    ) -> Result<()> {
        log::info!("Reconfiguring GPU thread.");

        let mut outcome: Option<Result<()>> = None;
        let request = Box::new(ReconfigureRequest::new(
            renderer,
            upload_vram,
            fullscreen,
            start_fullscreen_ui,
            self.vsync_mode,
            self.allow_present_throttle,
            force_recreate_device,
            self.settings.clone(),
            &mut outcome,
        ));

        let mut slot = self
            .shared
            .ring
            .allocate(CommandType::Reconfigure, 0, HEADER_SIZE + 8);
        encode_boxed(slot.payload_mut(), request);
        self.shared.ring.publish_and_sync(slot, false);

        // The sync cannot return before the record was consumed, so the
        // outcome is always filled in by now.
        outcome.unwrap_or_else(|| {
            Err(GpuError::InvalidState {
                message: "reconfigure completed without a result".to_string(),
            })
        })
    }

    /// Run a callable on the GPU thread, ordered with other commands
    pub fn run_on_thread<F>(&self, func: F)
    where
        F: FnOnce(&mut WorkerState) + Send + 'static,
    {
        let boxed: AsyncCallFn = Box::new(func);
        let mut slot = self
            .shared
            .ring
            .allocate(CommandType::AsyncCall, 0, HEADER_SIZE + 8);
        encode_boxed(slot.payload_mut(), Box::new(boxed));
        self.shared.ring.publish_and_wake(slot);
    }

    /// Replace the settings on both threads
    pub fn update_settings(&mut self, settings: GpuSettings) {
        self.settings = settings.clone();
        self.run_on_thread(move |w| w.update_settings_on_thread(settings));
    }

    /// Change the vsync mode
    pub fn set_vsync(&mut self, mode: VsyncMode, allow_present_throttle: bool) {
        self.vsync_mode = mode;
        self.allow_present_throttle = allow_present_throttle;
        self.run_on_thread(move |w| w.set_vsync_on_thread(mode, allow_present_throttle));
    }

    /// Re-present the current frame (window proportion changes)
    pub fn present_current_frame(&self) {
        self.run_on_thread(|w| {
            if w.run_idle() {
                // Running idle re-presents on its own.
                return;
            }
            w.present_frame(false, 0);
        });
    }

    /// Handle a fullscreen transition or window change
    pub fn update_display_window(&self, fullscreen: bool) {
        self.run_on_thread(move |w| w.update_display_window_on_thread(fullscreen));
    }

    /// Handle a window resize
    pub fn resize_display_window(&self, width: u32, height: u32, scale: f32) {
        self.run_on_thread(move |w| w.resize_display_window_on_thread(width, height, scale));
    }

    /// Enable or disable run-idle presentation
    pub fn set_run_idle(&self, enabled: bool) {
        self.run_on_thread(move |w| w.set_run_idle(enabled));
    }

    /// Wait until the GPU thread has drained all published work
    pub fn sync(&self, spin: bool) {
        if self.shared.ring.pending_size() > 0 {
            self.shared.ring.wake_consumer();
        }
        self.shared.ring.sync(spin);
    }

    /// Publish the final record and join the GPU thread
    pub fn shutdown(mut self) {
        self.shutdown_impl();
    }

    fn shutdown_impl(&mut self) {
        let Some(join) = self.join.take() else {
            return;
        };
        log::info!("Shutting down GPU thread...");
        if self.shared.ring.pending_size() > 0 {
            self.shared.ring.wake_consumer();
            self.shared.ring.sync(false);
        }
        let slot = self.shared.ring.allocate(CommandType::Shutdown, 0, HEADER_SIZE);
        self.shared.ring.publish_and_wake(slot);
        if join.join().is_err() {
            log::error!("GPU thread panicked during shutdown");
        }
    }

    // ---- backend command builders -------------------------------------

    fn push_backend_command<F>(&self, ty: CommandType, params: CommandParams, payload_size: u32, fill: F)
    where
        F: FnOnce(&mut [u8]),
    {
        let mut slot = self
            .shared
            .ring
            .allocate(ty, params.0, HEADER_SIZE + payload_size);
        fill(slot.payload_mut());
        self.shared.ring.publish(slot);
    }

    /// Queue a VRAM fill
    pub fn push_fill_vram(
        &self,
        x: u16,
        y: u16,
        width: u16,
        height: u16,
        color: u32,
        params: CommandParams,
    ) {
        let cmd = FillVramCommand {
            rect: VramRect::new(x, y, width, height),
            color,
        };
        self.push_backend_command(
            CommandType::FillVram,
            params,
            FillVramCommand::ENCODED_SIZE,
            |buf| cmd.encode(buf),
        );
    }

    /// Queue a VRAM pixel upload
    ///
    /// # Panics
    /// Panics if `data` holds fewer than `width * height` pixels.
    pub fn push_update_vram(
        &self,
        x: u16,
        y: u16,
        width: u16,
        height: u16,
        data: &[u16],
        params: CommandParams,
    ) {
        let count = width as usize * height as usize;
        assert!(data.len() >= count, "update data shorter than rectangle");
        let rect = VramRect::new(x, y, width, height);
        let payload_size = VramRect::ENCODED_SIZE + (count * 2) as u32;
        self.push_backend_command(CommandType::UpdateVram, params, payload_size, |buf| {
            rect.encode(buf);
            let mut off = VramRect::ENCODED_SIZE as usize;
            for &pixel in &data[..count] {
                buf[off..off + 2].copy_from_slice(&pixel.to_le_bytes());
                off += 2;
            }
        });
    }

    /// Queue a VRAM-to-VRAM copy
    #[allow(clippy::too_many_arguments)]
    pub fn push_copy_vram(
        &self,
        src_x: u16,
        src_y: u16,
        dst_x: u16,
        dst_y: u16,
        width: u16,
        height: u16,
        params: CommandParams,
    ) {
        let cmd = CopyVramCommand {
            src_x,
            src_y,
            dst_x,
            dst_y,
            width,
            height,
        };
        self.push_backend_command(
            CommandType::CopyVram,
            params,
            CopyVramCommand::ENCODED_SIZE,
            |buf| cmd.encode(buf),
        );
    }

    /// Queue a drawing-area change
    pub fn push_set_drawing_area(&self, area: DrawingArea) {
        let cmd = SetDrawingAreaCommand { area };
        self.push_backend_command(
            CommandType::SetDrawingArea,
            CommandParams::default(),
            SetDrawingAreaCommand::ENCODED_SIZE,
            |buf| cmd.encode(buf),
        );
    }

    /// Queue a CLUT cache refill
    pub fn push_update_clut(&self, reg: u16, clut_is_8bit: bool) {
        let cmd = UpdateClutCommand { reg, clut_is_8bit };
        self.push_backend_command(
            CommandType::UpdateClut,
            CommandParams::default(),
            UpdateClutCommand::ENCODED_SIZE,
            |buf| cmd.encode(buf),
        );
    }

    /// Queue a texture cache invalidation
    pub fn push_clear_cache(&self) {
        self.push_backend_command(CommandType::ClearCache, CommandParams::default(), 0, |_| {});
    }

    /// Queue a full VRAM clear
    pub fn push_clear_vram(&self) {
        self.push_backend_command(CommandType::ClearVram, CommandParams::default(), 0, |_| {});
    }

    /// Queue a display buffer swap notification
    pub fn push_buffer_swapped(&self) {
        self.push_backend_command(
            CommandType::BufferSwapped,
            CommandParams::default(),
            0,
            |_| {},
        );
    }

    /// Queue a resolution-scale recomputation
    pub fn push_update_resolution_scale(&self) {
        self.push_backend_command(
            CommandType::UpdateResolutionScale,
            CommandParams::default(),
            0,
            |_| {},
        );
    }

    /// Queue a polygon draw
    pub fn push_draw_polygon(&self, cmd: &DrawPolygonCommand, params: CommandParams) {
        let payload_size = DrawPolygonCommand::payload_size(cmd.num_vertices as u32);
        self.push_backend_command(CommandType::DrawPolygon, params, payload_size, |buf| {
            cmd.encode(buf)
        });
    }

    /// Queue a sub-pixel polygon draw
    pub fn push_draw_precise_polygon(
        &self,
        cmd: &DrawPrecisePolygonCommand,
        params: CommandParams,
    ) {
        let payload_size = DrawPrecisePolygonCommand::payload_size(cmd.num_vertices as u32);
        self.push_backend_command(
            CommandType::DrawPrecisePolygon,
            params,
            payload_size,
            |buf| cmd.encode(buf),
        );
    }

    /// Queue a rectangle draw
    pub fn push_draw_rectangle(&self, cmd: &DrawRectangleCommand, params: CommandParams) {
        self.push_backend_command(
            CommandType::DrawRectangle,
            params,
            DrawRectangleCommand::ENCODED_SIZE,
            |buf| cmd.encode(buf),
        );
    }

    /// Queue a line draw
    pub fn push_draw_line(&self, cmd: &DrawLineCommand, params: CommandParams) {
        let payload_size = DrawLineCommand::payload_size(cmd.vertices.len() as u32);
        self.push_backend_command(CommandType::DrawLine, params, payload_size, |buf| {
            cmd.encode(buf)
        });
    }

    /// Queue a display update, throttling on the frame-queue bound
    ///
    /// When the in-flight frame count exceeds the configured limit, this
    /// blocks until one queued present completes.
    pub fn push_update_display(&self, cmd: &UpdateDisplayCommand, params: CommandParams) {
        let drain_one = cmd.present_frame && self.shared.pacing.begin_queue_frame();
        if drain_one {
            // Arm before publishing so the present cannot race past the
            // wait flag.
            self.shared.pacing.arm_wait();
        }

        let mut slot = self.shared.ring.allocate(
            CommandType::UpdateDisplay,
            params.0,
            HEADER_SIZE + UpdateDisplayCommand::ENCODED_SIZE,
        );
        cmd.encode(slot.payload_mut());
        self.shared.ring.publish_and_wake(slot);

        if drain_one {
            self.shared.pacing.wait_for_one_queued_frame();
        }
    }

    /// Read a VRAM rectangle, synchronously
    ///
    /// Publishes a `ReadVram` record, waits for the GPU thread to drain,
    /// and returns the rectangle from the readback snapshot.
    pub fn read_vram(&self, x: u16, y: u16, width: u16, height: u16) -> Vec<u16> {
        let rect = VramRect::new(x, y, width, height);
        let mut slot = self.shared.ring.allocate(
            CommandType::ReadVram,
            0,
            HEADER_SIZE + VramRect::ENCODED_SIZE,
        );
        rect.encode(slot.payload_mut());
        self.shared.ring.publish_and_sync(slot, false);

        let readback = self.shared.readback.lock().unwrap();
        let mut out = Vec::with_capacity(width as usize * height as usize);
        for row in 0..height as u32 {
            let vram_y = (y as u32 + row) % VRAM_HEIGHT;
            for col in 0..width as u32 {
                let vram_x = (x as u32 + col) % VRAM_WIDTH;
                out.push(readback.vram[(vram_y * VRAM_WIDTH + vram_x) as usize]);
            }
        }
        out
    }

    /// Capture VRAM and CLUT into a save-state block
    pub fn capture_state(&self) -> GpuStateBlock {
        let vram = self.read_vram(0, 0, VRAM_WIDTH as u16, VRAM_HEIGHT as u16);
        let clut = self.shared.readback.lock().unwrap().clut.clone();
        GpuStateBlock::new(vram, clut)
    }

    /// Queue a VRAM and CLUT overwrite from a save-state block
    pub fn load_state(&self, block: GpuStateBlock) {
        let mut slot =
            self.shared
                .ring
                .allocate(CommandType::LoadState, 0, HEADER_SIZE + 8);
        encode_boxed(slot.payload_mut(), Box::new(block));
        self.shared.ring.publish_and_wake(slot);
    }

    /// Queue a screenshot
    pub fn save_screenshot(
        &self,
        path: std::path::PathBuf,
        mode: ScreenshotMode,
        quality: u8,
        show_osd_message: bool,
    ) {
        let request = ScreenshotRequest {
            path,
            mode,
            quality,
            show_osd_message,
        };
        let mut slot =
            self.shared
                .ring
                .allocate(CommandType::RenderScreenshot, 0, HEADER_SIZE + 8);
        encode_boxed(slot.payload_mut(), Box::new(request));
        self.shared.ring.publish_and_wake(slot);
    }
}

impl Drop for GpuThread {
    fn drop(&mut self) {
        self.shutdown_impl();
    }
}

/// GPU-thread state
///
/// Owned by the worker loop; async-call records receive `&mut WorkerState`
/// and may use the public methods here.
pub struct WorkerState {
    shared: Arc<SharedState>,
    host: Arc<dyn Host>,
    factory: Arc<dyn DeviceFactory>,
    device: Option<Box<dyn crate::core::gpu::device::GpuDevice>>,
    backend: Option<GpuBackend>,
    vram: Vram,
    settings: GpuSettings,
    requested_vsync: VsyncMode,
    requested_allow_present_throttle: bool,
    requested_fullscreen_ui: bool,
    skipped_present_count: u32,
    last_device_reset: Option<Instant>,
    frame_number: u32,
}

impl WorkerState {
    fn new(
        shared: Arc<SharedState>,
        host: Arc<dyn Host>,
        factory: Arc<dyn DeviceFactory>,
        settings: GpuSettings,
    ) -> Self {
        Self {
            shared,
            host,
            factory,
            device: None,
            backend: None,
            vram: Vram::new(),
            settings,
            requested_vsync: VsyncMode::Disabled,
            requested_allow_present_throttle: false,
            requested_fullscreen_ui: false,
            skipped_present_count: 0,
            last_device_reset: None,
            frame_number: 0,
        }
    }

    /// Current lifecycle state
    pub fn status(&self) -> WorkerStatus {
        match (&self.device, &self.backend) {
            (None, _) => WorkerStatus::Idle,
            (Some(_), None) => WorkerStatus::DeviceOnly,
            (Some(_), Some(_)) => WorkerStatus::Running,
        }
    }

    /// Whether run-idle presentation is enabled
    pub fn run_idle(&self) -> bool {
        self.shared.run_idle.load(Ordering::Relaxed)
    }

    /// Enable or disable run-idle presentation
    pub fn set_run_idle(&mut self, enabled: bool) {
        self.shared.run_idle.store(enabled, Ordering::Relaxed);
        log::debug!(
            "GPU thread now {} idle",
            if enabled { "running" } else { "NOT running" }
        );
    }

    /// Whether the active backend is the hardware variant
    pub fn backend_is_hardware(&self) -> Option<bool> {
        self.backend.as_ref().map(|b| b.is_hardware_renderer())
    }

    /// Resolution scale of the active backend
    pub fn resolution_scale(&self) -> Option<u32> {
        self.backend.as_ref().map(|b| b.resolution_scale())
    }

    /// Statistics of the active backend
    pub fn backend_stats(&self) -> Option<BackendStats> {
        self.backend.as_ref().map(|b| b.core().stats)
    }

    /// GPU-side settings copy
    pub fn settings(&self) -> &GpuSettings {
        &self.settings
    }

    pub(crate) fn set_fullscreen_ui_requested(&mut self, requested: bool) {
        if self.requested_fullscreen_ui != requested {
            self.requested_fullscreen_ui = requested;
            self.host.on_fullscreen_ui_started_or_stopped(requested);
        }
    }

    /// The worker loop; returns when the shutdown record is consumed
    fn run(mut self) {
        log::debug!("GPU thread started");
        let shared = self.shared.clone();
        let capacity = shared.ring.capacity();

        'outer: loop {
            let (write, mut read) = shared.ring.consumer_snapshot();
            if read == write {
                // Run-idle only makes sense with a device to present on.
                let allow_sleep = !self.run_idle() || self.device.is_none();
                if shared.ring.sleep_consumer(allow_sleep) {
                    continue;
                }
                // Running idle: keep re-presenting the last frame.
                self.present_frame(false, 0);
                if let Some(device) = self.device.as_mut() {
                    if device.has_main_swap_chain() && !device.is_vsync_blocking() {
                        device.throttle_presentation();
                    }
                }
                continue;
            }

            if write < read && read == capacity {
                // The producer filled the tail exactly; wrap without a
                // padding record.
                read = 0;
                shared.ring.store_read(read);
                continue;
            }

            let mut write_eff = if write < read { capacity } else { write };
            while read < write_eff {
                let (raw_type, raw_params, size) = shared.ring.header_at(read);
                let Some(ty) = CommandType::from_u8(raw_type) else {
                    unreachable!("corrupt command ring: type byte {}", raw_type);
                };
                debug_assert!(read + size <= capacity);
                let offset = read;
                read += size;

                if ty.is_backend_command() {
                    let payload = shared.ring.payload_at(offset, size);
                    self.handle_backend_command(ty, CommandParams(raw_params), payload);
                    continue;
                }

                match ty {
                    CommandType::Wraparound => {
                        debug_assert_eq!(read, capacity);
                        write_eff = shared.ring.reload_write();
                        read = 0;
                        // Let the producer reuse the tail as early as
                        // possible.
                        shared.ring.store_read(read);
                    }
                    CommandType::AsyncCall => {
                        let func = {
                            let payload = shared.ring.payload_at(offset, size);
                            // Encoded exactly once by run_on_thread.
                            unsafe { decode_boxed::<AsyncCallFn>(payload) }
                        };
                        (func)(&mut self);
                    }
                    CommandType::Reconfigure => {
                        let request = {
                            let payload = shared.ring.payload_at(offset, size);
                            unsafe { decode_boxed::<ReconfigureRequest>(payload) }
                        };
                        self.reconfigure_on_thread(&request);
                    }
                    CommandType::Shutdown => {
                        debug_assert_eq!(read, write_eff);
                        shared.ring.store_read(read);
                        break 'outer;
                    }
                    _ => unreachable!(),
                }
            }
            shared.ring.store_read(read);
        }

        // Release a producer that might still be blocked in sync.
        let _ = shared.ring.sleep_consumer(false);

        if self.backend.is_some() || self.device.is_some() {
            log::warn!("GPU thread shutting down with a live backend or device");
            self.destroy_backend_on_thread();
            self.destroy_device_on_thread();
        }
        log::debug!("GPU thread exited");
    }

    fn handle_backend_command(&mut self, ty: CommandType, params: CommandParams, payload: &[u8]) {
        let cmd = decode_backend_command(ty, payload);
        let display_cmd = if let BackendCommand::UpdateDisplay(c) = &cmd {
            Some(*c)
        } else {
            None
        };

        {
            let (Some(backend), Some(device)) = (self.backend.as_mut(), self.device.as_mut())
            else {
                log::warn!("Dropping {:?} command with no active backend", ty);
                if let Some(display) = display_cmd {
                    if display.present_frame {
                        // Keep the frame-queue gate balanced even though
                        // nothing was presented.
                        self.shared.pacing.frame_presented();
                    }
                }
                return;
            };
            let mut ctx = BackendContext {
                device: device.as_mut(),
                vram: &mut self.vram,
                settings: &self.settings,
                readback: &self.shared.readback,
                host: self.host.as_ref(),
                params,
            };
            backend.handle_command(&mut ctx, cmd);
        }

        if let Some(display) = display_cmd {
            if display.present_frame {
                self.present_frame(display.allow_present_skip, display.present_time);
                self.host.frame_done_on_gpu_thread(self.frame_number);
                self.frame_number = self.frame_number.wrapping_add(1);
                self.shared.pacing.frame_presented();
            }
        }
    }

    /// Render overlays and present one frame
    ///
    /// `present_time` of zero presents immediately; otherwise the flip is
    /// scheduled for that monotonic-nanosecond deadline, using the device's
    /// explicit or timed present support when available.
    pub fn present_frame(&mut self, allow_skip: bool, present_time: u64) {
        let skip_present = {
            let Some(device) = self.device.as_mut() else {
                return;
            };
            !device.has_main_swap_chain()
                || (allow_skip
                    && device.should_skip_presenting()
                    && self.skipped_present_count < MAX_SKIPPED_PRESENT_COUNT)
        };

        if !skip_present {
            self.host.render_overlays();
        }

        // Pending backend rendering must land before the present.
        self.flush_backend_render();

        let Some(device) = self.device.as_mut() else {
            return;
        };
        let result = if skip_present {
            PresentResult::SkipPresent
        } else if let Some(backend) = self.backend.as_mut() {
            backend.present_display(device.as_mut())
        } else {
            device.begin_present()
        };

        match result {
            PresentResult::Ok => {
                self.skipped_present_count = 0;

                let features = device.features();
                let scheduled = present_time != 0;
                let explicit_present =
                    scheduled && features.explicit_present && !features.timed_present;
                let timed_present = scheduled && features.timed_present;

                if scheduled && !explicit_present {
                    // No explicit present support; simulate it with a
                    // flush and a sleep.
                    device.flush();
                    crate::core::threading::sleep_until(present_time, true);
                }

                device.end_present(
                    explicit_present,
                    if timed_present { present_time } else { 0 },
                );

                if explicit_present {
                    crate::core::threading::sleep_until(present_time, true);
                    device.submit_present();
                }
            }
            PresentResult::SkipPresent => {
                self.skipped_present_count += 1;
                if !skip_present {
                    device.flush();
                }
                self.host.end_ui_frame();
            }
            PresentResult::DeviceLost => {
                self.skipped_present_count += 1;
                self.handle_device_lost();
                self.host.end_ui_frame();
            }
            PresentResult::ExclusiveFullscreenLost => {
                self.skipped_present_count += 1;
                log::warn!("Lost exclusive fullscreen.");
                self.host.set_fullscreen(false);
                self.host.end_ui_frame();
            }
        }

        // Keep the UI layer advancing no matter how the present went.
        self.host.new_ui_frame();
        self.restore_backend_context();
    }

    fn flush_backend_render(&mut self) {
        let (Some(backend), Some(device)) = (self.backend.as_mut(), self.device.as_mut()) else {
            return;
        };
        let mut ctx = BackendContext {
            device: device.as_mut(),
            vram: &mut self.vram,
            settings: &self.settings,
            readback: &self.shared.readback,
            host: self.host.as_ref(),
            params: CommandParams::default(),
        };
        backend.flush_render(&mut ctx);
    }

    fn restore_backend_context(&mut self) {
        let (Some(backend), Some(device)) = (self.backend.as_mut(), self.device.as_mut()) else {
            return;
        };
        let mut ctx = BackendContext {
            device: device.as_mut(),
            vram: &mut self.vram,
            settings: &self.settings,
            readback: &self.shared.readback,
            host: self.host.as_ref(),
            params: CommandParams::default(),
        };
        backend.restore_device_context(&mut ctx);
    }

    fn handle_device_lost(&mut self) {
        // A loss loop means the device is wedged; bail out instead of
        // recreating forever.
        let now = Instant::now();
        if let Some(last) = self.last_device_reset {
            if now.duration_since(last) < MIN_TIME_BETWEEN_DEVICE_RESETS {
                log::error!("Host GPU lost too many times, device is probably completely wedged.");
                self.host.report_fatal_error(
                    "Host GPU device lost",
                    "Host GPU lost too many times, device is probably completely wedged.",
                );
                std::process::abort();
            }
        }
        self.last_device_reset = Some(now);

        let is_fullscreen = self.host.is_fullscreen();

        // Toss out everything and try to hobble on.
        self.destroy_backend_on_thread();
        self.destroy_device_on_thread();

        let requested = *self.shared.requested_renderer.lock().unwrap();
        let renderer = requested.unwrap_or(self.settings.gpu_renderer);
        let api = self
            .settings
            .render_api_for_renderer(renderer, RenderApi::None);

        let result = self
            .create_device_on_thread(api, is_fullscreen)
            .and_then(|()| match requested {
                Some(renderer) => self.create_backend_on_thread(renderer, true),
                None => Ok(()),
            });
        if let Err(e) = result {
            log::error!("Failed to recreate GPU device after loss: {}", e);
            self.host
                .report_fatal_error("Host GPU device lost", &e.to_string());
            std::process::abort();
        }

        self.host.add_osd_message(
            "HostGPUDeviceLost",
            "warning",
            "Host GPU device encountered an error and has recovered. This may cause broken rendering.",
            OSD_CRITICAL_ERROR_DURATION,
        );
    }

    fn reconfigure_on_thread(&mut self, request: &ReconfigureRequest) {
        self.requested_vsync = request.vsync_mode;
        self.requested_allow_present_throttle = request.allow_present_throttle;
        if let Some(start) = request.start_fullscreen_ui {
            self.set_fullscreen_ui_requested(start);
        }
        self.settings = request.settings.clone();

        // Shutting everything down?
        if request.renderer.is_none() && !self.requested_fullscreen_ui {
            self.destroy_backend_on_thread();
            self.destroy_device_on_thread();
            request.set_result(Ok(()));
            return;
        }

        // A hardware backend being torn down flushes its pixels into VRAM
        // so they survive into the next backend.
        if self.backend.is_some() && request.renderer.is_some() && request.upload_vram {
            self.readback_vram_for_swap();
        }
        if self.backend.is_some() {
            self.destroy_backend_on_thread();
        }

        let current_api = self
            .device
            .as_ref()
            .map(|d| d.render_api())
            .unwrap_or(RenderApi::None);
        let requested = *self.shared.requested_renderer.lock().unwrap();
        let expected_api = self.settings.render_api_for_renderer(
            request
                .renderer
                .or(requested)
                .unwrap_or(self.settings.gpu_renderer),
            current_api,
        );

        if request.force_recreate_device || current_api != expected_api {
            let fullscreen = request
                .fullscreen
                .unwrap_or_else(|| self.host.is_fullscreen());
            self.destroy_device_on_thread();

            if let Err(e) = self.create_device_on_thread(expected_api, fullscreen) {
                self.host.add_osd_message(
                    "DeviceSwitchFailed",
                    "paint-roller",
                    &format!(
                        "Failed to create {} GPU device, reverting to {}.\n{}",
                        expected_api, current_api, e
                    ),
                    OSD_CRITICAL_ERROR_DURATION,
                );
                self.host.release_render_window();
                if current_api == RenderApi::None
                    || self.create_device_on_thread(current_api, fullscreen).is_err()
                {
                    request.set_result(Err(e));
                    return;
                }
            }
        }

        if let Some(renderer) = request.renderer {
            request.set_result(self.create_backend_on_thread(renderer, request.upload_vram));
        } else {
            // Fullscreen UI only.
            if self.device.is_none() {
                if let Err(e) =
                    self.create_device_on_thread(expected_api, request.fullscreen.unwrap_or(false))
                {
                    request.set_result(Err(e));
                    return;
                }
            }
            if let Some(device) = self.device.as_mut() {
                // No timing collection needed just for the UI.
                device.set_gpu_timing_enabled(false);
            }
            let ok = self.host.initialize_fullscreen_ui();
            request.set_result(if ok {
                Ok(())
            } else {
                Err(GpuError::FullscreenUiInitFailed)
            });
        }

        // The fullscreen UI is the active surface exactly when it runs
        // without a backend in front of it.
        if self.requested_fullscreen_ui {
            self.host
                .on_fullscreen_ui_active_changed(self.backend.is_none());
        }
    }

    fn readback_vram_for_swap(&mut self) {
        let (Some(backend), Some(device)) = (self.backend.as_mut(), self.device.as_mut()) else {
            return;
        };
        let mut ctx = BackendContext {
            device: device.as_mut(),
            vram: &mut self.vram,
            settings: &self.settings,
            readback: &self.shared.readback,
            host: self.host.as_ref(),
            params: CommandParams::default(),
        };
        backend.handle_command(
            &mut ctx,
            BackendCommand::ReadVram(VramRect::new(0, 0, VRAM_WIDTH as u16, VRAM_HEIGHT as u16)),
        );
    }

    fn create_backend_on_thread(&mut self, renderer: RendererKind, upload_vram: bool) -> Result<()> {
        let is_hardware = renderer != RendererKind::Software;

        let backend = match self.instantiate_backend(renderer, upload_vram) {
            Ok(backend) => backend,
            Err(e) => {
                log::error!("Failed to create {} renderer: {}", renderer, e);
                if !is_hardware {
                    return Err(e);
                }
                self.host.add_osd_message(
                    "GPUBackendCreationFailed",
                    "paint-roller",
                    &format!(
                        "Failed to initialize {} renderer, falling back to software renderer.",
                        renderer
                    ),
                    OSD_CRITICAL_ERROR_DURATION,
                );
                *self.shared.requested_renderer.lock().unwrap() = Some(RendererKind::Software);
                self.instantiate_backend(RendererKind::Software, upload_vram)?
            }
        };

        self.backend = Some(backend);
        if let Some(device) = self.device.as_mut() {
            device.set_gpu_timing_enabled(self.settings.display_show_gpu_usage);
        }
        Ok(())
    }

    fn instantiate_backend(
        &mut self,
        renderer: RendererKind,
        upload_vram: bool,
    ) -> Result<GpuBackend> {
        let Some(device) = self.device.as_mut() else {
            return Err(GpuError::NoDevice);
        };
        let mut ctx = BackendContext {
            device: device.as_mut(),
            vram: &mut self.vram,
            settings: &self.settings,
            readback: &self.shared.readback,
            host: self.host.as_ref(),
            params: CommandParams::default(),
        };
        match renderer {
            RendererKind::Software => {
                SoftwareBackend::new(&mut ctx, upload_vram).map(GpuBackend::Software)
            }
            RendererKind::Hardware => {
                HardwareBackend::new(&mut ctx, upload_vram).map(GpuBackend::Hardware)
            }
        }
    }

    fn create_device_on_thread(&mut self, api: RenderApi, fullscreen: bool) -> Result<()> {
        debug_assert!(self.device.is_none());
        log::info!("Trying to create a {} GPU device...", api);

        let exclusive_fullscreen = match self.settings.display_exclusive_fullscreen_control {
            ExclusiveFullscreenControl::Automatic => None,
            ExclusiveFullscreenControl::Allowed => Some(true),
            ExclusiveFullscreenControl::Disallowed => Some(false),
        };
        let exclusive_requested = fullscreen && exclusive_fullscreen.unwrap_or(true);

        let window = self
            .host
            .acquire_render_window(api, fullscreen, exclusive_requested)?;

        let create_request = DeviceCreateRequest {
            adapter: self.settings.gpu_adapter.clone(),
            debug_device: self.settings.gpu_use_debug_device,
            disabled_features: self.settings.disabled_feature_mask(),
            window,
            vsync: self.requested_vsync,
            allow_present_throttle: self.requested_allow_present_throttle,
            exclusive_fullscreen,
        };

        match self.factory.create_device(api, &create_request) {
            Ok(device) => {
                *self.shared.window_info.write().unwrap() = device.window_info();
                self.device = Some(device);
                // The UI layer starts its first frame on the new device.
                self.host.new_ui_frame();
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to create GPU device: {}", e);
                self.host.release_render_window();
                Err(e)
            }
        }
    }

    fn destroy_backend_on_thread(&mut self) {
        let Some(mut backend) = self.backend.take() else {
            return;
        };
        log::debug!("Shutting down GPU backend...");
        if let Some(device) = self.device.as_mut() {
            backend.destroy(device.as_mut());
        }
    }

    fn destroy_device_on_thread(&mut self) {
        let Some(device) = self.device.take() else {
            return;
        };
        let had_window = device.has_main_swap_chain();

        self.host.shutdown_fullscreen_ui();
        log::info!("Destroying {} GPU device...", device.render_api());
        drop(device);

        if had_window {
            self.host.release_render_window();
        }
        *self.shared.window_info.write().unwrap() = WindowInfo::default();
    }

    pub(crate) fn update_settings_on_thread(&mut self, settings: GpuSettings) {
        log::debug!("Updating GPU settings on thread...");
        let old_settings = std::mem::replace(&mut self.settings, settings);

        if self.backend.is_none() {
            return;
        }
        if self.settings.display_show_gpu_usage != old_settings.display_show_gpu_usage {
            if let Some(device) = self.device.as_mut() {
                device.set_gpu_timing_enabled(self.settings.display_show_gpu_usage);
            }
        }
        if self.settings.gpu_resolution_scale != old_settings.gpu_resolution_scale {
            self.update_backend_resolution_scale();
        }
    }

    pub(crate) fn set_vsync_on_thread(&mut self, mode: VsyncMode, allow_present_throttle: bool) {
        if self.requested_vsync == mode
            && self.requested_allow_present_throttle == allow_present_throttle
        {
            return;
        }
        self.requested_vsync = mode;
        self.requested_allow_present_throttle = allow_present_throttle;

        let Some(device) = self.device.as_mut() else {
            return;
        };
        if !device.has_main_swap_chain() {
            return;
        }
        if let Err(e) = device.set_vsync_mode(mode, allow_present_throttle) {
            log::error!("Failed to update vsync mode: {}", e);
        }
    }

    pub(crate) fn resize_display_window_on_thread(&mut self, width: u32, height: u32, scale: f32) {
        // We should not be getting this without a device.
        let Some(device) = self.device.as_mut() else {
            return;
        };
        if !device.has_main_swap_chain() {
            return;
        }

        log::debug!("Display window resized to {}x{}", width, height);

        if let Err(e) = device.resize_buffers(width, height, scale) {
            log::error!("Failed to resize main swap chain: {}", e);
            self.update_display_window_on_thread(self.host.is_fullscreen());
            return;
        }

        self.display_window_resized_on_thread();
    }

    pub(crate) fn update_display_window_on_thread(&mut self, fullscreen: bool) {
        // In case we get the event late.
        if self.device.is_none() {
            return;
        }

        let exclusive_fullscreen = match self.settings.display_exclusive_fullscreen_control {
            ExclusiveFullscreenControl::Automatic => None,
            ExclusiveFullscreenControl::Allowed => Some(true),
            ExclusiveFullscreenControl::Disallowed => Some(false),
        };
        let exclusive_requested = fullscreen && exclusive_fullscreen.unwrap_or(true);
        let api = self
            .device
            .as_ref()
            .map(|d| d.render_api())
            .unwrap_or(RenderApi::None);

        let window = match self
            .host
            .acquire_render_window(api, fullscreen, exclusive_requested)
        {
            Ok(window) => window,
            Err(e) => {
                self.host
                    .report_fatal_error("Failed to get render window after update", &e.to_string());
                return;
            }
        };

        // Surfaceless is usually temporary; just leave the swapchain alone.
        if !window.surfaceless {
            if let Some(device) = self.device.as_mut() {
                if let Err(e) = device.resize_buffers(window.width, window.height, window.scale) {
                    self.host
                        .report_fatal_error("Failed to change window after update", &e.to_string());
                    return;
                }
            }
        }

        self.display_window_resized_on_thread();
    }

    fn display_window_resized_on_thread(&mut self) {
        let Some(device) = self.device.as_ref() else {
            return;
        };
        let window = device.window_info();
        *self.shared.window_info.write().unwrap() = window;

        if window.surfaceless || self.backend.is_none() {
            return;
        }

        // Tell the CPU thread about the new size.
        let host = self.host.clone();
        let (width, height) = (window.width, window.height);
        self.host.run_on_cpu_thread(Box::new(move || {
            host.on_render_window_resized(width, height);
        }));

        // Re-present so the current frame shows at the right proportions.
        if !self.run_idle() {
            self.present_frame(false, 0);
        }

        if self.settings.gpu_resolution_scale == 0 {
            self.update_backend_resolution_scale();
        }
    }

    fn update_backend_resolution_scale(&mut self) {
        let (Some(backend), Some(device)) = (self.backend.as_mut(), self.device.as_mut()) else {
            return;
        };
        let mut ctx = BackendContext {
            device: device.as_mut(),
            vram: &mut self.vram,
            settings: &self.settings,
            readback: &self.shared.readback,
            host: self.host.as_ref(),
            params: CommandParams::default(),
        };
        backend.update_resolution_scale(&mut ctx);
    }
}
