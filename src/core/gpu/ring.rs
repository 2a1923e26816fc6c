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

//! GPU command ring
//!
//! A fixed-capacity byte ring with exactly one producer (the CPU thread)
//! and one consumer (the GPU thread). Slots are variable-sized records; a
//! slot never crosses the capacity boundary, the producer pads the tail
//! with a `Wraparound` record instead.
//!
//! Cursor rules:
//! - Only the producer stores `write`; only the consumer stores `read`.
//! - A slot becomes visible to the consumer when `write` is published with
//!   release ordering; the consumer pairs it with an acquire load.
//! - `write == read` means empty. The producer keeps one header of slack
//!   when approaching the read cursor from behind so the ring can never
//!   become completely full.
//!
//! The wake protocol is a single signed counter plus two counting
//! semaphores. Counter states: magnitude > 0 means pending work units,
//! -1 means the consumer is parked, and the `CPU_WAITING` high bit marks a
//! producer blocked in `sync`. The producer wakes by `fetch_add(2)`: if the
//! previous value was negative the consumer was parked (adding 2 turns -1
//! into +1, so the woken consumer sees work), and the wake semaphore is
//! posted.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
use std::time::{Duration, Instant};

use crate::core::gpu::commands::{align_slot_size, read_u16, read_u32, write_u16, write_u32, CommandType, HEADER_SIZE};
use crate::core::threading::Semaphore;

/// High bit of the wake counter: the producer is blocked in `sync` and must
/// be posted when the consumer finishes its batch.
pub(crate) const CPU_WAITING: i32 = 0x4000_0000;

/// Wake counter value while the consumer is parked on the wake semaphore.
const SLEEPING: i32 = -1;

// Power management makes short spins on ARM cores slower to observe stores,
// so the spin budget is longer there.
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
const SPIN_TIME: Duration = Duration::from_micros(50);
#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
const SPIN_TIME: Duration = Duration::from_micros(200);

/// Wake counter magnitude with the `CPU_WAITING` bit removed
///
/// The result stays sign-extended, so a parked consumer (-1) remains
/// negative whether or not the waiting bit is set.
#[inline]
fn wake_magnitude(state: i32) -> i32 {
    state & !CPU_WAITING
}

/// Ring sizing parameters
#[derive(Debug, Clone, Copy)]
pub struct RingConfig {
    /// Ring capacity in bytes; must be a multiple of 4 and at least 256
    pub capacity: u32,
    /// Pending-byte threshold at which a plain `publish` also signals the
    /// consumer
    pub wake_threshold: u32,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            capacity: 16 * 1024 * 1024,
            wake_threshold: 64 * 1024,
        }
    }
}

/// A reserved, writable slot in the ring
///
/// Produced by [`CommandRing::allocate`]; the record becomes visible to the
/// consumer only when passed to one of the publish methods.
pub struct SlotWriter<'a> {
    ring: &'a CommandRing,
    offset: u32,
    size: u32,
}

impl SlotWriter<'_> {
    /// Total record size including the header
    #[inline]
    pub fn size(&self) -> u32 {
        self.size
    }

    /// The payload bytes following the header
    ///
    /// The producer must fully initialize every field it later expects the
    /// consumer to read before publishing.
    #[inline]
    pub fn payload_mut(&mut self) -> &mut [u8] {
        self.ring
            .slice_mut(self.offset + HEADER_SIZE, self.size - HEADER_SIZE)
    }
}

/// The single-producer single-consumer command ring
pub struct CommandRing {
    data: Box<[UnsafeCell<u8>]>,
    capacity: u32,
    wake_threshold: u32,

    // Stored only by the producer.
    write_ptr: AtomicU32,
    // Stored only by the consumer.
    read_ptr: AtomicU32,

    wake_count: AtomicI32,
    thread_wake: Semaphore,
    thread_done: Semaphore,
}

// The byte storage is aliased between the two threads. Soundness rests on
// the cursor rules above: the producer only touches [write, write + size)
// before publishing, the consumer only touches [read, write) after an
// acquire load of `write`.
unsafe impl Send for CommandRing {}
unsafe impl Sync for CommandRing {}

impl CommandRing {
    /// Create a ring with the given sizing
    ///
    /// # Panics
    /// Panics if the capacity is not a multiple of 4 or is below 256 bytes.
    pub fn new(config: RingConfig) -> Self {
        assert!(
            config.capacity >= 256 && config.capacity % 4 == 0,
            "ring capacity must be a multiple of 4 and at least 256 bytes"
        );
        let mut data = Vec::with_capacity(config.capacity as usize);
        data.resize_with(config.capacity as usize, || UnsafeCell::new(0));
        Self {
            data: data.into_boxed_slice(),
            capacity: config.capacity,
            wake_threshold: config.wake_threshold,
            write_ptr: AtomicU32::new(0),
            read_ptr: AtomicU32::new(0),
            wake_count: AtomicI32::new(0),
            thread_wake: Semaphore::new(),
            thread_done: Semaphore::new(),
        }
    }

    /// Ring capacity in bytes
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Bytes published but not yet consumed
    pub fn pending_size(&self) -> u32 {
        let read = self.read_ptr.load(Ordering::Relaxed);
        let write = self.write_ptr.load(Ordering::Relaxed);
        if write >= read {
            write - read
        } else {
            self.capacity - read + write
        }
    }

    /// Reserve a slot of `size` bytes (header included)
    ///
    /// The size is rounded up to the 4-byte slot granularity. Blocks only
    /// when the ring cannot fit the request, in which case the consumer is
    /// signalled and the producer busy-retries until space exists.
    ///
    /// # Panics
    /// Panics if the request can never fit the ring.
    pub fn allocate(&self, ty: CommandType, params: u16, size: u32) -> SlotWriter<'_> {
        let size = align_slot_size(size).max(HEADER_SIZE);
        assert!(
            size + HEADER_SIZE <= self.capacity,
            "command of {} bytes cannot fit a {} byte ring",
            size,
            self.capacity
        );

        loop {
            let read = self.read_ptr.load(Ordering::Acquire);
            let write = self.write_ptr.load(Ordering::Relaxed);

            if write == self.capacity {
                // The previous slot filled the tail exactly; restart at 0.
                // The consumer wraps its cursor without a sentinel here.
                self.write_ptr.store(0, Ordering::Release);
                continue;
            }

            let mut slot_size = size;
            if read > write {
                // Approaching the read cursor from behind. Keep one header
                // of slack so write can never catch up to read exactly.
                if read - write < size + HEADER_SIZE {
                    self.wake_consumer();
                    std::hint::spin_loop();
                    continue;
                }
            } else {
                let available = self.capacity - write;
                if size > available {
                    if read == 0 {
                        // Wrapping now would park write on read with data
                        // still queued; wait for the consumer to advance.
                        self.wake_consumer();
                        std::hint::spin_loop();
                        continue;
                    }
                    // Pad the tail and restart at offset 0.
                    self.write_header(write, CommandType::Wraparound as u8, 0, available);
                    self.write_ptr.store(0, Ordering::Release);
                    continue;
                }
                if read == 0 && available - size <= 4 {
                    // Filling (or nearly filling, after tail padding) the
                    // ring with read at 0 would leave write == read on a
                    // full ring; wait for the consumer.
                    self.wake_consumer();
                    std::hint::spin_loop();
                    continue;
                }
                if available - size == 4 {
                    // A 4-byte tail cannot hold a wraparound header later;
                    // absorb it into this slot.
                    slot_size += 4;
                }
            }

            self.write_header(write, ty as u8, params, slot_size);
            return SlotWriter {
                ring: self,
                offset: write,
                size: slot_size,
            };
        }
    }

    /// Publish a slot; signal the consumer only past the wake threshold
    pub fn publish(&self, slot: SlotWriter<'_>) {
        self.publish_cursor(&slot);
        if self.pending_size() >= self.wake_threshold {
            self.wake_consumer();
        }
    }

    /// Publish a slot and signal the consumer unconditionally
    pub fn publish_and_wake(&self, slot: SlotWriter<'_>) {
        self.publish_cursor(&slot);
        self.wake_consumer();
    }

    /// Publish a slot, signal the consumer, and wait for it to drain
    ///
    /// # Arguments
    /// * `spin` - Busy-wait for a short platform-specific budget before
    ///   parking on the completion semaphore
    pub fn publish_and_sync(&self, slot: SlotWriter<'_>, spin: bool) {
        self.publish_cursor(&slot);
        self.wake_consumer();
        self.sync(spin);
    }

    fn publish_cursor(&self, slot: &SlotWriter<'_>) {
        let new_write = self.write_ptr.fetch_add(slot.size, Ordering::Release) + slot.size;
        debug_assert!(new_write <= self.capacity);
    }

    /// Signal the consumer that work is pending
    ///
    /// Adds 2 so that a parked consumer (counter at -1) observes a positive
    /// work count after waking instead of going straight back to sleep.
    pub fn wake_consumer(&self) {
        if self.wake_count.fetch_add(2, Ordering::Release) < 0 {
            self.thread_wake.post();
        }
    }

    /// Wait until the consumer has drained all published work
    ///
    /// Spins for the platform budget when `spin` is set, then publishes the
    /// `CPU_WAITING` bit with a CAS and parks on the completion semaphore.
    pub fn sync(&self, spin: bool) {
        if spin {
            if wake_magnitude(self.wake_count.load(Ordering::Acquire)) < 0 {
                return;
            }
            let start = Instant::now();
            while start.elapsed() < SPIN_TIME {
                if wake_magnitude(self.wake_count.load(Ordering::Acquire)) < 0 {
                    return;
                }
                std::hint::spin_loop();
            }
        }

        let mut value;
        loop {
            value = self.wake_count.load(Ordering::Acquire);
            if wake_magnitude(value) < 0 {
                return;
            }
            if self
                .wake_count
                .compare_exchange_weak(
                    value,
                    value | CPU_WAITING,
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                break;
            }
        }
        self.thread_done.wait();
    }

    /// Consumer sleep attempt, called when the ring looks empty
    ///
    /// Acknowledges queued work while preserving the waiting bit. When no
    /// work remains, posts the completion semaphore for a waiting producer,
    /// then either parks (when `allow_sleep`) or returns.
    ///
    /// # Returns
    /// `true` when work was queued in the meantime and the caller must
    /// reload the cursors; `false` when the caller should run one idle
    /// iteration instead (only possible with `allow_sleep == false`).
    pub fn sleep_consumer(&self, allow_sleep: bool) -> bool {
        loop {
            let mut old_state;
            loop {
                old_state = self.wake_count.load(Ordering::Relaxed);
                let new_state = if wake_magnitude(old_state) > 0 {
                    old_state & CPU_WAITING
                } else if allow_sleep {
                    SLEEPING
                } else {
                    0
                };
                if self
                    .wake_count
                    .compare_exchange_weak(
                        old_state,
                        new_state,
                        Ordering::AcqRel,
                        Ordering::Relaxed,
                    )
                    .is_ok()
                {
                    break;
                }
            }

            // Not done yet?
            if wake_magnitude(old_state) > 0 {
                return true;
            }

            // Batch complete; release a producer blocked in sync.
            if old_state & CPU_WAITING != 0 {
                self.thread_done.post();
            }

            if allow_sleep {
                self.thread_wake.wait();
            } else {
                return false;
            }
        }
    }

    /// Raw wake-counter value (test observability)
    #[cfg(test)]
    pub(crate) fn wake_count_value(&self) -> i32 {
        self.wake_count.load(Ordering::Relaxed)
    }

    /// Consumer-side cursor snapshot: (`write` acquire, `read` relaxed)
    pub(crate) fn consumer_snapshot(&self) -> (u32, u32) {
        (
            self.write_ptr.load(Ordering::Acquire),
            self.read_ptr.load(Ordering::Relaxed),
        )
    }

    /// Reload `write` with acquire ordering (wraparound handling)
    pub(crate) fn reload_write(&self) -> u32 {
        self.write_ptr.load(Ordering::Acquire)
    }

    /// Publish the consumer's read cursor
    pub(crate) fn store_read(&self, value: u32) {
        self.read_ptr.store(value, Ordering::Release);
    }

    /// Read a record header at `offset`
    ///
    /// # Returns
    /// `(type_byte, params, size)`
    pub(crate) fn header_at(&self, offset: u32) -> (u8, u16, u32) {
        let buf = self.slice(offset, HEADER_SIZE);
        (buf[0], read_u16(buf, 2), read_u32(buf, 4))
    }

    /// Borrow a record's payload bytes
    pub(crate) fn payload_at(&self, offset: u32, size: u32) -> &[u8] {
        self.slice(offset + HEADER_SIZE, size - HEADER_SIZE)
    }

    fn write_header(&self, offset: u32, ty: u8, params: u16, size: u32) {
        let buf = self.slice_mut(offset, HEADER_SIZE);
        buf[0] = ty;
        buf[1] = 0;
        write_u16(buf, 2, params);
        write_u32(buf, 4, size);
    }

    /// Borrow ring bytes for reading
    ///
    /// Caller must be the thread that currently owns `[offset, offset+len)`
    /// under the cursor rules.
    fn slice(&self, offset: u32, len: u32) -> &[u8] {
        if len == 0 {
            // Header-only records at the capacity boundary have an empty
            // payload one past the last byte.
            return &[];
        }
        debug_assert!(offset + len <= self.capacity);
        unsafe { std::slice::from_raw_parts(self.data[offset as usize].get(), len as usize) }
    }

    /// Borrow ring bytes for writing
    ///
    /// Same ownership requirement as [`CommandRing::slice`]; regions handed
    /// out to the producer and consumer are always disjoint.
    #[allow(clippy::mut_from_ref)]
    fn slice_mut(&self, offset: u32, len: u32) -> &mut [u8] {
        if len == 0 {
            return &mut [];
        }
        debug_assert!(offset + len <= self.capacity);
        unsafe { std::slice::from_raw_parts_mut(self.data[offset as usize].get(), len as usize) }
    }
}
