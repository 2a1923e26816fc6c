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

//! Command ring tests
//!
//! The consumer side is driven by a small reimplementation of the worker's
//! drain loop so cursor behavior can be checked without a GPU thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::core::gpu::commands::CommandType;
use crate::core::gpu::ring::{CommandRing, RingConfig};

fn test_ring(capacity: u32, wake_threshold: u32) -> CommandRing {
    CommandRing::new(RingConfig {
        capacity,
        wake_threshold,
    })
}

/// Drain every published record, returning (type, size) pairs in
/// consumption order. Mirrors the worker's cursor handling.
fn drain_batch(ring: &CommandRing) -> Vec<(u8, u32)> {
    let capacity = ring.capacity();
    let mut out = Vec::new();
    loop {
        let (write, mut read) = ring.consumer_snapshot();
        if read == write {
            return out;
        }
        if write < read && read == capacity {
            read = 0;
            ring.store_read(read);
            continue;
        }
        let mut write_eff = if write < read { capacity } else { write };
        while read < write_eff {
            let (ty, _params, size) = ring.header_at(read);
            read += size;
            out.push((ty, size));
            if ty == CommandType::Wraparound as u8 {
                assert_eq!(read, capacity, "wraparound must cover the tail");
                write_eff = ring.reload_write();
                read = 0;
                ring.store_read(read);
            }
        }
        ring.store_read(read);
    }
}

#[test]
fn test_publish_and_drain_in_order() {
    let ring = test_ring(4096, u32::MAX);
    for i in 0..5u16 {
        let slot = ring.allocate(CommandType::FillVram, i, 32);
        ring.publish(slot);
    }
    assert_eq!(ring.pending_size(), 5 * 32);

    let drained = drain_batch(&ring);
    assert_eq!(drained.len(), 5);
    assert!(drained.iter().all(|&(ty, size)| {
        ty == CommandType::FillVram as u8 && size == 32
    }));
    assert_eq!(ring.pending_size(), 0);
}

#[test]
fn test_size_rounded_to_slot_granularity() {
    let ring = test_ring(4096, u32::MAX);
    let slot = ring.allocate(CommandType::ClearCache, 0, 9);
    assert_eq!(slot.size(), 12);
    ring.publish(slot);
    assert_eq!(drain_batch(&ring), vec![(CommandType::ClearCache as u8, 12)]);
}

#[test]
fn test_wraparound_sentinel_pads_tail() {
    // Ten 100-byte records fill the ring to offset 1000; the eleventh
    // must pad the 24-byte tail and land at offset 0.
    let ring = test_ring(1024, u32::MAX);
    for _ in 0..10 {
        let slot = ring.allocate(CommandType::FillVram, 0, 100);
        ring.publish(slot);
    }
    assert_eq!(drain_batch(&ring).len(), 10);

    let slot = ring.allocate(CommandType::FillVram, 0, 100);
    ring.publish(slot);

    let drained = drain_batch(&ring);
    assert_eq!(
        drained,
        vec![
            (CommandType::Wraparound as u8, 24),
            (CommandType::FillVram as u8, 100),
        ]
    );
    let (write, read) = ring.consumer_snapshot();
    assert_eq!(write, 100);
    assert_eq!(read, 100);
}

#[test]
fn test_exact_tail_fit_needs_no_sentinel() {
    let ring = test_ring(1024, u32::MAX);
    for _ in 0..10 {
        let slot = ring.allocate(CommandType::FillVram, 0, 100);
        ring.publish(slot);
    }
    assert_eq!(drain_batch(&ring).len(), 10);

    // 24 bytes is exactly the remaining tail.
    let slot = ring.allocate(CommandType::ClearCache, 0, 24);
    assert_eq!(slot.size(), 24);
    ring.publish(slot);
    assert_eq!(drain_batch(&ring), vec![(CommandType::ClearCache as u8, 24)]);

    // The next record starts over at offset 0 without a sentinel.
    let slot = ring.allocate(CommandType::FillVram, 0, 100);
    ring.publish(slot);
    assert_eq!(drain_batch(&ring), vec![(CommandType::FillVram as u8, 100)]);
    let (write, read) = ring.consumer_snapshot();
    assert_eq!(write, 100);
    assert_eq!(read, 100);
}

#[test]
fn test_one_byte_over_tail_triggers_wraparound() {
    let ring = test_ring(1024, u32::MAX);
    for _ in 0..10 {
        let slot = ring.allocate(CommandType::FillVram, 0, 100);
        ring.publish(slot);
    }
    assert_eq!(drain_batch(&ring).len(), 10);

    // 25 rounds to 28, one slot step over the 24-byte tail.
    let slot = ring.allocate(CommandType::FillVram, 0, 25);
    ring.publish(slot);
    let drained = drain_batch(&ring);
    assert_eq!(
        drained,
        vec![
            (CommandType::Wraparound as u8, 24),
            (CommandType::FillVram as u8, 28),
        ]
    );
}

#[test]
fn test_payload_survives_round_trip() {
    let ring = test_ring(1024, u32::MAX);
    let mut slot = ring.allocate(CommandType::UpdateVram, 7, 8 + 16);
    for (i, byte) in slot.payload_mut().iter_mut().enumerate() {
        *byte = (i * 3) as u8;
    }
    ring.publish(slot);

    let (write, read) = ring.consumer_snapshot();
    assert_eq!(read, 0);
    assert!(write > 0);
    let (ty, params, size) = ring.header_at(0);
    assert_eq!(ty, CommandType::UpdateVram as u8);
    assert_eq!(params, 7);
    assert_eq!(size, 24);
    let payload = ring.payload_at(0, size);
    assert_eq!(payload[0], 0);
    assert_eq!(payload[5], 15);
    ring.store_read(size);
}

#[test]
fn test_wake_threshold_gates_plain_publish() {
    let ring = test_ring(4096, 64);

    // Below the threshold: no signal.
    let slot = ring.allocate(CommandType::FillVram, 0, 32);
    ring.publish(slot);
    assert_eq!(ring.wake_count_value(), 0);

    // Crossing the threshold signals the consumer.
    let slot = ring.allocate(CommandType::FillVram, 0, 40);
    ring.publish(slot);
    assert_eq!(ring.wake_count_value(), 2);
}

#[test]
fn test_publish_and_wake_always_signals() {
    let ring = test_ring(4096, u32::MAX);
    let slot = ring.allocate(CommandType::FillVram, 0, 32);
    ring.publish_and_wake(slot);
    assert_eq!(ring.wake_count_value(), 2);
}

#[test]
fn test_sleep_consumer_acknowledges_work() {
    let ring = test_ring(4096, u32::MAX);
    ring.wake_consumer();
    ring.wake_consumer();
    assert_eq!(ring.wake_count_value(), 4);

    // Work pending: the consumer acknowledges and keeps going.
    assert!(ring.sleep_consumer(false));
    assert_eq!(ring.wake_count_value(), 0);

    // Nothing pending and sleeping disallowed: run idle instead.
    assert!(!ring.sleep_consumer(false));
}

#[test]
fn test_sync_returns_when_consumer_sleeps() {
    let ring = Arc::new(test_ring(4096, u32::MAX));
    let stop = Arc::new(AtomicBool::new(false));
    let drained = Arc::new(Mutex::new(Vec::new()));

    let consumer = {
        let ring = ring.clone();
        let stop = stop.clone();
        let drained = drained.clone();
        std::thread::spawn(move || loop {
            let (write, read) = ring.consumer_snapshot();
            if read == write {
                if stop.load(Ordering::Relaxed) {
                    // Final acknowledge so a waiting producer is released.
                    let _ = ring.sleep_consumer(false);
                    return;
                }
                ring.sleep_consumer(true);
                continue;
            }
            let batch = drain_batch(&ring);
            drained.lock().unwrap().extend(batch);
        })
    };

    // Let the consumer park, then publish with sync. The producer must
    // come back once the batch is drained.
    std::thread::sleep(Duration::from_millis(20));
    let start = Instant::now();
    let slot = ring.allocate(CommandType::FillVram, 0, 64);
    ring.publish_and_sync(slot, false);
    let elapsed = start.elapsed();

    assert_eq!(ring.pending_size(), 0);
    assert_eq!(drained.lock().unwrap().len(), 1);
    // Generous bound; the wake itself is microseconds.
    assert!(elapsed < Duration::from_millis(500));

    stop.store(true, Ordering::Relaxed);
    ring.wake_consumer();
    consumer.join().unwrap();
}

#[test]
fn test_allocate_blocks_until_consumer_frees_space() {
    let ring = Arc::new(test_ring(1024, u32::MAX));

    // Fill the ring so the next allocation cannot fit.
    for _ in 0..5 {
        let slot = ring.allocate(CommandType::FillVram, 0, 200);
        ring.publish(slot);
    }

    let producer = {
        let ring = ring.clone();
        std::thread::spawn(move || {
            let slot = ring.allocate(CommandType::FillVram, 0, 200);
            ring.publish(slot);
        })
    };

    // Give the producer time to start spinning, then drain.
    std::thread::sleep(Duration::from_millis(20));
    let mut total = drain_batch(&ring);
    producer.join().unwrap();
    total.extend(drain_batch(&ring));

    let records: Vec<u8> = total
        .iter()
        .map(|&(ty, _)| ty)
        .filter(|&ty| ty != CommandType::Wraparound as u8)
        .collect();
    assert_eq!(records.len(), 6);
}
