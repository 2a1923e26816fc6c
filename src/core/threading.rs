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

//! Thread synchronization primitives
//!
//! The GPU worker needs a counting semaphore for its spin/park wake
//! protocol and a monotonic nanosecond clock for scheduled presentation.
//! Both are built from std primitives.

use std::sync::{Condvar, Mutex, OnceLock};
use std::time::{Duration, Instant};

/// Counting semaphore
///
/// Posts accumulate: a `post` that arrives before the matching `wait` is
/// banked, so the wake protocol never loses a signal when the two threads
/// race on the sleep transition.
///
/// # Examples
///
/// ```
/// use prism_core::core::threading::Semaphore;
///
/// let sem = Semaphore::new();
/// sem.post();
/// sem.wait(); // consumes the banked post without blocking
/// ```
pub struct Semaphore {
    count: Mutex<u32>,
    cond: Condvar,
}

impl Semaphore {
    /// Create a semaphore with a count of zero
    pub fn new() -> Self {
        Self {
            count: Mutex::new(0),
            cond: Condvar::new(),
        }
    }

    /// Increment the count and wake one waiter
    pub fn post(&self) {
        let mut count = self.count.lock().unwrap();
        *count += 1;
        self.cond.notify_one();
    }

    /// Block until the count is non-zero, then decrement it
    pub fn wait(&self) {
        let mut count = self.count.lock().unwrap();
        while *count == 0 {
            count = self.cond.wait(count).unwrap();
        }
        *count -= 1;
    }

    /// Decrement the count if it is non-zero
    ///
    /// # Returns
    /// `true` if a post was consumed, `false` if the count was zero
    pub fn try_wait(&self) -> bool {
        let mut count = self.count.lock().unwrap();
        if *count > 0 {
            *count -= 1;
            true
        } else {
            false
        }
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Self::new()
    }
}

/// Monotonic nanoseconds since the first call in this process
///
/// Used as the time base for scheduled presentation; a value of zero means
/// "no schedule".
pub fn monotonic_nanos() -> u64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    let epoch = *EPOCH.get_or_init(Instant::now);
    // Never return 0, which callers treat as "unscheduled".
    (Instant::now().duration_since(epoch).as_nanos() as u64).max(1)
}

/// Sleep until a monotonic-nanosecond deadline
///
/// Sleeps most of the interval, then spins out the final stretch when
/// `spin_tail` is set so the wakeup lands close to the deadline.
///
/// # Arguments
/// * `deadline_nanos` - Target time from [`monotonic_nanos`]
/// * `spin_tail` - Spin for the last part of the wait instead of sleeping
pub fn sleep_until(deadline_nanos: u64, spin_tail: bool) {
    const SPIN_TAIL_NANOS: u64 = 500_000;

    loop {
        let now = monotonic_nanos();
        if now >= deadline_nanos {
            return;
        }
        let remaining = deadline_nanos - now;
        if spin_tail && remaining <= SPIN_TAIL_NANOS {
            while monotonic_nanos() < deadline_nanos {
                std::hint::spin_loop();
            }
            return;
        }
        let sleep_for = if spin_tail {
            remaining.saturating_sub(SPIN_TAIL_NANOS)
        } else {
            remaining
        };
        std::thread::sleep(Duration::from_nanos(sleep_for.max(1)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_semaphore_banked_post() {
        let sem = Semaphore::new();
        sem.post();
        sem.post();
        sem.wait();
        assert!(sem.try_wait());
        assert!(!sem.try_wait());
    }

    #[test]
    fn test_semaphore_cross_thread() {
        let sem = Arc::new(Semaphore::new());
        let sem2 = sem.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            sem2.post();
        });
        sem.wait();
        handle.join().unwrap();
    }

    #[test]
    fn test_monotonic_nanos_advances() {
        let a = monotonic_nanos();
        std::thread::sleep(Duration::from_millis(1));
        let b = monotonic_nanos();
        assert!(b > a);
    }

    #[test]
    fn test_sleep_until_past_deadline_returns() {
        let now = monotonic_nanos();
        sleep_until(now.saturating_sub(1000), false);
        sleep_until(now.saturating_sub(1000), true);
    }
}
