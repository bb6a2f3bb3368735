// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A process-wide-shareable monotonic counter. Endpoints hand out
/// `PeerId`s and REQ correlation sequence numbers from one of these;
/// cloning shares the same underlying counter (the teacher's
/// single-threaded `Rc<Cell<usize>>` becomes an `Arc<AtomicUsize>` now
/// that workers run on real OS threads instead of one event loop).
#[derive(Clone)]
pub struct IdSequence {
    value: Arc<AtomicUsize>,
}

impl IdSequence {
    pub fn new() -> IdSequence {
        IdSequence {
            value: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn next(&self) -> usize {
        self.value.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for IdSequence {
    fn default() -> Self {
        IdSequence::new()
    }
}

/// An exponential back-off schedule: starts at `initial`, grows by
/// `multiplier` after each delay, never exceeds `cap`. Once the delay has
/// been at `cap` for `max_cap_hits` consecutive attempts, `next_delay`
/// returns `None` so the caller can give up. Pass `max_cap_hits =
/// u32::MAX` for a back-off that never gives up, as the dialer's
/// reconnect loop does.
pub struct BackOff {
    current: Duration,
    multiplier: f64,
    cap: Duration,
    cap_hits: u32,
    max_cap_hits: u32,
}

impl BackOff {
    pub fn new(initial: Duration, multiplier: f64, cap: Duration, max_cap_hits: u32) -> BackOff {
        BackOff {
            current: initial,
            multiplier,
            cap,
            cap_hits: 0,
            max_cap_hits,
        }
    }

    /// The delay to sleep before the next attempt, or `None` if the
    /// schedule is exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.cap_hits >= self.max_cap_hits {
            return None;
        }

        let delay = self.current;

        if self.current >= self.cap {
            self.current = self.cap;
            self.cap_hits += 1;
        } else {
            let scaled = self.current.mul_f64(self.multiplier);
            self.current = if scaled > self.cap { self.cap } else { scaled };
        }

        Some(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_sequence_can_be_cloned_and_shares_state() {
        let seq = IdSequence::new();
        let other = seq.clone();

        assert_eq!(0, other.next());
        assert_eq!(1, seq.next());
        assert_eq!(2, seq.next());
        assert_eq!(3, other.next());
    }

    #[test]
    fn backoff_grows_then_caps_then_gives_up() {
        let mut backoff = BackOff::new(
            Duration::from_millis(100),
            2.0,
            Duration::from_millis(300),
            2,
        );

        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(100)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(200)));
        // scaled would be 400ms, clamped to the 300ms cap.
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(300)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(300)));
        assert_eq!(backoff.next_delay(), None);
    }

    #[test]
    fn backoff_never_gives_up_with_max_cap_hits() {
        let mut backoff = BackOff::new(
            Duration::from_millis(100),
            1.5,
            Duration::from_millis(100),
            u32::MAX,
        );

        for _ in 0..1000 {
            assert_eq!(backoff.next_delay(), Some(Duration::from_millis(100)));
        }
    }
}
