//! Monotonic counters for envelopes sent and received.
//!
//! # What is counted? (for beginners)
//!
//! A comm session keeps one counter per direction.  The transmit counter
//! advances once for every envelope written to the port and doubles as the
//! source of message ids: the id of a request is the low 16 bits of the
//! transmit count at the time it is sent.  The receive counter advances once
//! for every reply that matched its request, so after N successful exchanges
//! both counters read N, and a timeout shows up as tx running ahead of rx.
//!
//! # Thread safety
//!
//! The counter uses `AtomicU64` internally, so it can be read from a
//! monitoring thread while the session thread increments it.  Counters never
//! go backwards and are never reset while a session is open.

use std::sync::atomic::{AtomicU64, Ordering};

/// A thread-safe, monotonically increasing counter.
///
/// # Examples
///
/// ```rust
/// use swordfish_core::SequenceCounter;
///
/// let counter = SequenceCounter::new();
/// assert_eq!(counter.next(), 0);
/// assert_eq!(counter.next(), 1);
/// assert_eq!(counter.current(), 2);
/// ```
#[derive(Debug)]
pub struct SequenceCounter {
    inner: AtomicU64,
}

impl SequenceCounter {
    /// Creates a new counter starting at 0.
    pub fn new() -> Self {
        Self {
            inner: AtomicU64::new(0),
        }
    }

    /// Returns the current value and atomically increments the counter.
    ///
    /// Wraps from `u64::MAX` to 0 without panicking.
    pub fn next(&self) -> u64 {
        // Relaxed: the value orders nothing but itself.
        self.inner.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns the current value without incrementing.
    pub fn current(&self) -> u64 {
        self.inner.load(Ordering::Relaxed)
    }

    /// The message id a request sent now would carry.
    pub fn current_id(&self) -> u16 {
        (self.current() & 0xFFFF) as u16
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_sequence_counter_starts_at_zero() {
        // Arrange
        let counter = SequenceCounter::new();

        // Act
        let first = counter.next();

        // Assert
        assert_eq!(first, 0);
        assert_eq!(counter.current(), 1);
    }

    #[test]
    fn test_sequence_counter_wraps_at_u64_max() {
        // Arrange – start the counter one step before overflow
        let counter = SequenceCounter {
            inner: AtomicU64::new(u64::MAX),
        };

        // Act
        let before_wrap = counter.next();
        let after_wrap = counter.next();

        // Assert
        assert_eq!(before_wrap, u64::MAX);
        assert_eq!(after_wrap, 0, "counter must wrap to 0 after u64::MAX");
    }

    #[test]
    fn test_current_id_uses_low_sixteen_bits() {
        let counter = SequenceCounter {
            inner: AtomicU64::new(0x1_0005),
        };
        assert_eq!(counter.current_id(), 5);
    }

    #[test]
    fn test_sequence_counter_is_thread_safe() {
        // Arrange
        let counter = Arc::new(SequenceCounter::new());
        let thread_count = 4;
        let increments_per_thread = 500;

        // Act
        let handles: Vec<_> = (0..thread_count)
            .map(|_| {
                let c = Arc::clone(&counter);
                thread::spawn(move || {
                    for _ in 0..increments_per_thread {
                        c.next();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().expect("thread panicked");
        }

        // Assert
        assert_eq!(
            counter.current(),
            (thread_count * increments_per_thread) as u64
        );
    }
}
