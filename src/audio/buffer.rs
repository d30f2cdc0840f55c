//! Fixed-capacity circular (ring) buffer for `f32` audio samples.
//!
//! When the buffer is full, new samples **overwrite** the oldest data so that
//! the most-recent `capacity` samples are always available.  The analyzer
//! window and the per-reader playback queues are both built on it: the
//! analyzer copies the newest samples out without consuming them, the
//! playback queues pop the oldest samples first.
//!
//! # Example
//!
//! ```rust
//! use mic_mirror::audio::RingBuffer;
//!
//! let mut buf = RingBuffer::new(4);
//! buf.push_slice(&[1.0, 2.0, 3.0, 4.0, 5.0]); // 5 items → capacity 4 → oldest dropped
//! let mut newest = [0.0; 2];
//! buf.copy_latest(&mut newest);
//! assert_eq!(newest, [4.0, 5.0]);
//! ```

// ---------------------------------------------------------------------------
// RingBuffer
// ---------------------------------------------------------------------------

/// A fixed-capacity circular buffer.
///
/// ## Overflow behaviour
///
/// When [`push_slice`](Self::push_slice) would exceed `capacity`, the oldest
/// samples are silently overwritten.  The buffer never allocates beyond its
/// initial capacity.
pub struct RingBuffer<T> {
    buf: Vec<T>,
    capacity: usize,
    /// Index of the *next* write position (wraps around `capacity`).
    write_pos: usize,
    /// Number of valid samples currently stored (≤ `capacity`).
    len: usize,
}

impl<T: Copy + Default> RingBuffer<T> {
    /// Create a new ring buffer with the given `capacity`.
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "RingBuffer capacity must be > 0");
        Self {
            buf: vec![T::default(); capacity],
            capacity,
            write_pos: 0,
            len: 0,
        }
    }

    /// Append `data` to the buffer.
    ///
    /// If the total number of samples exceeds `capacity`, the oldest samples
    /// are overwritten (circular behaviour).
    pub fn push_slice(&mut self, data: &[T]) {
        for &item in data {
            self.buf[self.write_pos] = item;
            self.write_pos = (self.write_pos + 1) % self.capacity;
            if self.len < self.capacity {
                self.len += 1;
            }
        }
    }

    /// Copy the newest `out.len()` samples into `out` in chronological order
    /// without consuming them.
    ///
    /// When fewer samples are stored than requested, the front of `out` is
    /// filled with `T::default()` so the newest sample always lands last.
    pub fn copy_latest(&self, out: &mut [T]) {
        let wanted = out.len();
        let available = self.len.min(wanted);
        let pad = wanted - available;

        for slot in out.iter_mut().take(pad) {
            *slot = T::default();
        }

        // The newest sample sits just before `write_pos`.
        let start = (self.write_pos + self.capacity - available) % self.capacity;
        for (i, slot) in out[pad..].iter_mut().enumerate() {
            *slot = self.buf[(start + i) % self.capacity];
        }
    }

    /// Pop up to `out.len()` of the oldest samples into `out`.
    ///
    /// Returns the number of samples written; the rest of `out` is untouched.
    pub fn pop_into(&mut self, out: &mut [T]) -> usize {
        let count = self.len.min(out.len());
        let read_pos = (self.write_pos + self.capacity - self.len) % self.capacity;
        for (i, slot) in out.iter_mut().take(count).enumerate() {
            *slot = self.buf[(read_pos + i) % self.capacity];
        }
        self.len -= count;
        count
    }

    /// Drop up to `count` of the oldest samples.  Returns how many went.
    pub fn discard(&mut self, count: usize) -> usize {
        let count = self.len.min(count);
        self.len -= count;
        count
    }

    /// Discard all samples and reset the write position.
    pub fn clear(&mut self) {
        self.write_pos = 0;
        self.len = 0;
    }

    /// Number of valid samples currently stored.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` when the buffer contains no samples.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Maximum number of samples the buffer can hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // ---- copy_latest -------------------------------------------------------

    #[test]
    fn copy_latest_pads_front_when_short() {
        let mut buf = RingBuffer::new(8);
        buf.push_slice(&[1.0_f32, 2.0]);

        let mut out = [9.0_f32; 4];
        buf.copy_latest(&mut out);
        assert_eq!(out, [0.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn copy_latest_after_wraparound_keeps_order() {
        let mut buf = RingBuffer::new(4);
        buf.push_slice(&[1.0_f32, 2.0, 3.0, 4.0, 5.0, 6.0]);

        let mut out = [0.0_f32; 4];
        buf.copy_latest(&mut out);
        assert_eq!(out, [3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn copy_latest_does_not_consume() {
        let mut buf = RingBuffer::new(4);
        buf.push_slice(&[1.0_f32, 2.0, 3.0]);

        let mut first = [0.0_f32; 3];
        let mut second = [0.0_f32; 3];
        buf.copy_latest(&mut first);
        buf.copy_latest(&mut second);

        assert_eq!(first, second);
        assert_eq!(buf.len(), 3);
    }

    // ---- pop_into ----------------------------------------------------------

    #[test]
    fn pop_into_returns_oldest_first() {
        let mut buf = RingBuffer::new(8);
        buf.push_slice(&[1.0_f32, 2.0, 3.0]);

        let mut out = [0.0_f32; 2];
        assert_eq!(buf.pop_into(&mut out), 2);
        assert_eq!(out, [1.0, 2.0]);
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn overflow_then_pop_drops_oldest() {
        let mut buf = RingBuffer::new(4);
        buf.push_slice(&[1.0_f32, 2.0, 3.0, 4.0, 5.0]); // 5 > capacity(4)

        let mut out = [0.0_f32; 4];
        assert_eq!(buf.pop_into(&mut out), 4);
        // 1.0 was overwritten; remaining order must be preserved
        assert_eq!(out, [2.0, 3.0, 4.0, 5.0]);
        assert!(buf.is_empty());
    }

    #[test]
    fn pop_into_on_underrun_leaves_tail_untouched() {
        let mut buf = RingBuffer::new(4);
        buf.push_slice(&[1.0_f32]);

        let mut out = [7.0_f32; 3];
        assert_eq!(buf.pop_into(&mut out), 1);
        assert_eq!(out, [1.0, 7.0, 7.0]);
    }

    #[test]
    fn interleaved_push_and_pop() {
        let mut buf = RingBuffer::new(3);
        buf.push_slice(&[1.0_f32, 2.0]);
        let mut one = [0.0_f32; 1];
        buf.pop_into(&mut one);
        buf.push_slice(&[3.0, 4.0]);

        let mut out = [0.0_f32; 3];
        assert_eq!(buf.pop_into(&mut out), 3);
        assert_eq!(out, [2.0, 3.0, 4.0]);
    }

    #[test]
    fn discard_drops_oldest_and_keeps_order() {
        let mut buf = RingBuffer::new(4);
        buf.push_slice(&[1.0_f32, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(buf.discard(2), 2);

        let mut out = [0.0_f32; 2];
        assert_eq!(buf.pop_into(&mut out), 2);
        assert_eq!(out, [4.0, 5.0]);
        assert_eq!(buf.discard(3), 0);
    }

    // ---- clear / capacity --------------------------------------------------

    #[test]
    fn clear_resets_state() {
        let mut buf = RingBuffer::new(4);
        buf.push_slice(&[1.0_f32, 2.0, 3.0, 4.0, 5.0]);
        buf.clear();

        assert!(buf.is_empty());
        assert_eq!(buf.len(), 0);
        assert_eq!(buf.capacity(), 4);
    }

    // ---- Panic guard -------------------------------------------------------

    #[test]
    #[should_panic(expected = "RingBuffer capacity must be > 0")]
    fn zero_capacity_panics() {
        let _buf: RingBuffer<f32> = RingBuffer::new(0);
    }
}
