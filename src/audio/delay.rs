//! Fixed integer-sample delay line.
//!
//! The delay time is set once at construction; a different delay means a
//! new line (and a new graph around it).  The line starts filled with
//! silence, so the first `delay` samples out are zero.

// ---------------------------------------------------------------------------
// DelayLine
// ---------------------------------------------------------------------------

/// Circular buffer delaying a mono signal by a fixed number of samples.
///
/// ```rust
/// use mic_mirror::audio::DelayLine;
///
/// let mut line = DelayLine::new(2);
/// let mut block = [1.0, 2.0, 3.0, 4.0];
/// line.process(&mut block);
/// assert_eq!(block, [0.0, 0.0, 1.0, 2.0]);
/// ```
#[derive(Debug, Clone)]
pub struct DelayLine {
    buf: Vec<f32>,
    pos: usize,
}

impl DelayLine {
    /// Create a line delaying by `delay_samples` samples.
    pub fn new(delay_samples: usize) -> Self {
        Self {
            buf: vec![0.0; delay_samples],
            pos: 0,
        }
    }

    /// Create a line delaying by `delay_ms` at `sample_rate` Hz.
    pub fn from_millis(delay_ms: u32, sample_rate: u32) -> Self {
        Self::new(samples_for_millis(delay_ms, sample_rate))
    }

    /// Delay length in samples.
    pub fn delay_samples(&self) -> usize {
        self.buf.len()
    }

    /// Delay one sample: returns the sample written `delay_samples` calls ago.
    #[inline]
    pub fn tick(&mut self, input: f32) -> f32 {
        if self.buf.is_empty() {
            return input;
        }
        let out = self.buf[self.pos];
        self.buf[self.pos] = input;
        self.pos += 1;
        if self.pos == self.buf.len() {
            self.pos = 0;
        }
        out
    }

    /// Delay a block in place.
    pub fn process(&mut self, block: &mut [f32]) {
        for s in block {
            *s = self.tick(*s);
        }
    }
}

/// Number of whole samples covering `delay_ms` at `sample_rate` Hz.
pub fn samples_for_millis(delay_ms: u32, sample_rate: u32) -> usize {
    (delay_ms as u64 * sample_rate as u64 / 1_000) as usize
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_length_line_is_passthrough() {
        let mut line = DelayLine::new(0);
        assert_eq!(line.tick(0.3), 0.3);
    }

    #[test]
    fn impulse_reappears_after_delay() {
        let mut line = DelayLine::new(3);
        let out: Vec<f32> = [1.0, 0.0, 0.0, 0.0, 0.0]
            .iter()
            .map(|&s| line.tick(s))
            .collect();
        assert_eq!(out, vec![0.0, 0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn delay_carries_across_blocks() {
        let mut line = DelayLine::new(3);
        let mut a = [1.0, 2.0];
        let mut b = [3.0, 4.0, 5.0];
        line.process(&mut a);
        line.process(&mut b);
        assert_eq!(a, [0.0, 0.0]);
        assert_eq!(b, [0.0, 1.0, 2.0]);
    }

    #[test]
    fn millis_convert_at_sample_rate() {
        assert_eq!(samples_for_millis(300, 48_000), 14_400);
        assert_eq!(samples_for_millis(1_000, 44_100), 44_100);
        assert_eq!(samples_for_millis(0, 48_000), 0);
        assert_eq!(DelayLine::from_millis(10, 16_000).delay_samples(), 160);
    }
}
