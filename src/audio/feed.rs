//! Raw sample fan-out between the capture callback and its consumers.
//!
//! The capture thread pushes mono `f32` samples into an [`AudioFeed`].  Two
//! kinds of consumer read from it:
//!
//! * the level analyzer, which copies the newest window of samples without
//!   consuming anything (see [`AudioFeed::copy_window`]);
//! * playable streams, each of which owns a [`FeedReader`] with its own
//!   bounded queue so that several readers never steal samples from each
//!   other.
//!
//! Readers register themselves on creation and are pruned from the feed once
//! dropped.
//!
//! A reader's queue fills from the moment it is created, while its output
//! may only start pulling later.  On its first `fill` a reader drops that
//! backlog and keeps just the newest block; afterwards, whenever clock drift
//! lets the queue grow past [`READER_MAX_LAG_MS`], it skips ahead again.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use super::{samples_for_millis, RingBuffer};

/// Queued audio a reader tolerates beyond the block being filled.
pub const READER_MAX_LAG_MS: u32 = 20;

// ---------------------------------------------------------------------------
// SampleSource
// ---------------------------------------------------------------------------

/// Pull-based source of mono `f32` samples.
///
/// Implementations must fill the whole of `out`; when no input is available
/// they write silence.  `fill` is called from the realtime output callback,
/// so it must not block for long.
pub trait SampleSource: Send {
    fn fill(&mut self, out: &mut [f32]);
}

// ---------------------------------------------------------------------------
// AudioFeed
// ---------------------------------------------------------------------------

type ReaderQueue = Mutex<RingBuffer<f32>>;

struct FeedInner {
    sample_rate: u32,
    /// Newest raw samples, read non-destructively by the analyzer.
    window: Mutex<RingBuffer<f32>>,
    readers: Mutex<Vec<Weak<ReaderQueue>>>,
    /// Capacity of every reader queue, in samples.
    queue_len: usize,
    /// Backlog a reader keeps before skipping ahead, in samples.
    max_lag: usize,
}

/// Cheaply cloneable handle to a live raw audio feed.
#[derive(Clone)]
pub struct AudioFeed {
    inner: Arc<FeedInner>,
}

impl std::fmt::Debug for AudioFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioFeed")
            .field("sample_rate", &self.inner.sample_rate)
            .field("readers", &self.reader_count())
            .finish()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panic on the audio thread must not take the UI down with it.
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl AudioFeed {
    /// Create a feed for mono audio at `sample_rate`.
    ///
    /// * `window_len`: number of newest samples kept for analysis.
    /// * `queue_len` : capacity of each reader queue; a reader that falls
    ///   further behind loses its oldest samples.
    pub fn new(sample_rate: u32, window_len: usize, queue_len: usize) -> Self {
        Self {
            inner: Arc::new(FeedInner {
                sample_rate,
                window: Mutex::new(RingBuffer::new(window_len.max(1))),
                readers: Mutex::new(Vec::new()),
                queue_len: queue_len.max(1),
                max_lag: samples_for_millis(READER_MAX_LAG_MS, sample_rate).max(1),
            }),
        }
    }

    /// Sample rate of the feed in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.inner.sample_rate
    }

    /// Push freshly captured mono samples to the analysis window and to every
    /// live reader.
    pub fn push(&self, samples: &[f32]) {
        lock(&self.inner.window).push_slice(samples);

        let mut readers = lock(&self.inner.readers);
        readers.retain(|weak| match weak.upgrade() {
            Some(queue) => {
                lock(&queue).push_slice(samples);
                true
            }
            None => false,
        });
    }

    /// Copy the newest `out.len()` samples into `out` (zero padded at the
    /// front while the feed is still warming up).
    pub fn copy_window(&self, out: &mut [f32]) {
        lock(&self.inner.window).copy_latest(out);
    }

    /// Register a new reader.  It only sees samples pushed after this call.
    pub fn reader(&self) -> FeedReader {
        let queue = Arc::new(Mutex::new(RingBuffer::new(self.inner.queue_len)));
        lock(&self.inner.readers).push(Arc::downgrade(&queue));
        FeedReader {
            queue,
            max_lag: self.inner.max_lag,
            primed: false,
        }
    }

    /// Number of readers that are still alive.
    pub fn reader_count(&self) -> usize {
        lock(&self.inner.readers)
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Returns `true` when both handles point at the same feed.
    pub fn same_feed(&self, other: &AudioFeed) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

// ---------------------------------------------------------------------------
// FeedReader
// ---------------------------------------------------------------------------

/// One consumer's view of an [`AudioFeed`].
///
/// Dropping the reader unregisters it from the feed.
pub struct FeedReader {
    queue: Arc<ReaderQueue>,
    max_lag: usize,
    /// Set once the first `fill` has dropped the startup backlog.
    primed: bool,
}

impl FeedReader {
    /// Samples currently queued for this reader.
    pub fn queued(&self) -> usize {
        lock(&self.queue).len()
    }
}

impl SampleSource for FeedReader {
    fn fill(&mut self, out: &mut [f32]) {
        let mut queue = lock(&self.queue);
        let backlog = queue.len().saturating_sub(out.len());
        if !self.primed || backlog > self.max_lag {
            let dropped = queue.discard(backlog);
            if dropped > 0 {
                log::trace!("feed: reader skipped {dropped} queued samples");
            }
            self.primed = true;
        }
        let got = queue.pop_into(out);
        drop(queue);
        // Underrun: pad with silence.
        for s in &mut out[got..] {
            *s = 0.0;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
