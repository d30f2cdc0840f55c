//! Delay graph construction and teardown.
//!
//! # Graph shape
//!
//! ```text
//! delay = 0:   feed ─────────────────────────────▶ output   (passthrough, no graph)
//!
//! delay > 0:   feed ─┬─▶ DelayLine(delay) ──┐
//!                    │                      (+) ─▶ output
//!                    └──────────────────────┘
//! ```
//!
//! With a delay the direct path stays mixed in, so the delayed copy is heard
//! on top of the live signal rather than replacing it.
//!
//! # Lifecycle
//!
//! [`DelayGraphBuilder`] owns at most one [`AudioGraph`].  Every
//! [`build`](DelayGraphBuilder::build) first releases the previous graph
//! (closing its [`AudioContext`]) and only then constructs the next one;
//! graphs are never updated in place.  A closed context renders silence, so
//! a [`PlayableStream`] that outlives its graph can never be heard.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::audio::{AudioFeed, DelayLine, FeedReader, SampleSource};

use super::MonitorError;

// ---------------------------------------------------------------------------
// ContextRegistry
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RegistryCounters {
    opened: AtomicUsize,
    closed: AtomicUsize,
}

/// Counts processing contexts opened and closed through a builder.
///
/// Cheap to clone; clones share the counters.
#[derive(Clone, Default)]
pub struct ContextRegistry {
    counters: Arc<RegistryCounters>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Contexts opened and not yet closed.
    pub fn live(&self) -> usize {
        // `closed` never passes `opened`, so read it first.
        let closed = self.closed();
        self.opened().saturating_sub(closed)
    }

    pub fn opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for ContextRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextRegistry")
            .field("opened", &self.opened())
            .field("closed", &self.closed())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// AudioContext
// ---------------------------------------------------------------------------

/// Processing context of one graph.
pub struct AudioContext {
    id: u64,
    sample_rate: u32,
    closed: Arc<AtomicBool>,
    registry: ContextRegistry,
}

impl AudioContext {
    fn open(id: u64, sample_rate: u32, registry: &ContextRegistry) -> Self {
        registry.counters.opened.fetch_add(1, Ordering::SeqCst);
        Self {
            id,
            sample_rate,
            closed: Arc::new(AtomicBool::new(false)),
            registry: registry.clone(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Close the context.  Returns `true` only for the call that actually
    /// closed it.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.registry.counters.closed.fetch_add(1, Ordering::SeqCst);
        true
    }
}

impl Drop for AudioContext {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// PlayableStream
// ---------------------------------------------------------------------------

/// What a [`PlayableStream`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// The raw feed, untouched.
    Direct,
    /// Raw feed mixed with a copy delayed by `delay_ms`.
    Delayed { delay_ms: u32 },
}

/// A mono stream ready to be attached to an output.
pub struct PlayableStream {
    source: Box<dyn SampleSource>,
    sample_rate: u32,
    kind: StreamKind,
}

impl PlayableStream {
    /// The raw feed as-is.
    pub fn direct(feed: &AudioFeed) -> Self {
        Self {
            source: Box::new(feed.reader()),
            sample_rate: feed.sample_rate(),
            kind: StreamKind::Direct,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Hand the sample source over to an output callback.
    pub fn into_source(self) -> Box<dyn SampleSource> {
        self.source
    }
}

impl SampleSource for PlayableStream {
    fn fill(&mut self, out: &mut [f32]) {
        self.source.fill(out);
    }
}

impl std::fmt::Debug for PlayableStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayableStream")
            .field("sample_rate", &self.sample_rate)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Render side of a delay graph: direct + delayed paths summed.
struct GraphOutput {
    reader: FeedReader,
    delay: DelayLine,
    closed: Arc<AtomicBool>,
}

impl SampleSource for GraphOutput {
    fn fill(&mut self, out: &mut [f32]) {
        if self.closed.load(Ordering::Relaxed) {
            out.fill(0.0);
            return;
        }
        self.reader.fill(out);
        for s in out.iter_mut() {
            let direct = *s;
            let delayed = self.delay.tick(direct);
            *s = (direct + delayed).clamp(-1.0, 1.0);
        }
    }
}

// ---------------------------------------------------------------------------
// AudioGraph
// ---------------------------------------------------------------------------

/// A built delay graph.  Only ever held by [`DelayGraphBuilder`].
pub struct AudioGraph {
    context: AudioContext,
    delay_ms: u32,
}

impl AudioGraph {
    pub fn delay_ms(&self) -> u32 {
        self.delay_ms
    }

    pub fn context(&self) -> &AudioContext {
        &self.context
    }
}

// ---------------------------------------------------------------------------
// DelayGraphBuilder
// ---------------------------------------------------------------------------

/// Counters describing what a builder has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphStats {
    /// Graphs constructed (delay > 0 and processing available).
    pub built: usize,
    /// Graphs released (their context closed).
    pub released: usize,
    /// Builds answered with the raw feed.
    pub passthrough: usize,
}

/// Builds and releases the single delay graph.
pub struct DelayGraphBuilder {
    processing_enabled: bool,
    max_delay_ms: u32,
    registry: ContextRegistry,
    current: Option<AudioGraph>,
    next_id: u64,
    stats: GraphStats,
}

impl DelayGraphBuilder {
    /// A builder with processing available and delays capped at
    /// `max_delay_ms`.
    pub fn new(max_delay_ms: u32) -> Self {
        Self::with_registry(max_delay_ms, true, ContextRegistry::new())
    }

    /// Full constructor.  With `processing_enabled == false` every build
    /// degrades to passthrough.
    pub fn with_registry(max_delay_ms: u32, processing_enabled: bool, registry: ContextRegistry) -> Self {
        Self {
            processing_enabled,
            max_delay_ms,
            registry,
            current: None,
            next_id: 1,
            stats: GraphStats::default(),
        }
    }

    /// Build the playable stream for `feed` at `delay_ms`.
    ///
    /// Any existing graph is released first.  Delay `0`, or any failure to
    /// construct the graph, yields the raw feed.
    pub fn build(&mut self, feed: &AudioFeed, delay_ms: u32) -> PlayableStream {
        self.release();

        let delay_ms = delay_ms.min(self.max_delay_ms);
        if delay_ms == 0 {
            self.stats.passthrough += 1;
            log::debug!("graph: delay 0, passthrough");
            return PlayableStream::direct(feed);
        }

        match self.construct(feed, delay_ms) {
            Ok(stream) => stream,
            Err(e) => {
                log::warn!("graph: {e}; falling back to passthrough");
                self.stats.passthrough += 1;
                PlayableStream::direct(feed)
            }
        }
    }

    fn construct(&mut self, feed: &AudioFeed, delay_ms: u32) -> Result<PlayableStream, MonitorError> {
        if !self.processing_enabled {
            return Err(MonitorError::GraphBuildUnavailable(
                "audio processing disabled".into(),
            ));
        }
        let sample_rate = feed.sample_rate();
        if sample_rate == 0 {
            return Err(MonitorError::GraphBuildUnavailable(
                "source has no sample rate".into(),
            ));
        }

        let context = AudioContext::open(self.next_id, sample_rate, &self.registry);
        self.next_id += 1;

        let output = GraphOutput {
            reader: feed.reader(),
            delay: DelayLine::from_millis(delay_ms, sample_rate),
            closed: Arc::clone(&context.closed),
        };

        log::debug!(
            "graph: built context #{} ({} ms @ {} Hz)",
            context.id(),
            delay_ms,
            sample_rate
        );

        self.current = Some(AudioGraph { context, delay_ms });
        self.stats.built += 1;

        Ok(PlayableStream {
            source: Box::new(output),
            sample_rate,
            kind: StreamKind::Delayed { delay_ms },
        })
    }

    /// Close and drop the current graph.  Returns `false` when there was
    /// nothing to release.
    pub fn release(&mut self) -> bool {
        let Some(graph) = self.current.take() else {
            return false;
        };
        if graph.context.close() {
            log::debug!("graph: closed context #{}", graph.context.id());
        }
        self.stats.released += 1;
        true
    }

    /// The graph currently held, if any.
    pub fn current(&self) -> Option<&AudioGraph> {
        self.current.as_ref()
    }

    pub fn max_delay_ms(&self) -> u32 {
        self.max_delay_ms
    }

    pub fn stats(&self) -> GraphStats {
        self.stats
    }

    pub fn registry(&self) -> &ContextRegistry {
        &self.registry
    }
}

impl Drop for DelayGraphBuilder {
    fn drop(&mut self) {
        self.release();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
