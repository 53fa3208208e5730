//! Window policies — when buffered chunks are ready to emit.
//!
//! A policy sees the whole buffer after every append (and when the pump's
//! idle timer fires). Policies never mutate the buffer; the batch transmuter
//! decides what part of it becomes output and what rolls forward.

use crate::chunk::Chunk;
use crate::transmuter::BatchTransmuter;
use covenant_core::Result;
use std::time::{Duration, Instant};
use tracing::debug;

/// Read-only view of a window buffer.
pub struct Window<'a, C> {
    chunks: &'a [C],
    idle: Duration,
}

impl<'a, C: Chunk> Window<'a, C> {
    /// `idle` is the time since the last chunk was appended.
    pub fn new(chunks: &'a [C], idle: Duration) -> Self {
        Self { chunks, idle }
    }

    pub fn chunks(&self) -> &'a [C] {
        self.chunks
    }

    pub fn idle(&self) -> Duration {
        self.idle
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn char_len(&self) -> usize {
        self.chunks.iter().map(Chunk::char_len).sum()
    }

    pub fn text(&self) -> String {
        self.chunks.iter().map(Chunk::content).collect()
    }
}

pub trait WindowPolicy<C>: Send + Sync {
    fn should_emit(&self, window: &Window<'_, C>) -> bool;

    /// How long a non-empty buffer may sit before the policy wants a second
    /// look. `None` means appends alone drive the policy.
    fn idle_timeout(&self) -> Option<Duration> {
        None
    }
}

/// Emits once the buffer contains a paragraph break (`\n\n`).
#[derive(Clone, Copy, Debug, Default)]
pub struct ParagraphBoundary;

impl<C: Chunk> WindowPolicy<C> for ParagraphBoundary {
    fn should_emit(&self, window: &Window<'_, C>) -> bool {
        // The break may straddle two chunks, so look at the joined text.
        window.text().contains("\n\n")
    }
}

/// Emits once the buffer holds at least `max_chars` characters.
#[derive(Clone, Copy, Debug)]
pub struct LengthCap {
    max_chars: usize,
}

impl LengthCap {
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars: max_chars.max(1),
        }
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }
}

impl<C: Chunk> WindowPolicy<C> for LengthCap {
    fn should_emit(&self, window: &Window<'_, C>) -> bool {
        window.char_len() >= self.max_chars
    }
}

/// Emits a non-empty buffer that has been quiet for `after`.
#[derive(Clone, Copy, Debug)]
pub struct IdleTimeout {
    after: Duration,
}

impl IdleTimeout {
    pub fn new(after: Duration) -> Self {
        Self { after }
    }
}

impl<C: Chunk> WindowPolicy<C> for IdleTimeout {
    fn should_emit(&self, window: &Window<'_, C>) -> bool {
        !window.is_empty() && window.idle() >= self.after
    }

    fn idle_timeout(&self) -> Option<Duration> {
        Some(self.after)
    }
}

/// Composite policy: emits when any child policy triggers.
pub struct AnyOf<C> {
    policies: Vec<Box<dyn WindowPolicy<C>>>,
}

impl<C> Default for AnyOf<C> {
    fn default() -> Self {
        Self { policies: Vec::new() }
    }
}

impl<C: Chunk + 'static> AnyOf<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn or(mut self, policy: impl WindowPolicy<C> + 'static) -> Self {
        self.policies.push(Box::new(policy));
        self
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

impl<C: Chunk> WindowPolicy<C> for AnyOf<C> {
    fn should_emit(&self, window: &Window<'_, C>) -> bool {
        self.policies.iter().any(|p| p.should_emit(window))
    }

    fn idle_timeout(&self) -> Option<Duration> {
        self.policies.iter().filter_map(|p| p.idle_timeout()).min()
    }
}

/// Growing buffer of chunks waiting for a policy to flush them.
pub struct WindowBuffer<C> {
    chunks: Vec<C>,
    last_push: Option<Instant>,
}

impl<C> Default for WindowBuffer<C> {
    fn default() -> Self {
        Self {
            chunks: Vec::new(),
            last_push: None,
        }
    }
}

impl<C: Chunk> WindowBuffer<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: C, now: Instant) {
        self.chunks.push(chunk);
        self.last_push = Some(now);
    }

    pub fn chunks(&self) -> &[C] {
        &self.chunks
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Time since the last push, zero for an empty buffer.
    pub fn idle(&self, now: Instant) -> Duration {
        self.last_push
            .map(|at| now.saturating_duration_since(at))
            .unwrap_or_default()
    }

    /// Flush as many batches as the policy asks for.
    ///
    /// After each flush the remainder seeds the buffer as if freshly pushed
    /// and the policy is asked again, so one long append can produce several
    /// outputs. Flushing stops as soon as a remainder is no shorter than the
    /// buffer it came from.
    pub fn drain_ready<T>(
        &mut self,
        policy: &dyn WindowPolicy<C>,
        transmuter: &dyn BatchTransmuter<C, T>,
        now: Instant,
    ) -> Result<Vec<T>> {
        let mut idle = self.idle(now);
        let mut outputs = Vec::new();
        while !self.chunks.is_empty() {
            let window = Window::new(&self.chunks, idle);
            if !policy.should_emit(&window) {
                break;
            }
            let before = window.char_len();
            let batch = transmuter.transmute(&self.chunks)?;
            debug!(
                "{}: flushed window of {} chars (remainder: {})",
                transmuter.name(),
                before,
                batch.has_remainder()
            );
            outputs.push(batch.output);
            self.chunks.clear();
            if let Some(rest) = batch.remainder {
                let after = rest.char_len();
                self.chunks.push(rest);
                self.last_push = Some(now);
                idle = Duration::ZERO;
                if after >= before {
                    break;
                }
            }
        }
        if self.chunks.is_empty() {
            self.last_push = None;
        }
        Ok(outputs)
    }
}
