//! Transmuters — pure entry transforms
//!
//! A transmuter is total over its declared domain and has no side effects.
//! It never filters: the pump only offers entries of the route's source leaf
//! type, and anything else is a bug reported as `Error::OutOfDomain`.

use crate::chunk::Chunk;
use crate::shatter::byte_index_of_char;
use covenant_core::{Error, Result};

pub trait Transmuter<S, T>: Send + Sync {
    fn transmute(&self, entry: &S) -> Result<T>;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Adapter turning a closure into a [`Transmuter`].
pub struct FnTransmuter<F> {
    name: String,
    f: F,
}

impl<F> FnTransmuter<F> {
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<S, T, F> Transmuter<S, T> for FnTransmuter<F>
where
    F: Fn(&S) -> Result<T> + Send + Sync,
{
    fn transmute(&self, entry: &S) -> Result<T> {
        (self.f)(entry)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Output of one window flush.
#[derive(Clone, Debug, PartialEq)]
pub struct Batch<T, C> {
    pub output: T,
    /// Content that did not fit and seeds the next window.
    pub remainder: Option<C>,
}

impl<T, C> Batch<T, C> {
    pub fn complete(output: T) -> Self {
        Self {
            output,
            remainder: None,
        }
    }

    pub fn has_remainder(&self) -> bool {
        self.remainder.is_some()
    }
}

/// Aggregates a window of chunks into one output entry.
pub trait BatchTransmuter<C, T>: Send + Sync {
    fn transmute(&self, chunks: &[C]) -> Result<Batch<T, C>>;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Joins chunk text, optionally capped at `max_chars` characters.
///
/// Whole chunks are kept while they fit; the first chunk that would overflow
/// the cap (and everything after it) becomes the remainder. A single chunk
/// longer than the cap is split at the cap.
pub struct TextAggregator<F> {
    name: String,
    max_chars: Option<usize>,
    build: F,
}

impl<F> TextAggregator<F> {
    /// `build` wraps the joined text into the output entry.
    pub fn new(name: impl Into<String>, build: F) -> Self {
        Self {
            name: name.into(),
            max_chars: None,
            build,
        }
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = Some(max_chars.max(1));
        self
    }
}

impl<C, T, F> BatchTransmuter<C, T> for TextAggregator<F>
where
    C: Chunk,
    F: Fn(String) -> T + Send + Sync,
{
    fn transmute(&self, chunks: &[C]) -> Result<Batch<T, C>> {
        let first = chunks
            .first()
            .ok_or_else(|| Error::Internal(format!("{}: empty window", self.name)))?;

        let Some(max) = self.max_chars else {
            return Ok(Batch::complete((self.build)(join(chunks))));
        };

        let mut used = 0;
        let mut fitting = 0;
        for chunk in chunks {
            let len = chunk.char_len();
            if used + len > max {
                break;
            }
            used += len;
            fitting += 1;
        }

        if fitting == chunks.len() {
            return Ok(Batch::complete((self.build)(join(chunks))));
        }

        if fitting > 0 {
            let rest = &chunks[fitting..];
            return Ok(Batch {
                output: (self.build)(join(&chunks[..fitting])),
                remainder: Some(rest[0].with_content(join(rest))),
            });
        }

        // The first chunk alone overflows: split it at the cap.
        let text = join(chunks);
        let cut = byte_index_of_char(&text, max);
        Ok(Batch {
            output: (self.build)(text[..cut].to_string()),
            remainder: Some(first.with_content(text[cut..].to_string())),
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn join<C: Chunk>(chunks: &[C]) -> String {
    chunks.iter().map(Chunk::content).collect()
}
