//! Journal trait
//!
//! A journal is the only resource shared between daemons and pumps. Every
//! backend must assign positions atomically and let any number of tail
//! cursors run side by side.

use covenant_core::{JournalEntry, Position, Result};
use futures::{Stream, StreamExt};
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

/// Stream of positioned entries from a journal.
pub type JournalStream<E> = Pin<Box<dyn Stream<Item = Result<(Position, E)>> + Send>>;

/// Predicate used by [`Journal::wait_for`].
pub type Predicate<E> = dyn Fn(&E) -> bool + Send + Sync;

#[async_trait::async_trait]
pub trait Journal<E: JournalEntry>: Send + Sync {
    /// Append an entry and return its position.
    async fn write(&self, entry: E) -> Result<Position>;

    /// Latest assigned position, or `Position::ORIGIN` when empty.
    async fn head(&self) -> Position;

    /// Live sequence of entries strictly after `after`.
    ///
    /// The stream suspends when caught up and only ends after yielding
    /// `Error::Cancelled` once `cancel` fires (or when the journal is dropped).
    fn tail(&self, after: Position, cancel: CancellationToken) -> JournalStream<E>;

    /// Finite sequence walking from `before - 1` down to the first entry.
    /// Each call starts a fresh walk.
    fn read_backward(&self, before: Position) -> JournalStream<E>;

    /// First entry at or after `from` matching `predicate`, waiting for new
    /// writes until one matches or `cancel` fires.
    async fn wait_for(
        &self,
        from: Position,
        predicate: &Predicate<E>,
        cancel: CancellationToken,
    ) -> Result<(Position, E)> {
        let after = from.prev().unwrap_or(Position::ORIGIN);
        let mut tail = self.tail(after, cancel);
        while let Some(item) = tail.next().await {
            let (position, entry) = item?;
            if predicate(&entry) {
                return Ok((position, entry));
            }
        }
        Err(covenant_core::Error::Cancelled)
    }
}
