//! In-memory journal backend
//!
//! Entries live in a `Vec` behind a tokio `RwLock`; the index of an entry is
//! its position minus one. Writers publish the new head on a `watch` channel
//! while still holding the write lock, so tails wake in position order.

use crate::journal::{Journal, JournalStream};
use covenant_core::{Error, JournalEntry, Position, Result};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::debug;

enum Wake {
    Written,
    Cancelled,
    Closed,
}

pub struct MemoryJournal<E> {
    entries: Arc<RwLock<Vec<E>>>,
    head: watch::Sender<Position>,
}

impl<E: JournalEntry> Default for MemoryJournal<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: JournalEntry> MemoryJournal<E> {
    pub fn new() -> Self {
        let (head, _) = watch::channel(Position::ORIGIN);
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
            head,
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Copy of every entry, oldest first.
    pub async fn snapshot(&self) -> Vec<(Position, E)> {
        self.entries
            .read()
            .await
            .iter()
            .enumerate()
            .map(|(i, e)| (Position(i as u64 + 1), e.clone()))
            .collect()
    }
}

#[async_trait::async_trait]
impl<E: JournalEntry> Journal<E> for MemoryJournal<E> {
    async fn write(&self, entry: E) -> Result<Position> {
        let mut entries = self.entries.write().await;
        let leaf = entry.leaf_type();
        entries.push(entry);
        let position = Position(entries.len() as u64);
        self.head.send_replace(position);
        drop(entries);
        debug!("{} journal: wrote {} at {}", E::FAMILY, leaf, position);
        Ok(position)
    }

    async fn head(&self) -> Position {
        *self.head.borrow()
    }

    fn tail(&self, after: Position, cancel: CancellationToken) -> JournalStream<E> {
        let entries = self.entries.clone();
        let mut head_rx = self.head.subscribe();
        Box::pin(async_stream::stream! {
            let mut cursor = after;
            loop {
                if cancel.is_cancelled() {
                    yield Err(Error::Cancelled);
                    break;
                }

                // Mark the current head as seen before reading, so a write that
                // lands after the read still wakes us.
                head_rx.borrow_and_update();
                let batch: Vec<(Position, E)> = {
                    let guard = entries.read().await;
                    let start = (cursor.0 as usize).min(guard.len());
                    guard[start..]
                        .iter()
                        .enumerate()
                        .map(|(i, e)| (Position((start + i) as u64 + 1), e.clone()))
                        .collect()
                };

                if batch.is_empty() {
                    let woke = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => Wake::Cancelled,
                        changed = head_rx.changed() => match changed {
                            Ok(()) => Wake::Written,
                            Err(_) => Wake::Closed,
                        },
                    };
                    match woke {
                        Wake::Written => continue,
                        Wake::Cancelled => {
                            yield Err(Error::Cancelled);
                            break;
                        }
                        Wake::Closed => break,
                    }
                }

                for (position, entry) in batch {
                    cursor = position;
                    yield Ok((position, entry));
                }
            }
        })
    }

    fn read_backward(&self, before: Position) -> JournalStream<E> {
        let entries = self.entries.clone();
        Box::pin(async_stream::stream! {
            let len = entries.read().await.len() as u64;
            if before.0 > len + 1 {
                yield Err(Error::InvalidPosition {
                    family: E::FAMILY,
                    position: before,
                    head: Position(len),
                });
            } else {
                let mut position = before.0.saturating_sub(1);
                while position > 0 {
                    let entry = entries.read().await.get(position as usize - 1).cloned();
                    match entry {
                        Some(entry) => yield Ok((Position(position), entry)),
                        None => break,
                    }
                    position -= 1;
                }
            }
        })
    }
}
