//! Tests for covenant-journal: MemoryJournal write, tail, read_backward, wait_for

use covenant_core::{Error, JournalEntry, LeafType, Position};
use covenant_journal::*;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const PING: LeafType = LeafType::new("Ping");
const PONG: LeafType = LeafType::new("Pong");

#[derive(Clone, Debug, PartialEq)]
enum PingEntry {
    Ping(u32),
    Pong(u32),
}

impl JournalEntry for PingEntry {
    const FAMILY: &'static str = "ping";
    const LEAVES: &'static [LeafType] = &[PING, PONG];

    fn leaf_type(&self) -> LeafType {
        match self {
            Self::Ping(_) => PING,
            Self::Pong(_) => PONG,
        }
    }
}

const WAIT: Duration = Duration::from_secs(2);

// ===========================================================================
// write / head
// ===========================================================================

#[tokio::test]
async fn write_assigns_increasing_positions() {
    let journal = MemoryJournal::<PingEntry>::new();
    assert_eq!(journal.head().await, Position::ORIGIN);

    let a = journal.write(PingEntry::Ping(1)).await.unwrap();
    let b = journal.write(PingEntry::Pong(1)).await.unwrap();
    assert_eq!(a, Position(1));
    assert_eq!(b, Position(2));
    assert_eq!(journal.head().await, b);
    assert_eq!(journal.len().await, 2);
}

#[tokio::test]
async fn concurrent_writers_never_share_a_position() {
    let journal = Arc::new(MemoryJournal::<PingEntry>::new());
    let mut handles = Vec::new();
    for w in 0..8u32 {
        let j = journal.clone();
        handles.push(tokio::spawn(async move {
            let mut positions = Vec::new();
            for i in 0..50u32 {
                positions.push(j.write(PingEntry::Ping(w * 100 + i)).await.unwrap());
            }
            positions
        }));
    }

    let mut all = Vec::new();
    for h in handles {
        let positions = h.await.unwrap();
        // Each writer observes its own positions in increasing order.
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        all.extend(positions);
    }
    all.sort();
    all.dedup();
    assert_eq!(all.len(), 400);
    assert_eq!(all.first(), Some(&Position(1)));
    assert_eq!(all.last(), Some(&Position(400)));
}

// ===========================================================================
// tail
// ===========================================================================

#[tokio::test]
async fn round_trip_write_then_tail_and_read_backward() {
    let journal = MemoryJournal::<PingEntry>::new();
    let p = journal.write(PingEntry::Ping(7)).await.unwrap();

    let mut tail = journal.tail(Position::ORIGIN, CancellationToken::new());
    let (pos, entry) = tail.next().await.unwrap().unwrap();
    assert_eq!(pos, p);
    assert_eq!(entry, PingEntry::Ping(7));

    let mut back = journal.read_backward(p.next());
    let (pos, entry) = back.next().await.unwrap().unwrap();
    assert_eq!(pos, p);
    assert_eq!(entry, PingEntry::Ping(7));
}

#[tokio::test]
async fn tail_starts_strictly_after_position() {
    let journal = MemoryJournal::<PingEntry>::new();
    for i in 0..3 {
        journal.write(PingEntry::Ping(i)).await.unwrap();
    }
    let mut tail = journal.tail(Position(2), CancellationToken::new());
    let (pos, entry) = tail.next().await.unwrap().unwrap();
    assert_eq!(pos, Position(3));
    assert_eq!(entry, PingEntry::Ping(2));
}

#[tokio::test]
async fn tail_suspends_until_new_entry_arrives() {
    let journal = Arc::new(MemoryJournal::<PingEntry>::new());
    let mut tail = journal.tail(Position::ORIGIN, CancellationToken::new());

    let pending = tokio::time::timeout(Duration::from_millis(50), tail.next()).await;
    assert!(pending.is_err(), "tail should suspend on an empty journal");

    let j = journal.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        j.write(PingEntry::Pong(9)).await.unwrap();
    });

    let (pos, entry) = tokio::time::timeout(WAIT, tail.next())
        .await
        .expect("tail should wake on write")
        .unwrap()
        .unwrap();
    assert_eq!(pos, Position(1));
    assert_eq!(entry, PingEntry::Pong(9));
}

#[tokio::test]
async fn independent_tail_cursors_see_every_entry() {
    let journal = Arc::new(MemoryJournal::<PingEntry>::new());
    let cancel = CancellationToken::new();
    let mut first = journal.tail(Position::ORIGIN, cancel.clone());
    let mut second = journal.tail(Position::ORIGIN, cancel.clone());

    for i in 0..5 {
        journal.write(PingEntry::Ping(i)).await.unwrap();
    }

    // Drain the first cursor fully before touching the second.
    for expected in 1..=5u64 {
        let (pos, _) = first.next().await.unwrap().unwrap();
        assert_eq!(pos, Position(expected));
    }
    for expected in 1..=5u64 {
        let (pos, _) = second.next().await.unwrap().unwrap();
        assert_eq!(pos, Position(expected));
    }
}

#[tokio::test]
async fn tail_ends_with_cancelled_error() {
    let journal: MemoryJournal<PingEntry> = MemoryJournal::<PingEntry>::new();
    let cancel = CancellationToken::new();
    let mut tail = journal.tail(Position::ORIGIN, cancel.clone());

    let c = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        c.cancel();
    });

    let item = tokio::time::timeout(WAIT, tail.next()).await.unwrap().unwrap();
    assert!(matches!(item, Err(Error::Cancelled)));
    assert!(tail.next().await.is_none());
}

// ===========================================================================
// read_backward
// ===========================================================================

#[tokio::test]
async fn read_backward_walks_to_origin_and_restarts() {
    let journal = MemoryJournal::<PingEntry>::new();
    for i in 1..=4 {
        journal.write(PingEntry::Ping(i)).await.unwrap();
    }

    let positions: Vec<u64> = journal
        .read_backward(Position(4))
        .map(|item| item.unwrap().0.value())
        .collect()
        .await;
    assert_eq!(positions, vec![3, 2, 1]);

    // A second call replays the same walk.
    let again: Vec<u64> = journal
        .read_backward(Position(4))
        .map(|item| item.unwrap().0.value())
        .collect()
        .await;
    assert_eq!(again, positions);
}

#[tokio::test]
async fn read_backward_on_empty_journal_is_empty() {
    let journal: MemoryJournal<PingEntry> = MemoryJournal::<PingEntry>::new();
    let items: Vec<_> = journal.read_backward(Position(1)).collect().await;
    assert!(items.is_empty());
    let items: Vec<_> = journal.read_backward(Position::ORIGIN).collect().await;
    assert!(items.is_empty());
}

#[tokio::test]
async fn read_backward_beyond_head_is_invalid() {
    let journal = MemoryJournal::<PingEntry>::new();
    journal.write(PingEntry::Ping(1)).await.unwrap();
    let items: Vec<_> = journal.read_backward(Position(10)).collect().await;
    assert_eq!(items.len(), 1);
    assert!(matches!(items[0], Err(Error::InvalidPosition { .. })));
}

// ===========================================================================
// wait_for
// ===========================================================================

#[tokio::test]
async fn wait_for_returns_existing_match() {
    let journal = MemoryJournal::<PingEntry>::new();
    journal.write(PingEntry::Ping(1)).await.unwrap();
    journal.write(PingEntry::Pong(1)).await.unwrap();

    let is_pong = |e: &PingEntry| e.leaf_type() == PONG;
    let (pos, entry) = journal
        .wait_for(Position::ORIGIN, &is_pong, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(pos, Position(2));
    assert_eq!(entry, PingEntry::Pong(1));
}

#[tokio::test]
async fn wait_for_includes_the_from_position() {
    let journal = MemoryJournal::<PingEntry>::new();
    journal.write(PingEntry::Ping(1)).await.unwrap();
    journal.write(PingEntry::Ping(2)).await.unwrap();

    let any = |_: &PingEntry| true;
    let (pos, _) = journal
        .wait_for(Position(2), &any, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(pos, Position(2));
}

#[tokio::test]
async fn wait_for_suspends_until_match() {
    let journal = Arc::new(MemoryJournal::<PingEntry>::new());
    let j = journal.clone();
    tokio::spawn(async move {
        j.write(PingEntry::Ping(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        j.write(PingEntry::Pong(42)).await.unwrap();
    });

    let is_pong = |e: &PingEntry| matches!(e, PingEntry::Pong(_));
    let (_, entry) = tokio::time::timeout(
        WAIT,
        journal.wait_for(Position::ORIGIN, &is_pong, CancellationToken::new()),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(entry, PingEntry::Pong(42));
}

#[tokio::test]
async fn wait_for_honours_cancellation() {
    let journal: MemoryJournal<PingEntry> = MemoryJournal::<PingEntry>::new();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let never = |_: &PingEntry| false;
    let result = journal.wait_for(Position::ORIGIN, &never, cancel).await;
    assert!(matches!(result, Err(Error::Cancelled)));
}
