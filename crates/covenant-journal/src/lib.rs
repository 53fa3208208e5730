//! Covenant Journal - append-only typed logs with live tailing

pub mod journal;
pub mod memory;

pub use journal::{Journal, JournalStream, Predicate};
pub use memory::MemoryJournal;
