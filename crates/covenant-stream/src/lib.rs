//! Covenant Stream - transmuters, window policies, and shattering
//!
//! A transmuter decides *what* an entry becomes, a window policy decides
//! *when* buffered chunks flush, and the pump decides *which* entries are
//! offered at all (by leaf type, before any transmuter runs).

pub mod chunk;
pub mod shatter;
pub mod transmuter;
pub mod window;

pub use chunk::Chunk;
pub use shatter::{shatter_chunk, ParagraphShatter, ShatterPolicy};
pub use transmuter::{Batch, BatchTransmuter, FnTransmuter, TextAggregator, Transmuter};
pub use window::{AnyOf, IdleTimeout, LengthCap, ParagraphBoundary, Window, WindowBuffer, WindowPolicy};
