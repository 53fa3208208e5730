//! Covenant - typed, event-sourced routing between independently built
//! branches.
//!
//! Re-exports the workspace crates under one roof and carries the demo
//! covenant the `covenant` binary runs.

pub mod demo;

pub use covenant_core;
pub use covenant_journal;
pub use covenant_runtime;
pub use covenant_stream;
