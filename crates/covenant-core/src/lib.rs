//! Covenant Core - entry model, manifests, and error handling

pub mod error;
pub mod manifest;
pub mod types;
pub mod violation;

pub use error::{Error, Result};
pub use manifest::{BranchManifest, ManifestBuilder};
pub use types::*;
pub use violation::{ValidationReport, Violation};
