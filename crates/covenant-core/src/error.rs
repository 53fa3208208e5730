//! Error types for Covenant

use crate::types::{DaemonId, DaemonStatus, LeafType, Position};
use crate::violation::ValidationReport;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Validation(ValidationReport),

    #[error("UndeclaredLeaf: {leaf} is not a leaf of journal family '{family}'. Add it to {family}::LEAVES or remove it from branch '{branch}'.")]
    UndeclaredLeaf {
        branch: String,
        family: &'static str,
        leaf: LeafType,
    },

    #[error("invalid position {position}: journal '{family}' head is {head}")]
    InvalidPosition {
        family: &'static str,
        position: Position,
        head: Position,
    },

    #[error("cancelled")]
    Cancelled,

    #[error("transmuter {transmuter} cannot handle {leaf}: outside its declared domain")]
    OutOfDomain { transmuter: String, leaf: LeafType },

    #[error("route {source_leaf} -> {target_leaf} failed at {position}: {reason}. Fix the transform; failed routes are not retried.")]
    TransformFailed {
        source_leaf: LeafType,
        target_leaf: LeafType,
        position: Position,
        reason: String,
    },

    #[error("daemon '{daemon}' cannot move from {from} to {to}")]
    InvalidTransition {
        daemon: DaemonId,
        from: DaemonStatus,
        to: DaemonStatus,
    },

    #[error("daemon '{daemon}' failed to start: {reason}; rolled back [{}]. Fix the daemon's start-up dependency and restart the scope.", join_ids(.rolled_back))]
    StartupFailed {
        daemon: DaemonId,
        #[source]
        reason: Box<Error>,
        rolled_back: Vec<DaemonId>,
    },

    #[error("daemon '{daemon}' did not start within {after_ms}ms")]
    StartTimeout { daemon: DaemonId, after_ms: u64 },

    #[error("daemon '{daemon}' required by branch '{branch}' is not registered. Register it in the branch's register() call.")]
    DaemonNotRegistered { daemon: DaemonId, branch: String },

    #[error("daemon '{daemon}' failed: {reason}")]
    DaemonFailed { daemon: DaemonId, reason: String },

    #[error("shutdown failed for [{}]", join_failures(.failures))]
    ShutdownFailed { failures: Vec<(DaemonId, String)> },

    #[error("config error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn out_of_domain(transmuter: impl Into<String>, leaf: LeafType) -> Self {
        Self::OutOfDomain {
            transmuter: transmuter.into(),
            leaf,
        }
    }

    pub fn daemon_failed(daemon: &DaemonId, reason: impl Into<String>) -> Self {
        Self::DaemonFailed {
            daemon: daemon.clone(),
            reason: reason.into(),
        }
    }

    pub fn invalid_transition(daemon: &DaemonId, from: DaemonStatus, to: DaemonStatus) -> Self {
        Self::InvalidTransition {
            daemon: daemon.clone(),
            from,
            to,
        }
    }

    /// Cancellation is the expected way for loops to end; callers treat it as
    /// normal completion.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

fn join_ids(ids: &[DaemonId]) -> String {
    ids.iter().map(|d| d.as_str()).collect::<Vec<_>>().join(", ")
}

fn join_failures(failures: &[(DaemonId, String)]) -> String {
    failures
        .iter()
        .map(|(d, reason)| format!("{}: {}", d, reason))
        .collect::<Vec<_>>()
        .join("; ")
}
