//! Covenant validation violations
//!
//! Every violation renders as `<ErrorCode>: <TypeName> <problem>. <suggestion>`
//! so a failed build can be fixed from the log line alone.

use crate::types::LeafType;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum Violation {
    /// A produced leaf has neither a route nor a terminal.
    DeadLetter { leaf: LeafType, branches: Vec<String> },

    /// A produced leaf has more than one disposition: routed and terminal,
    /// routed twice, or declared terminal twice.
    AmbiguousDisposition {
        leaf: LeafType,
        routes: usize,
        terminals: usize,
    },

    /// A route writes back into its own source leaf.
    SelfRoute { leaf: LeafType },

    /// A consumed leaf is never the target of a route.
    OrphanedConsumer { leaf: LeafType, branches: Vec<String> },

    /// A leaf is declared under more than one journal family.
    MultipleJournals {
        leaf: LeafType,
        families: Vec<&'static str>,
    },

    /// A route references a transmuter the container cannot resolve.
    UnregisteredTransmuter {
        leaf: LeafType,
        transmuter: String,
    },

    /// A route or terminal names a leaf no connected branch declares.
    UnknownLeaf { leaf: LeafType, usage: &'static str },

    /// A route is typed against a different family than the manifests declare.
    JournalMismatch {
        leaf: LeafType,
        declared: &'static str,
        routed: &'static str,
    },

    /// A manifest's journal family has no journal registered in the container.
    UnregisteredJournal { family: &'static str, branch: String },

    /// Two connected manifests share a branch name.
    DuplicateBranch { branch: String },
}

impl Violation {
    pub fn code(&self) -> &'static str {
        match self {
            Self::DeadLetter { .. } => "DeadLetter",
            Self::AmbiguousDisposition { .. } => "AmbiguousDisposition",
            Self::SelfRoute { .. } => "SelfRoute",
            Self::OrphanedConsumer { .. } => "OrphanedConsumer",
            Self::MultipleJournals { .. } => "MultipleJournals",
            Self::UnregisteredTransmuter { .. } => "UnregisteredTransmuter",
            Self::UnknownLeaf { .. } => "UnknownLeaf",
            Self::JournalMismatch { .. } => "JournalMismatch",
            Self::UnregisteredJournal { .. } => "UnregisteredJournal",
            Self::DuplicateBranch { .. } => "DuplicateBranch",
        }
    }

    /// The leaf type this violation is about, if it concerns one.
    pub fn leaf(&self) -> Option<LeafType> {
        match self {
            Self::DeadLetter { leaf, .. }
            | Self::AmbiguousDisposition { leaf, .. }
            | Self::SelfRoute { leaf }
            | Self::OrphanedConsumer { leaf, .. }
            | Self::MultipleJournals { leaf, .. }
            | Self::UnregisteredTransmuter { leaf, .. }
            | Self::UnknownLeaf { leaf, .. }
            | Self::JournalMismatch { leaf, .. } => Some(*leaf),
            Self::UnregisteredJournal { .. } | Self::DuplicateBranch { .. } => None,
        }
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: ", self.code())?;
        match self {
            Self::DeadLetter { leaf, branches } => write!(
                f,
                "{leaf} is produced by {} but has no route or terminal. Declare Route({leaf}, <target>) or Terminal({leaf}).",
                quote_all(branches)
            ),
            Self::AmbiguousDisposition {
                leaf,
                routes: 0,
                terminals,
            } => write!(
                f,
                "{leaf} is declared terminal {terminals} times. Keep exactly one Terminal({leaf})."
            ),
            Self::AmbiguousDisposition {
                leaf,
                routes,
                terminals: 0,
            } => write!(
                f,
                "{leaf} is the source of {routes} routes. Keep exactly one route per source type."
            ),
            Self::AmbiguousDisposition { leaf, routes, .. } => write!(
                f,
                "{leaf} is the source of {routes} route(s) and also declared terminal. Keep either the route or the terminal."
            ),
            Self::SelfRoute { leaf } => write!(
                f,
                "{leaf} is routed back into itself, so its pump would re-read its own output. Route {leaf} to a different leaf type."
            ),
            Self::OrphanedConsumer { leaf, branches } => write!(
                f,
                "{leaf} is consumed by {} but no route targets it. Declare Route(<source>, {leaf}).",
                quote_all(branches)
            ),
            Self::MultipleJournals { leaf, families } => write!(
                f,
                "{leaf} is declared under journals [{}]. Rename the leaf in all but one family.",
                families.join(", ")
            ),
            Self::UnregisteredTransmuter { leaf, transmuter } => write!(
                f,
                "{leaf} is routed through transmuter '{transmuter}', which is not registered. Register it with Container::register_transmuter before building."
            ),
            Self::UnknownLeaf { leaf, usage } => write!(
                f,
                "{leaf} is used as a {usage} but no connected branch declares it. Connect the branch that owns {leaf} or remove the declaration."
            ),
            Self::JournalMismatch {
                leaf,
                declared,
                routed,
            } => write!(
                f,
                "{leaf} lives in journal '{declared}' but the route is typed for '{routed}'. Type the route with the '{declared}' entry family."
            ),
            Self::UnregisteredJournal { family, branch } => write!(
                f,
                "{family} journal of branch '{branch}' is not registered. Register the journal in the branch's register() call."
            ),
            Self::DuplicateBranch { branch } => write!(
                f,
                "{branch} is connected more than once. Connect each branch manifest exactly once."
            ),
        }
    }
}

fn quote_all(names: &[String]) -> String {
    let quoted: Vec<String> = names.iter().map(|n| format!("'{}'", n)).collect();
    match quoted.len() {
        1 => format!("branch {}", quoted[0]),
        _ => format!("branches {}", quoted.join(", ")),
    }
}

/// Every violation found in one build, reported together.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, violation: Violation) {
        self.violations.push(violation);
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// Violations with the given code, in detection order.
    pub fn with_code<'a>(&'a self, code: &'a str) -> impl Iterator<Item = &'a Violation> + 'a {
        self.violations.iter().filter(move |v| v.code() == code)
    }

    pub fn into_result(self) -> crate::Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(crate::Error::Validation(self))
        }
    }
}

impl std::fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "covenant validation failed with {} violation(s):", self.violations.len())?;
        for v in &self.violations {
            write!(f, "\n  - {}", v)?;
        }
        Ok(())
    }
}
