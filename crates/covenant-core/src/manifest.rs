//! Branch manifest - what a branch emits, expects, and needs alive.

use crate::error::{Error, Result};
use crate::types::{DaemonId, JournalEntry, JournalFamily, LeafType};
use serde::Serialize;
use std::collections::BTreeSet;

/// Immutable contract returned by a branch at registration.
#[derive(Clone, Debug, Serialize)]
pub struct BranchManifest {
    name: String,
    journal: JournalFamily,
    produces: BTreeSet<LeafType>,
    consumes: BTreeSet<LeafType>,
    required_daemons: Vec<DaemonId>,
}

impl BranchManifest {
    pub fn builder<E: JournalEntry>(name: impl Into<String>) -> ManifestBuilder {
        ManifestBuilder {
            name: name.into(),
            journal: JournalFamily::of::<E>(),
            produces: BTreeSet::new(),
            consumes: BTreeSet::new(),
            required_daemons: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn journal(&self) -> JournalFamily {
        self.journal
    }

    pub fn produces(&self) -> &BTreeSet<LeafType> {
        &self.produces
    }

    pub fn consumes(&self) -> &BTreeSet<LeafType> {
        &self.consumes
    }

    pub fn required_daemons(&self) -> &[DaemonId] {
        &self.required_daemons
    }

    /// Every leaf this manifest mentions, produced or consumed.
    pub fn leaves(&self) -> impl Iterator<Item = LeafType> + '_ {
        self.produces.iter().chain(self.consumes.iter()).copied()
    }
}

pub struct ManifestBuilder {
    name: String,
    journal: JournalFamily,
    produces: BTreeSet<LeafType>,
    consumes: BTreeSet<LeafType>,
    required_daemons: Vec<DaemonId>,
}

impl ManifestBuilder {
    pub fn produces(mut self, leaves: impl IntoIterator<Item = LeafType>) -> Self {
        self.produces.extend(leaves);
        self
    }

    pub fn consumes(mut self, leaves: impl IntoIterator<Item = LeafType>) -> Self {
        self.consumes.extend(leaves);
        self
    }

    /// Daemons are started in the order they are required.
    pub fn requires(mut self, daemon: impl Into<DaemonId>) -> Self {
        let daemon = daemon.into();
        if !self.required_daemons.contains(&daemon) {
            self.required_daemons.push(daemon);
        }
        self
    }

    /// Seal the manifest. Fails if a declared leaf is not a variant of the
    /// branch's journal family.
    pub fn build(self) -> Result<BranchManifest> {
        if let Some(leaf) = self
            .produces
            .iter()
            .chain(self.consumes.iter())
            .find(|leaf| !self.journal.declares(**leaf))
        {
            return Err(Error::UndeclaredLeaf {
                branch: self.name,
                family: self.journal.name(),
                leaf: *leaf,
            });
        }
        Ok(BranchManifest {
            name: self.name,
            journal: self.journal,
            produces: self.produces,
            consumes: self.consumes,
            required_daemons: self.required_daemons,
        })
    }
}
