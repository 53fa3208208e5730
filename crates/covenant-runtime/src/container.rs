//! Service container: where branches register what they own.
//!
//! Journals and transmuters are stored type-erased and recovered by
//! downcasting, so one container holds every family the covenant touches.

use crate::daemon::Daemon;
use covenant_core::{BranchManifest, DaemonId, JournalEntry, JournalFamily, Result};
use covenant_journal::{Journal, MemoryJournal};
use covenant_stream::{BatchTransmuter, Transmuter};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// A self-contained module that communicates only through its journal.
pub trait Branch {
    /// Register journals, daemons and transmuters, and describe the contract.
    fn register(&self, container: &mut Container) -> Result<BranchManifest>;
}

struct JournalSlot {
    family: &'static str,
    journal: Box<dyn Any + Send + Sync>,
}

#[derive(Default)]
pub struct Container {
    journals: HashMap<TypeId, JournalSlot>,
    transmuters: HashMap<String, Box<dyn Any + Send + Sync>>,
    daemons: HashMap<DaemonId, Arc<dyn Daemon>>,
    daemon_order: Vec<DaemonId>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the shared journal of family `E`. A later registration for
    /// the same family replaces the earlier one.
    pub fn register_journal<E: JournalEntry>(&mut self, journal: Arc<dyn Journal<E>>) {
        let previous = self.journals.insert(
            TypeId::of::<E>(),
            JournalSlot {
                family: E::FAMILY,
                journal: Box::new(journal),
            },
        );
        if previous.is_some() {
            warn!("journal '{}' registered twice; keeping the latest", E::FAMILY);
        } else {
            debug!("registered journal '{}'", E::FAMILY);
        }
    }

    /// Register an in-memory journal for `E` and return a typed handle to it.
    pub fn register_memory_journal<E: JournalEntry>(&mut self) -> Arc<MemoryJournal<E>> {
        let journal = Arc::new(MemoryJournal::<E>::new());
        self.register_journal::<E>(journal.clone());
        journal
    }

    pub fn journal<E: JournalEntry>(&self) -> Option<Arc<dyn Journal<E>>> {
        self.journals
            .get(&TypeId::of::<E>())
            .and_then(|slot| slot.journal.downcast_ref::<Arc<dyn Journal<E>>>())
            .cloned()
    }

    pub fn has_journal(&self, family: &JournalFamily) -> bool {
        self.journals.contains_key(&family.type_id())
    }

    /// Names of every registered journal family.
    pub fn journal_families(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.journals.values().map(|s| s.family).collect();
        names.sort_unstable();
        names
    }

    pub fn register_transmuter<S, T>(
        &mut self,
        name: impl Into<String>,
        transmuter: impl Transmuter<S, T> + 'static,
    ) where
        S: 'static,
        T: 'static,
    {
        let handle: Arc<dyn Transmuter<S, T>> = Arc::new(transmuter);
        self.insert_transmuter(name.into(), Box::new(handle));
    }

    pub fn register_batch_transmuter<C, T>(
        &mut self,
        name: impl Into<String>,
        transmuter: impl BatchTransmuter<C, T> + 'static,
    ) where
        C: 'static,
        T: 'static,
    {
        let handle: Arc<dyn BatchTransmuter<C, T>> = Arc::new(transmuter);
        self.insert_transmuter(name.into(), Box::new(handle));
    }

    fn insert_transmuter(&mut self, name: String, handle: Box<dyn Any + Send + Sync>) {
        if self.transmuters.insert(name.clone(), handle).is_some() {
            warn!("transmuter '{}' registered twice; keeping the latest", name);
        } else {
            debug!("registered transmuter '{}'", name);
        }
    }

    /// Resolve a transmuter by name. `None` if the name is unknown or was
    /// registered for other entry types.
    pub fn transmuter<S: 'static, T: 'static>(&self, name: &str) -> Option<Arc<dyn Transmuter<S, T>>> {
        self.transmuters
            .get(name)
            .and_then(|h| h.downcast_ref::<Arc<dyn Transmuter<S, T>>>())
            .cloned()
    }

    pub fn batch_transmuter<C: 'static, T: 'static>(
        &self,
        name: &str,
    ) -> Option<Arc<dyn BatchTransmuter<C, T>>> {
        self.transmuters
            .get(name)
            .and_then(|h| h.downcast_ref::<Arc<dyn BatchTransmuter<C, T>>>())
            .cloned()
    }

    pub fn has_transmuter(&self, name: &str) -> bool {
        self.transmuters.contains_key(name)
    }

    /// Register a daemon under its own id. Re-registering an id replaces the
    /// daemon but keeps its original registration slot.
    pub fn register_daemon(&mut self, daemon: Arc<dyn Daemon>) {
        let id = daemon.id().clone();
        if self.daemons.insert(id.clone(), daemon).is_some() {
            warn!("daemon '{}' registered twice; keeping the latest", id);
        } else {
            debug!("registered daemon '{}'", id);
            self.daemon_order.push(id);
        }
    }

    pub fn daemon(&self, id: &DaemonId) -> Option<Arc<dyn Daemon>> {
        self.daemons.get(id).cloned()
    }

    /// Daemon ids in registration order.
    pub fn daemon_ids(&self) -> &[DaemonId] {
        &self.daemon_order
    }
}
