//! Covenant builder — validate, compile pumps, register the pump daemon.

use crate::container::{Branch, Container};
use crate::pump::{PumpDaemon, PumpDescriptor};
use crate::route::Routing;
use crate::validation::validate;
use covenant_core::{BranchManifest, DaemonId, Error, LeafType, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// The validated, compiled graph.
#[derive(Clone, Debug, Serialize)]
pub struct CovenantDescriptor {
    pub manifests: Vec<BranchManifest>,
    pub pumps: Vec<PumpDescriptor>,
    pub terminals: Vec<LeafType>,
}

#[derive(Default)]
pub struct CovenantBuilder {
    manifests: Vec<BranchManifest>,
    routing: Routing,
}

impl CovenantBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect a branch by its manifest. Connection order is daemon start
    /// order.
    pub fn connect(mut self, manifest: BranchManifest) -> Self {
        self.manifests.push(manifest);
        self
    }

    /// Register a branch into `container` and connect the manifest it returns.
    pub fn connect_branch(self, branch: &dyn Branch, container: &mut Container) -> Result<Self> {
        let manifest = branch.register(container)?;
        Ok(self.connect(manifest))
    }

    /// Declare routes and terminals. May be called more than once.
    pub fn routing(mut self, declare: impl FnOnce(&mut Routing)) -> Self {
        declare(&mut self.routing);
        self
    }

    /// Validate the graph and, only if it is clean, compile one pump per
    /// route and register the pump daemon in `container`.
    pub fn build(self, container: &mut Container) -> Result<Covenant> {
        let report = validate(
            &self.manifests,
            self.routing.routes(),
            self.routing.terminals(),
            container,
        );
        if !report.is_empty() {
            warn!("{}", report);
            return Err(Error::Validation(report));
        }

        let pumps = self
            .routing
            .routes()
            .iter()
            .map(|route| route.compile(container))
            .collect::<Result<Vec<_>>>()?;

        let pump_daemon = Arc::new(PumpDaemon::new(pumps.clone()));
        container.register_daemon(pump_daemon.clone());

        info!(
            "covenant built: {} branch(es), {} pump(s), {} terminal(s)",
            self.manifests.len(),
            pumps.len(),
            self.routing.terminals().len()
        );

        Ok(Covenant {
            descriptor: CovenantDescriptor {
                manifests: self.manifests,
                pumps,
                terminals: self.routing.terminals().to_vec(),
            },
            pump_daemon,
        })
    }
}

pub struct Covenant {
    descriptor: CovenantDescriptor,
    pump_daemon: Arc<PumpDaemon>,
}

impl Covenant {
    pub fn descriptor(&self) -> &CovenantDescriptor {
        &self.descriptor
    }

    pub fn manifests(&self) -> &[BranchManifest] {
        &self.descriptor.manifests
    }

    pub fn pumps(&self) -> &[PumpDescriptor] {
        &self.descriptor.pumps
    }

    pub fn pump_daemon(&self) -> &Arc<PumpDaemon> {
        &self.pump_daemon
    }

    /// Required daemons in connection order without repeats, pump daemon last.
    pub fn daemon_order(&self) -> Vec<DaemonId> {
        let mut order: Vec<DaemonId> = Vec::new();
        for manifest in &self.descriptor.manifests {
            for id in manifest.required_daemons() {
                if !order.contains(id) {
                    order.push(id.clone());
                }
            }
        }
        order.push(crate::daemon::Daemon::id(self.pump_daemon.as_ref()).clone());
        order
    }

    /// Pretty JSON of the compiled graph.
    pub fn describe(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.descriptor)
    }
}
