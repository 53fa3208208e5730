//! Execution scope — atomic startup and ordered shutdown of daemons.
//!
//! Entry starts daemons one by one. If any start fails, every daemon already
//! started is shut down in reverse order with a token that never fires, and
//! the scope is never handed out. Exit cancels the scope first, then shuts
//! daemons down in reverse start order.

use crate::builder::Covenant;
use crate::config::ScopeConfig;
use crate::container::Container;
use crate::daemon::{Daemon, DaemonContext, DaemonFault, FaultSink};
use covenant_core::{DaemonId, DaemonStatus, Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

pub struct ExecutionScope {
    id: Uuid,
    cancel: CancellationToken,
    daemons: Vec<Arc<dyn Daemon>>,
    faults: mpsc::UnboundedReceiver<DaemonFault>,
    config: ScopeConfig,
    exited: bool,
}

impl ExecutionScope {
    /// Resolve the covenant's daemons from `container` and start them:
    /// required daemons in branch-connection order, pump daemon last.
    pub async fn enter(
        container: &Container,
        covenant: &Covenant,
        parent: &CancellationToken,
        config: ScopeConfig,
    ) -> Result<Self> {
        let mut daemons: Vec<Arc<dyn Daemon>> = Vec::new();
        let mut seen: Vec<DaemonId> = Vec::new();
        for manifest in covenant.manifests() {
            for id in manifest.required_daemons() {
                if seen.contains(id) {
                    continue;
                }
                let daemon = container.daemon(id).ok_or_else(|| Error::DaemonNotRegistered {
                    daemon: id.clone(),
                    branch: manifest.name().to_string(),
                })?;
                seen.push(id.clone());
                daemons.push(daemon);
            }
        }
        daemons.push(covenant.pump_daemon().clone());
        Self::start(daemons, parent, config).await
    }

    /// Start `daemons` in order as one unit.
    pub async fn start(
        daemons: Vec<Arc<dyn Daemon>>,
        parent: &CancellationToken,
        config: ScopeConfig,
    ) -> Result<Self> {
        let id = Uuid::new_v4();
        let cancel = parent.child_token();
        let (sink, faults) = FaultSink::channel();
        let ctx = DaemonContext::new(cancel.clone(), sink);
        info!("scope {}: starting {} daemon(s)", id, daemons.len());

        let mut started: Vec<Arc<dyn Daemon>> = Vec::with_capacity(daemons.len());
        for daemon in daemons {
            if let Err(reason) = start_one(daemon.as_ref(), &ctx, config.start_timeout()).await {
                error!("scope {}: daemon '{}' failed to start: {}", id, daemon.id(), reason);
                let rolled_back = rollback(id, &started).await;
                // Anything the failed daemon spawned before failing hangs off
                // the scope token.
                cancel.cancel();
                return Err(Error::StartupFailed {
                    daemon: daemon.id().clone(),
                    reason: Box::new(reason),
                    rolled_back,
                });
            }
            started.push(daemon);
        }

        info!("scope {}: all daemons running", id);
        Ok(Self {
            id,
            cancel,
            daemons: started,
            faults,
            config,
            exited: false,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Scope-wide cancellation, a child of the parent passed at entry.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Daemon statuses in start order.
    pub fn statuses(&self) -> Vec<(DaemonId, DaemonStatus)> {
        self.daemons
            .iter()
            .map(|d| (d.id().clone(), d.status()))
            .collect()
    }

    /// Wait for the next runtime fault. `None` once no daemon can report.
    pub async fn next_fault(&mut self) -> Option<DaemonFault> {
        self.faults.recv().await
    }

    pub fn try_fault(&mut self) -> Option<DaemonFault> {
        self.faults.try_recv().ok()
    }

    /// Cancel the scope, then shut every daemon down in reverse start order.
    /// Shutdown failures do not stop the sweep; they are returned together.
    pub async fn exit(mut self) -> Result<()> {
        self.exited = true;
        info!("scope {}: exiting", self.id);
        self.cancel.cancel();

        let grace = self.config.shutdown_timeout();
        let mut failures = Vec::new();
        for daemon in self.daemons.iter().rev() {
            if let Err(e) = shutdown_one(daemon.as_ref(), grace).await {
                warn!("scope {}: daemon '{}' shutdown failed: {}", self.id, daemon.id(), e);
                failures.push((daemon.id().clone(), e.to_string()));
            }
        }
        self.daemons.clear();

        if failures.is_empty() {
            info!("scope {}: exited cleanly", self.id);
            Ok(())
        } else {
            Err(Error::ShutdownFailed { failures })
        }
    }
}

impl Drop for ExecutionScope {
    fn drop(&mut self) {
        if !self.exited {
            warn!("scope {} dropped without exit; cancelling", self.id);
            self.cancel.cancel();
        }
    }
}

async fn start_one(daemon: &dyn Daemon, ctx: &DaemonContext, limit: Option<Duration>) -> Result<()> {
    match limit {
        None => daemon.start(ctx).await,
        Some(limit) => tokio::time::timeout(limit, daemon.start(ctx))
            .await
            .map_err(|_| Error::StartTimeout {
                daemon: daemon.id().clone(),
                after_ms: limit.as_millis() as u64,
            })?,
    }
}

/// Shut down with a stop token that fires once `grace` has passed.
async fn shutdown_one(daemon: &dyn Daemon, grace: Option<Duration>) -> Result<()> {
    let stop = CancellationToken::new();
    let mut shutdown = daemon.shutdown(stop.clone());
    let Some(grace) = grace else {
        return shutdown.await;
    };
    match tokio::time::timeout(grace, &mut shutdown).await {
        Ok(result) => result,
        Err(_) => {
            warn!("daemon '{}' still stopping after {:?}; forcing", daemon.id(), grace);
            stop.cancel();
            shutdown.await
        }
    }
}

/// Shut down already-started daemons, newest first, waiting as long as each
/// one needs. Returns the ids in the order they were rolled back.
async fn rollback(scope: Uuid, started: &[Arc<dyn Daemon>]) -> Vec<DaemonId> {
    let mut rolled_back = Vec::with_capacity(started.len());
    for daemon in started.iter().rev() {
        if let Err(e) = daemon.shutdown(CancellationToken::new()).await {
            warn!("scope {}: rollback of '{}' failed: {}", scope, daemon.id(), e);
        }
        rolled_back.push(daemon.id().clone());
    }
    rolled_back
}
