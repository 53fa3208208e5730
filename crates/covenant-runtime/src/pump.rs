//! Pumps — compiled routes and the daemon that runs them
//!
//! Each route compiles to a pump monomorphized for its (source, target)
//! entry families. A pump tails its source journal from the origin with its
//! own cursor, skips sibling leaf types, transforms, and appends to the
//! target journal. An entry taken off the tail is always routed completely
//! before the pump looks at cancellation again.

use crate::container::Container;
use crate::daemon::{Daemon, DaemonContext, Lifecycle, Transition};
use crate::route::Invocation;
use covenant_core::{DaemonId, DaemonStatus, Error, JournalEntry, LeafType, Position, Result};
use covenant_journal::Journal;
use covenant_stream::{BatchTransmuter, Chunk, Transmuter, WindowBuffer, WindowPolicy};
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use serde::ser::SerializeStruct;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OnceCell};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Id under which the covenant registers its pump daemon.
pub const PUMP_DAEMON_ID: &str = "covenant-pumps";

/// A compiled pump body: runs until cancelled or failed, counting every
/// entry it writes.
pub(crate) type PumpRun =
    Arc<dyn Fn(CancellationToken, Arc<AtomicU64>) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// A route bound to the concrete journals of its families.
#[derive(Clone)]
pub struct PumpDescriptor {
    source: LeafType,
    target: LeafType,
    source_family: &'static str,
    target_family: &'static str,
    invocation: Invocation,
    run: PumpRun,
}

impl PumpDescriptor {
    pub(crate) fn new(
        source: LeafType,
        target: LeafType,
        source_family: &'static str,
        target_family: &'static str,
        invocation: Invocation,
        run: PumpRun,
    ) -> Self {
        Self {
            source,
            target,
            source_family,
            target_family,
            invocation,
            run,
        }
    }

    pub fn source(&self) -> LeafType {
        self.source
    }

    pub fn target(&self) -> LeafType {
        self.target
    }

    pub fn source_family(&self) -> &'static str {
        self.source_family
    }

    pub fn target_family(&self) -> &'static str {
        self.target_family
    }

    pub fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    /// `source:Leaf -> target:Leaf`, used in logs.
    pub fn label(&self) -> String {
        format!(
            "{}:{} -> {}:{}",
            self.source_family, self.source, self.target_family, self.target
        )
    }

    /// Run the pump until `cancel` fires or a route fails.
    pub async fn run(&self, cancel: CancellationToken, routed: Arc<AtomicU64>) -> Result<()> {
        (self.run)(cancel, routed).await
    }
}

impl std::fmt::Debug for PumpDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PumpDescriptor")
            .field("route", &self.label())
            .field("invocation", &self.invocation)
            .finish()
    }
}

impl Serialize for PumpDescriptor {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("PumpDescriptor", 5)?;
        s.serialize_field("source", &self.source)?;
        s.serialize_field("target", &self.target)?;
        s.serialize_field("source_family", self.source_family)?;
        s.serialize_field("target_family", self.target_family)?;
        s.serialize_field("invocation", &self.invocation)?;
        s.end()
    }
}

// ============================================================
// Factories: typed compilation of declared routes
// ============================================================

/// Where a route's transmuter comes from.
pub(crate) enum Binding<X: ?Sized> {
    Inline(Arc<X>),
    Named(String),
}

pub(crate) trait PumpFactory: Send + Sync {
    fn transmuter_resolves(&self, container: &Container) -> bool;

    fn compile(&self, source: LeafType, target: LeafType, container: &Container) -> Result<PumpRun>;
}

fn resolve_journal<E: JournalEntry>(container: &Container) -> Result<Arc<dyn Journal<E>>> {
    container
        .journal::<E>()
        .ok_or_else(|| Error::Internal(format!("no journal registered for family '{}'", E::FAMILY)))
}

fn missing_transmuter(name: &str) -> Error {
    Error::Internal(format!("transmuter '{}' is not registered with the route's entry types", name))
}

pub(crate) struct TransformPump<S, T> {
    binding: Binding<dyn Transmuter<S, T>>,
}

impl<S, T> TransformPump<S, T> {
    pub(crate) fn new(binding: Binding<dyn Transmuter<S, T>>) -> Self {
        Self { binding }
    }
}

impl<S: JournalEntry, T: JournalEntry> PumpFactory for TransformPump<S, T> {
    fn transmuter_resolves(&self, container: &Container) -> bool {
        match &self.binding {
            Binding::Inline(_) => true,
            Binding::Named(name) => container.transmuter::<S, T>(name).is_some(),
        }
    }

    fn compile(&self, source: LeafType, target: LeafType, container: &Container) -> Result<PumpRun> {
        let transmuter = match &self.binding {
            Binding::Inline(t) => t.clone(),
            Binding::Named(name) => container
                .transmuter::<S, T>(name)
                .ok_or_else(|| missing_transmuter(name))?,
        };
        let from = resolve_journal::<S>(container)?;
        let to = resolve_journal::<T>(container)?;
        let route = RouteLeaves { source, target };
        Ok(Arc::new(move |cancel: CancellationToken, routed: Arc<AtomicU64>| {
            transform_loop(from.clone(), to.clone(), transmuter.clone(), route, cancel, routed).boxed()
        }))
    }
}

pub(crate) struct WindowedPump<S, T> {
    binding: Binding<dyn BatchTransmuter<S, T>>,
    policy: Arc<dyn WindowPolicy<S>>,
    _entries: PhantomData<fn() -> T>,
}

impl<S, T> WindowedPump<S, T> {
    pub(crate) fn new(binding: Binding<dyn BatchTransmuter<S, T>>, policy: Arc<dyn WindowPolicy<S>>) -> Self {
        Self {
            binding,
            policy,
            _entries: PhantomData,
        }
    }
}

impl<S: JournalEntry + Chunk, T: JournalEntry> PumpFactory for WindowedPump<S, T> {
    fn transmuter_resolves(&self, container: &Container) -> bool {
        match &self.binding {
            Binding::Inline(_) => true,
            Binding::Named(name) => container.batch_transmuter::<S, T>(name).is_some(),
        }
    }

    fn compile(&self, source: LeafType, target: LeafType, container: &Container) -> Result<PumpRun> {
        let transmuter = match &self.binding {
            Binding::Inline(t) => t.clone(),
            Binding::Named(name) => container
                .batch_transmuter::<S, T>(name)
                .ok_or_else(|| missing_transmuter(name))?,
        };
        let from = resolve_journal::<S>(container)?;
        let to = resolve_journal::<T>(container)?;
        let policy = self.policy.clone();
        let route = RouteLeaves { source, target };
        Ok(Arc::new(move |cancel: CancellationToken, routed: Arc<AtomicU64>| {
            windowed_loop(
                from.clone(),
                to.clone(),
                transmuter.clone(),
                policy.clone(),
                route,
                cancel,
                routed,
            )
            .boxed()
        }))
    }
}

// ============================================================
// Pump loops
// ============================================================

#[derive(Clone, Copy)]
struct RouteLeaves {
    source: LeafType,
    target: LeafType,
}

impl RouteLeaves {
    fn failed(&self, position: Position, reason: impl std::fmt::Display) -> Error {
        Error::TransformFailed {
            source_leaf: self.source,
            target_leaf: self.target,
            position,
            reason: reason.to_string(),
        }
    }

    /// Write `output` to the target, rejecting outputs of the wrong leaf.
    async fn deliver<T: JournalEntry>(
        &self,
        journal: &dyn Journal<T>,
        output: T,
        position: Position,
    ) -> Result<Position> {
        let produced = output.leaf_type();
        if produced != self.target {
            return Err(self.failed(position, format!("transform produced {}", produced)));
        }
        journal.write(output).await
    }
}

enum Step<I> {
    Cancelled,
    Entry(Option<I>),
    Idle,
}

async fn transform_loop<S: JournalEntry, T: JournalEntry>(
    source: Arc<dyn Journal<S>>,
    target: Arc<dyn Journal<T>>,
    transmuter: Arc<dyn Transmuter<S, T>>,
    route: RouteLeaves,
    cancel: CancellationToken,
    routed: Arc<AtomicU64>,
) -> Result<()> {
    let mut tail = source.tail(Position::ORIGIN, cancel.clone());
    loop {
        let step = tokio::select! {
            biased;
            _ = cancel.cancelled() => Step::Cancelled,
            next = tail.next() => Step::Entry(next),
        };
        let (position, entry) = match step {
            Step::Entry(Some(Ok(item))) => item,
            Step::Entry(Some(Err(e))) if !e.is_cancelled() => return Err(e),
            _ => return Ok(()),
        };
        if entry.leaf_type() != route.source {
            continue;
        }

        let output = transmuter
            .transmute(&entry)
            .map_err(|e| route.failed(position, e))?;
        let written = route.deliver(target.as_ref(), output, position).await?;
        routed.fetch_add(1, Ordering::Relaxed);
        debug!(
            "routed {} {} -> {} {}",
            route.source, position, route.target, written
        );
    }
}

async fn windowed_loop<S: JournalEntry + Chunk, T: JournalEntry>(
    source: Arc<dyn Journal<S>>,
    target: Arc<dyn Journal<T>>,
    transmuter: Arc<dyn BatchTransmuter<S, T>>,
    policy: Arc<dyn WindowPolicy<S>>,
    route: RouteLeaves,
    cancel: CancellationToken,
    routed: Arc<AtomicU64>,
) -> Result<()> {
    let mut tail = source.tail(Position::ORIGIN, cancel.clone());
    let mut buffer = WindowBuffer::new();
    let mut last = Position::ORIGIN;
    loop {
        let idle_in = match policy.idle_timeout() {
            Some(after) if !buffer.is_empty() => Some(after.saturating_sub(buffer.idle(Instant::now()))),
            _ => None,
        };
        let step = tokio::select! {
            biased;
            _ = cancel.cancelled() => Step::Cancelled,
            next = tail.next() => Step::Entry(next),
            _ = idle(idle_in) => Step::Idle,
        };
        match step {
            Step::Entry(Some(Ok((position, entry)))) => {
                if entry.leaf_type() != route.source {
                    continue;
                }
                last = position;
                buffer.push(entry, Instant::now());
            }
            Step::Entry(Some(Err(e))) if !e.is_cancelled() => return Err(e),
            Step::Idle => {}
            _ => {
                if !buffer.is_empty() {
                    debug!("{}: dropping {} unflushed chunk(s)", route.source, buffer.len());
                }
                return Ok(());
            }
        }

        let outputs = buffer
            .drain_ready(policy.as_ref(), transmuter.as_ref(), Instant::now())
            .map_err(|e| route.failed(last, e))?;
        for output in outputs {
            let written = route.deliver(target.as_ref(), output, last).await?;
            routed.fetch_add(1, Ordering::Relaxed);
            debug!("flushed window up to {} {} -> {} {}", route.source, last, route.target, written);
        }
    }
}

async fn idle(after: Option<Duration>) {
    match after {
        Some(after) => tokio::time::sleep(after).await,
        None => std::future::pending().await,
    }
}

// ============================================================
// PumpDaemon
// ============================================================

struct RunningPumps {
    cancel: CancellationToken,
    handles: Vec<(String, JoinHandle<()>)>,
}

/// Runs every compiled pump of a covenant.
///
/// The first pump failure stops all sibling pumps, is kept as
/// [`PumpDaemon::failure`] and is reported to the scope as a fault. Failed
/// routes are never retried.
pub struct PumpDaemon {
    id: DaemonId,
    lifecycle: Lifecycle,
    pumps: Vec<PumpDescriptor>,
    routed: DashMap<LeafType, Arc<AtomicU64>>,
    failure: Arc<OnceCell<String>>,
    running: Mutex<Option<RunningPumps>>,
}

impl PumpDaemon {
    pub fn new(pumps: Vec<PumpDescriptor>) -> Self {
        let id = DaemonId::new(PUMP_DAEMON_ID);
        let routed = DashMap::new();
        for pump in &pumps {
            routed.insert(pump.source(), Arc::new(AtomicU64::new(0)));
        }
        Self {
            lifecycle: Lifecycle::new(id.clone()),
            id,
            pumps,
            routed,
            failure: Arc::new(OnceCell::new()),
            running: Mutex::new(None),
        }
    }

    pub fn pumps(&self) -> &[PumpDescriptor] {
        &self.pumps
    }

    /// Entries written by the route whose source is `source`.
    pub fn routed(&self, source: LeafType) -> u64 {
        self.routed
            .get(&source)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn total_routed(&self) -> u64 {
        self.routed.iter().map(|c| c.value().load(Ordering::Relaxed)).sum()
    }

    /// The failure that stopped the pumps, if any.
    pub fn failure(&self) -> Option<String> {
        self.failure.get().cloned()
    }
}

#[async_trait::async_trait]
impl Daemon for PumpDaemon {
    fn id(&self) -> &DaemonId {
        &self.id
    }

    fn status(&self) -> DaemonStatus {
        self.lifecycle.status()
    }

    async fn start(&self, ctx: &DaemonContext) -> Result<()> {
        if self.lifecycle.plan(DaemonStatus::Running)? == Transition::NoOp {
            return Ok(());
        }

        let cancel = ctx.child_token();
        let mut handles = Vec::with_capacity(self.pumps.len());
        for pump in &self.pumps {
            let pump = pump.clone();
            let label = pump.label();
            let counter = self
                .routed
                .entry(pump.source())
                .or_insert_with(|| Arc::new(AtomicU64::new(0)))
                .clone();
            let cancel = cancel.clone();
            let faults = ctx.faults().clone();
            let failure = self.failure.clone();
            let id = self.id.clone();
            let task_label = label.clone();
            let handle = tokio::spawn(async move {
                match pump.run(cancel.clone(), counter).await {
                    Ok(()) => debug!("pump {} stopped", task_label),
                    Err(e) if e.is_cancelled() => debug!("pump {} cancelled", task_label),
                    Err(e) => {
                        error!("pump {} failed: {}", task_label, e);
                        if failure.set(e.to_string()).is_ok() {
                            // Siblings share the token.
                            cancel.cancel();
                            faults.report(&id, e);
                        }
                    }
                }
            });
            handles.push((label, handle));
        }

        *self.running.lock().await = Some(RunningPumps { cancel, handles });
        self.lifecycle.advance(DaemonStatus::Running)?;
        info!("pump daemon running {} pump(s)", self.pumps.len());
        Ok(())
    }

    async fn shutdown(&self, cancel: CancellationToken) -> Result<()> {
        if self.lifecycle.plan(DaemonStatus::Completed)? == Transition::NoOp {
            return Ok(());
        }

        let mut panicked = Vec::new();
        let running = self.running.lock().await.take();
        if let Some(RunningPumps { cancel: pumps, handles }) = running {
            pumps.cancel();
            for (label, mut handle) in handles {
                tokio::select! {
                    joined = &mut handle => {
                        if let Err(e) = joined {
                            if e.is_panic() {
                                panicked.push(label);
                            }
                        }
                    }
                    _ = cancel.cancelled() => {
                        warn!("pump {} did not stop in time; aborting", label);
                        handle.abort();
                    }
                }
            }
        }

        self.lifecycle.advance(DaemonStatus::Completed)?;
        info!(
            "pump daemon completed: {} entr(ies) routed",
            self.total_routed()
        );
        // A route failure already stopped every pump; it still fails the daemon.
        if let Some(failure) = self.failure.get() {
            return Err(Error::daemon_failed(&self.id, failure.clone()));
        }
        if panicked.is_empty() {
            Ok(())
        } else {
            Err(Error::daemon_failed(
                &self.id,
                format!("pump(s) panicked: {}", panicked.join(", ")),
            ))
        }
    }
}
