//! Daemon lifecycle
//!
//! Every daemon moves Stopped → Running → Completed. Repeating the current
//! state is a no-op (so shutdown is idempotent); any other move is an
//! `InvalidTransition`.

use chrono::{DateTime, Utc};
use covenant_core::{DaemonId, DaemonStatus, Error, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[async_trait::async_trait]
pub trait Daemon: Send + Sync {
    fn id(&self) -> &DaemonId;

    fn status(&self) -> DaemonStatus;

    /// Bring the daemon up. Returns once it is Running; long-lived work must
    /// be spawned, not awaited here.
    async fn start(&self, ctx: &DaemonContext) -> Result<()>;

    /// Stop the daemon and move it to Completed. `cancel` fires when the
    /// graceful window is over; a token that never fires means "wait".
    async fn shutdown(&self, cancel: CancellationToken) -> Result<()>;
}

// ============================================================
// Lifecycle state machine
// ============================================================

/// Outcome of a legal transition request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Applied,
    NoOp,
}

/// Lock-free holder of a daemon's status.
pub struct Lifecycle {
    daemon: DaemonId,
    state: AtomicU8,
}

impl Lifecycle {
    pub fn new(daemon: impl Into<DaemonId>) -> Self {
        Self {
            daemon: daemon.into(),
            state: AtomicU8::new(encode(DaemonStatus::Stopped)),
        }
    }

    pub fn status(&self) -> DaemonStatus {
        decode(self.state.load(Ordering::Acquire))
    }

    /// The transition table, independent of any daemon.
    pub fn check(daemon: &DaemonId, from: DaemonStatus, to: DaemonStatus) -> Result<Transition> {
        use DaemonStatus::*;
        match (from, to) {
            (Stopped, Running) | (Running, Completed) => Ok(Transition::Applied),
            (a, b) if a == b => Ok(Transition::NoOp),
            _ => Err(Error::invalid_transition(daemon, from, to)),
        }
    }

    /// Check a move from the current status without applying it.
    pub fn plan(&self, to: DaemonStatus) -> Result<Transition> {
        Self::check(&self.daemon, self.status(), to)
    }

    /// Apply a move from the current status.
    pub fn advance(&self, to: DaemonStatus) -> Result<Transition> {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            let transition = Self::check(&self.daemon, decode(current), to)?;
            if transition == Transition::NoOp {
                return Ok(transition);
            }
            match self.state.compare_exchange(
                current,
                encode(to),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(transition),
                Err(actual) => current = actual,
            }
        }
    }
}

fn encode(status: DaemonStatus) -> u8 {
    match status {
        DaemonStatus::Stopped => 0,
        DaemonStatus::Running => 1,
        DaemonStatus::Completed => 2,
    }
}

fn decode(raw: u8) -> DaemonStatus {
    match raw {
        0 => DaemonStatus::Stopped,
        1 => DaemonStatus::Running,
        _ => DaemonStatus::Completed,
    }
}

// ============================================================
// Context and faults
// ============================================================

/// A runtime failure reported by a running daemon.
#[derive(Debug)]
pub struct DaemonFault {
    pub daemon: DaemonId,
    pub error: Error,
    pub at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct FaultSink(mpsc::UnboundedSender<DaemonFault>);

impl FaultSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<DaemonFault>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self(tx), rx)
    }

    pub fn report(&self, daemon: &DaemonId, error: Error) {
        let fault = DaemonFault {
            daemon: daemon.clone(),
            error,
            at: Utc::now(),
        };
        if self.0.send(fault).is_err() {
            debug!("fault from '{}' dropped: scope already gone", daemon);
        }
    }
}

/// Everything a daemon gets from its scope at start.
#[derive(Clone, Debug)]
pub struct DaemonContext {
    cancel: CancellationToken,
    faults: FaultSink,
}

impl DaemonContext {
    pub fn new(cancel: CancellationToken, faults: FaultSink) -> Self {
        Self { cancel, faults }
    }

    /// Scope-level cancellation. Fires before any daemon is shut down.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Token for the daemon's own work: cancelled with the scope, or alone.
    pub fn child_token(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    pub fn faults(&self) -> &FaultSink {
        &self.faults
    }

    pub fn report(&self, daemon: &DaemonId, error: Error) {
        self.faults.report(daemon, error);
    }
}

// ============================================================
// TaskDaemon — one background task
// ============================================================

type TaskFn = Box<dyn Fn(CancellationToken) -> BoxFuture<'static, Result<()>> + Send + Sync>;

struct RunningTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Daemon wrapping a single spawned future.
///
/// The future receives a token that fires on scope cancellation or shutdown.
/// Returning `Err` (other than `Cancelled`) reports a fault to the scope.
pub struct TaskDaemon {
    lifecycle: Lifecycle,
    id: DaemonId,
    run: TaskFn,
    task: Mutex<Option<RunningTask>>,
}

impl TaskDaemon {
    pub fn new<F, Fut>(id: impl Into<DaemonId>, run: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let id = id.into();
        Self {
            lifecycle: Lifecycle::new(id.clone()),
            id,
            run: Box::new(move |cancel| run(cancel).boxed()),
            task: Mutex::new(None),
        }
    }
}

#[async_trait::async_trait]
impl Daemon for TaskDaemon {
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
        let work = (self.run)(cancel.clone());
        let id = self.id.clone();
        let faults = ctx.faults().clone();
        let handle = tokio::spawn(async move {
            match work.await {
                Ok(()) => debug!("daemon '{}' task finished", id),
                Err(e) if e.is_cancelled() => debug!("daemon '{}' task cancelled", id),
                Err(e) => {
                    error!("daemon '{}' failed: {}", id, e);
                    faults.report(&id, e);
                }
            }
        });

        *self.task.lock().await = Some(RunningTask { cancel, handle });
        self.lifecycle.advance(DaemonStatus::Running)?;
        info!("daemon '{}' running", self.id);
        Ok(())
    }

    async fn shutdown(&self, cancel: CancellationToken) -> Result<()> {
        if self.lifecycle.plan(DaemonStatus::Completed)? == Transition::NoOp {
            return Ok(());
        }

        let mut outcome = Ok(());
        let task = self.task.lock().await.take();
        if let Some(RunningTask { cancel: task_cancel, mut handle }) = task {
            task_cancel.cancel();
            tokio::select! {
                joined = &mut handle => {
                    if let Err(e) = joined {
                        outcome = Err(Error::daemon_failed(&self.id, format!("task panicked: {}", e)));
                    }
                }
                _ = cancel.cancelled() => {
                    warn!("daemon '{}' did not stop in time; aborting", self.id);
                    handle.abort();
                }
            }
        }

        self.lifecycle.advance(DaemonStatus::Completed)?;
        info!("daemon '{}' completed", self.id);
        outcome
    }
}
