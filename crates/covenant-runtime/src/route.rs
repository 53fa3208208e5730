//! Routes and terminals, the declared dispositions of produced leaves.

use crate::container::Container;
use crate::pump::{Binding, PumpDescriptor, PumpFactory, TransformPump, WindowedPump};
use covenant_core::{JournalEntry, JournalFamily, LeafType, Result};
use covenant_stream::{BatchTransmuter, Chunk, FnTransmuter, Transmuter, WindowPolicy};
use serde::Serialize;
use std::sync::Arc;

/// How a route turns a source entry into a target entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Invocation {
    /// Closure given in the routing block.
    Inline,
    /// Transmuter registered in the container under `name`.
    Transmuter { name: String },
    /// Batch transmuter over a window of chunks; `transmuter` is the
    /// registered name, or `None` when given inline.
    Windowed { transmuter: Option<String> },
}

impl Invocation {
    /// Name of the container transmuter this invocation depends on.
    pub fn transmuter_name(&self) -> Option<&str> {
        match self {
            Self::Inline | Self::Windowed { transmuter: None } => None,
            Self::Transmuter { name } => Some(name),
            Self::Windowed {
                transmuter: Some(name),
            } => Some(name),
        }
    }
}

impl std::fmt::Display for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inline => write!(f, "inline"),
            Self::Transmuter { name } => write!(f, "via '{}'", name),
            Self::Windowed { transmuter: None } => write!(f, "windowed"),
            Self::Windowed {
                transmuter: Some(name),
            } => write!(f, "windowed via '{}'", name),
        }
    }
}

/// A declared route. Carries the typed pump factory captured when the route
/// was declared, so compilation never has to guess entry types.
#[derive(Clone)]
pub struct RouteDescriptor {
    source: LeafType,
    target: LeafType,
    source_family: JournalFamily,
    target_family: JournalFamily,
    invocation: Invocation,
    factory: Arc<dyn PumpFactory>,
}

impl RouteDescriptor {
    pub fn source(&self) -> LeafType {
        self.source
    }

    pub fn target(&self) -> LeafType {
        self.target
    }

    pub fn source_family(&self) -> JournalFamily {
        self.source_family
    }

    pub fn target_family(&self) -> JournalFamily {
        self.target_family
    }

    pub fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    /// Whether the container can supply this route's transmuter with the
    /// entry types the route was declared with. Inline routes always can.
    pub fn transmuter_resolves(&self, container: &Container) -> bool {
        self.factory.transmuter_resolves(container)
    }

    /// Bind the route to concrete journals and transmuter.
    pub fn compile(&self, container: &Container) -> Result<PumpDescriptor> {
        let run = self.factory.compile(self.source, self.target, container)?;
        Ok(PumpDescriptor::new(
            self.source,
            self.target,
            self.source_family.name(),
            self.target_family.name(),
            self.invocation.clone(),
            run,
        ))
    }
}

impl std::fmt::Debug for RouteDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteDescriptor")
            .field("source", &self.source)
            .field("target", &self.target)
            .field("source_family", &self.source_family.name())
            .field("target_family", &self.target_family.name())
            .field("invocation", &self.invocation)
            .finish()
    }
}

/// The routing block of a covenant.
///
/// ```ignore
/// builder.routing(|r| {
///     r.route::<PingEntry, PingEntry>(PING, PONG, |e| Ok(PingEntry::Pong(e.n())));
///     r.terminal(PONG);
/// })
/// ```
#[derive(Default)]
pub struct Routing {
    routes: Vec<RouteDescriptor>,
    terminals: Vec<LeafType>,
}

impl Routing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route `source` entries of family `S` to `target` entries of family
    /// `T` through an inline transform.
    pub fn route<S, T>(
        &mut self,
        source: LeafType,
        target: LeafType,
        transform: impl Fn(&S) -> Result<T> + Send + Sync + 'static,
    ) -> &mut Self
    where
        S: JournalEntry,
        T: JournalEntry,
    {
        let transmuter: Arc<dyn Transmuter<S, T>> =
            Arc::new(FnTransmuter::new(format!("{} -> {}", source, target), transform));
        self.push::<S, T>(
            source,
            target,
            Invocation::Inline,
            Arc::new(TransformPump::<S, T>::new(Binding::Inline(transmuter))),
        )
    }

    /// Route through a transmuter registered in the container.
    pub fn route_via<S, T>(
        &mut self,
        source: LeafType,
        target: LeafType,
        transmuter: impl Into<String>,
    ) -> &mut Self
    where
        S: JournalEntry,
        T: JournalEntry,
    {
        let name = transmuter.into();
        self.push::<S, T>(
            source,
            target,
            Invocation::Transmuter { name: name.clone() },
            Arc::new(TransformPump::<S, T>::new(Binding::Named(name))),
        )
    }

    /// Buffer `source` chunks and emit one `target` entry per window flush.
    pub fn route_windowed<S, T>(
        &mut self,
        source: LeafType,
        target: LeafType,
        transmuter: impl BatchTransmuter<S, T> + 'static,
        policy: impl WindowPolicy<S> + 'static,
    ) -> &mut Self
    where
        S: JournalEntry + Chunk,
        T: JournalEntry,
    {
        let transmuter: Arc<dyn BatchTransmuter<S, T>> = Arc::new(transmuter);
        self.push::<S, T>(
            source,
            target,
            Invocation::Windowed { transmuter: None },
            Arc::new(WindowedPump::<S, T>::new(Binding::Inline(transmuter), Arc::new(policy))),
        )
    }

    /// Windowed route through a batch transmuter registered in the container.
    pub fn route_windowed_via<S, T>(
        &mut self,
        source: LeafType,
        target: LeafType,
        transmuter: impl Into<String>,
        policy: impl WindowPolicy<S> + 'static,
    ) -> &mut Self
    where
        S: JournalEntry + Chunk,
        T: JournalEntry,
    {
        let name = transmuter.into();
        self.push::<S, T>(
            source,
            target,
            Invocation::Windowed {
                transmuter: Some(name.clone()),
            },
            Arc::new(WindowedPump::<S, T>::new(Binding::Named(name), Arc::new(policy))),
        )
    }

    /// Declare that `leaf` is consumed outside the covenant and never routed.
    pub fn terminal(&mut self, leaf: LeafType) -> &mut Self {
        self.terminals.push(leaf);
        self
    }

    pub fn routes(&self) -> &[RouteDescriptor] {
        &self.routes
    }

    pub fn terminals(&self) -> &[LeafType] {
        &self.terminals
    }

    fn push<S: JournalEntry, T: JournalEntry>(
        &mut self,
        source: LeafType,
        target: LeafType,
        invocation: Invocation,
        factory: Arc<dyn PumpFactory>,
    ) -> &mut Self {
        self.routes.push(RouteDescriptor {
            source,
            target,
            source_family: JournalFamily::of::<S>(),
            target_family: JournalFamily::of::<T>(),
            invocation,
            factory,
        });
        self
    }
}
