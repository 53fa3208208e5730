//! Covenant Runtime - container, covenant builder, pumps, and execution scope
//!
//! Branches register journals, daemons and transmuters into a [`Container`]
//! and hand back a manifest. The [`CovenantBuilder`] validates the graph of
//! manifests and routes, compiles one pump per route, and the
//! [`ExecutionScope`] starts and stops every daemon as a unit.

pub mod builder;
pub mod config;
pub mod container;
pub mod daemon;
pub mod pump;
pub mod route;
pub mod scope;
pub mod validation;

pub use builder::{Covenant, CovenantBuilder, CovenantDescriptor};
pub use config::{CovenantConfig, LoggingConfig, ScopeConfig, ShatterConfig, WindowConfig};
pub use container::{Branch, Container};
pub use daemon::{Daemon, DaemonContext, DaemonFault, FaultSink, Lifecycle, TaskDaemon, Transition};
pub use pump::{PumpDaemon, PumpDescriptor, PUMP_DAEMON_ID};
pub use route::{Invocation, RouteDescriptor, Routing};
pub use scope::ExecutionScope;
pub use validation::validate;
