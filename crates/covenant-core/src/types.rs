//! Core types for Covenant

use serde::Serialize;
use std::any::TypeId;
use std::fmt::Debug;
use std::sync::Arc;

/// Name of one concrete entry variant within a journal family.
///
/// Leaf types are compared by name, so two families declaring the same leaf
/// name collide (the covenant reports this as `MultipleJournals`).
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct LeafType(&'static str);

impl LeafType {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl std::fmt::Display for LeafType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

/// Position of an entry in a journal. The origin is never assigned; the first
/// write receives position 1.
#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct Position(pub u64);

impl Position {
    pub const ORIGIN: Position = Position(0);

    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn next(&self) -> Position {
        Position(self.0 + 1)
    }

    pub fn prev(&self) -> Option<Position> {
        self.0.checked_sub(1).map(Position)
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A journal family: a closed sum type whose variants are the leaf types.
///
/// ```ignore
/// #[derive(Clone, Debug)]
/// enum PingEntry { Ping(u32), Pong(u32) }
///
/// impl JournalEntry for PingEntry {
///     const FAMILY: &'static str = "ping";
///     const LEAVES: &'static [LeafType] = &[PING, PONG];
///     fn leaf_type(&self) -> LeafType {
///         match self { Self::Ping(_) => PING, Self::Pong(_) => PONG }
///     }
/// }
/// ```
pub trait JournalEntry: Clone + Debug + Send + Sync + 'static {
    /// Family name, used in diagnostics.
    const FAMILY: &'static str;

    /// Every leaf type this family can hold.
    const LEAVES: &'static [LeafType];

    /// Leaf tag of this value.
    fn leaf_type(&self) -> LeafType;
}

/// Runtime descriptor of a journal family, captured from a `JournalEntry` type.
#[derive(Clone, Copy, Debug)]
pub struct JournalFamily {
    name: &'static str,
    type_id: TypeId,
    leaves: &'static [LeafType],
}

impl JournalFamily {
    pub fn of<E: JournalEntry>() -> Self {
        Self {
            name: E::FAMILY,
            type_id: TypeId::of::<E>(),
            leaves: E::LEAVES,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn leaves(&self) -> &'static [LeafType] {
        self.leaves
    }

    pub fn declares(&self, leaf: LeafType) -> bool {
        self.leaves.contains(&leaf)
    }
}

impl PartialEq for JournalFamily {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for JournalFamily {}

impl std::fmt::Display for JournalFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

impl Serialize for JournalFamily {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name)
    }
}

/// Daemon identifier - cheaply cloneable
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct DaemonId(Arc<str>);

impl DaemonId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(Arc::from(s.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DaemonId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for DaemonId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl From<String> for DaemonId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for DaemonId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Daemon lifecycle status
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DaemonStatus {
    Stopped,
    Running,
    Completed,
}

impl std::fmt::Display for DaemonStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
        }
    }
}
