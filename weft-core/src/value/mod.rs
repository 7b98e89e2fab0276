//! Raw Data Model
//!
//! This module defines the unobserved values the engine operates on: scalars
//! plus four shared container flavors (record, list, map, set). Containers
//! are reference-counted allocations that carry their own stable target ID,
//! so wrapping the same container twice always refers to the same dependency
//! target.
//!
//! Nothing in this module tracks or triggers. Observability is layered on
//! top by the wrapper types in [`crate::observe`].
//!
//! # Value identity
//!
//! Scalars compare by value. Containers compare by pointer identity: two
//! `Raw` handles are the "same value" only when they share the underlying
//! allocation. This is what makes change detection on container-valued
//! fields cheap and unambiguous.

mod json;

pub use json::SnapshotError;

use std::fmt::Debug;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;

use crate::reactive::dep::TargetId;

/// Hashable scalar key used by map and set collections.
///
/// Record fields are always string-keyed and list slots are index-keyed;
/// `Key` exists for the collection flavors whose key space is open.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Bool(bool),
    Int(i64),
    Str(Arc<str>),
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Key::Bool(b) => write!(f, "{b}"),
            Key::Int(i) => write!(f, "{i}"),
            Key::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<bool> for Key {
    fn from(value: bool) -> Self {
        Key::Bool(value)
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Key::Int(value)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Str(Arc::from(value))
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::Str(Arc::from(value.as_str()))
    }
}

/// Backing storage for a record: string-keyed fields plus an optional
/// prototype record consulted when a field is missing.
pub struct RecordData {
    pub(crate) id: TargetId,
    pub(crate) proto: RwLock<Option<Arc<RecordData>>>,
    pub(crate) entries: RwLock<IndexMap<Arc<str>, Raw>>,
}

impl RecordData {
    pub(crate) fn new(entries: IndexMap<Arc<str>, Raw>) -> Arc<Self> {
        Arc::new(Self {
            id: TargetId::next(),
            proto: RwLock::new(None),
            entries: RwLock::new(entries),
        })
    }
}

/// Backing storage for an ordered sequence.
pub struct ListData {
    pub(crate) id: TargetId,
    pub(crate) items: RwLock<Vec<Raw>>,
}

impl ListData {
    pub(crate) fn new(items: Vec<Raw>) -> Arc<Self> {
        Arc::new(Self {
            id: TargetId::next(),
            items: RwLock::new(items),
        })
    }
}

/// Backing storage for a key-value collection.
pub struct MapData {
    pub(crate) id: TargetId,
    pub(crate) entries: RwLock<IndexMap<Key, Raw>>,
}

impl MapData {
    pub(crate) fn new(entries: IndexMap<Key, Raw>) -> Arc<Self> {
        Arc::new(Self {
            id: TargetId::next(),
            entries: RwLock::new(entries),
        })
    }
}

/// Backing storage for a key-set collection.
pub struct SetData {
    pub(crate) id: TargetId,
    pub(crate) items: RwLock<IndexSet<Key>>,
}

impl SetData {
    pub(crate) fn new(items: IndexSet<Key>) -> Arc<Self> {
        Arc::new(Self {
            id: TargetId::next(),
            items: RwLock::new(items),
        })
    }
}

/// An unobserved dynamic value.
///
/// Container variants are cheap handles onto shared storage; cloning a `Raw`
/// never deep-copies a container.
#[derive(Clone)]
pub enum Raw {
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Record(Arc<RecordData>),
    List(Arc<ListData>),
    Map(Arc<MapData>),
    Set(Arc<SetData>),
}

impl Raw {
    /// Create an empty record.
    pub fn record() -> Raw {
        Raw::Record(RecordData::new(IndexMap::new()))
    }

    /// Create a record from `(field, value)` pairs.
    pub fn record_from<K, V, I>(fields: I) -> Raw
    where
        K: Into<Arc<str>>,
        V: Into<Raw>,
        I: IntoIterator<Item = (K, V)>,
    {
        let entries = fields
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Raw::Record(RecordData::new(entries))
    }

    /// Create an empty list.
    pub fn list() -> Raw {
        Raw::List(ListData::new(Vec::new()))
    }

    /// Create a list from items.
    pub fn list_from<V, I>(items: I) -> Raw
    where
        V: Into<Raw>,
        I: IntoIterator<Item = V>,
    {
        Raw::List(ListData::new(items.into_iter().map(Into::into).collect()))
    }

    /// Create an empty map.
    pub fn map() -> Raw {
        Raw::Map(MapData::new(IndexMap::new()))
    }

    /// Create a map from `(key, value)` pairs.
    pub fn map_from<K, V, I>(entries: I) -> Raw
    where
        K: Into<Key>,
        V: Into<Raw>,
        I: IntoIterator<Item = (K, V)>,
    {
        let entries = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Raw::Map(MapData::new(entries))
    }

    /// Create an empty set.
    pub fn set() -> Raw {
        Raw::Set(SetData::new(IndexSet::new()))
    }

    /// Create a set from elements.
    pub fn set_from<K, I>(items: I) -> Raw
    where
        K: Into<Key>,
        I: IntoIterator<Item = K>,
    {
        Raw::Set(SetData::new(items.into_iter().map(Into::into).collect()))
    }

    /// Whether this value is a container flavor.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            Raw::Record(_) | Raw::List(_) | Raw::Map(_) | Raw::Set(_)
        )
    }

    /// The dependency target this value represents, if it is a container.
    pub(crate) fn target_id(&self) -> Option<TargetId> {
        match self {
            Raw::Record(data) => Some(data.id),
            Raw::List(data) => Some(data.id),
            Raw::Map(data) => Some(data.id),
            Raw::Set(data) => Some(data.id),
            _ => None,
        }
    }

    /// Change-detection equality.
    ///
    /// Scalars compare by value with one carve-out: a float that is NaN is
    /// considered the same value as another NaN, so overwriting NaN with NaN
    /// never counts as a change. Containers compare by pointer identity.
    /// Values of different variants are never the same.
    pub fn same_value(&self, other: &Raw) -> bool {
        match (self, other) {
            (Raw::Unit, Raw::Unit) => true,
            (Raw::Bool(a), Raw::Bool(b)) => a == b,
            (Raw::Int(a), Raw::Int(b)) => a == b,
            (Raw::Float(a), Raw::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Raw::Str(a), Raw::Str(b)) => a == b,
            (Raw::Record(a), Raw::Record(b)) => Arc::ptr_eq(a, b),
            (Raw::List(a), Raw::List(b)) => Arc::ptr_eq(a, b),
            (Raw::Map(a), Raw::Map(b)) => Arc::ptr_eq(a, b),
            (Raw::Set(a), Raw::Set(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for Raw {
    fn from(value: bool) -> Self {
        Raw::Bool(value)
    }
}

impl From<i64> for Raw {
    fn from(value: i64) -> Self {
        Raw::Int(value)
    }
}

impl From<f64> for Raw {
    fn from(value: f64) -> Self {
        Raw::Float(value)
    }
}

impl From<&str> for Raw {
    fn from(value: &str) -> Self {
        Raw::Str(Arc::from(value))
    }
}

impl From<String> for Raw {
    fn from(value: String) -> Self {
        Raw::Str(Arc::from(value.as_str()))
    }
}

impl From<Key> for Raw {
    fn from(value: Key) -> Self {
        match value {
            Key::Bool(b) => Raw::Bool(b),
            Key::Int(i) => Raw::Int(i),
            Key::Str(s) => Raw::Str(s),
        }
    }
}

impl Debug for Raw {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Raw::Unit => write!(f, "Unit"),
            Raw::Bool(b) => write!(f, "Bool({b})"),
            Raw::Int(i) => write!(f, "Int({i})"),
            Raw::Float(x) => write!(f, "Float({x})"),
            Raw::Str(s) => write!(f, "Str({s:?})"),
            Raw::Record(data) => write!(f, "Record(#{:?})", data.id),
            Raw::List(data) => write!(f, "List(#{:?})", data.id),
            Raw::Map(data) => write!(f, "Map(#{:?})", data.id),
            Raw::Set(data) => write!(f, "Set(#{:?})", data.id),
        }
    }
}
