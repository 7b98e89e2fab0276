//! JSON Snapshot Bridge
//!
//! Converts between [`Raw`] values and `serde_json::Value`. This is the
//! fixture and diagnostics surface: tests build state with `json!` literals,
//! and callers can snapshot a container tree for logging or assertions.
//!
//! Snapshots read the *current* contents of containers without tracking;
//! taking one inside an effect establishes no dependencies.

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use serde_json::{Map as JsonMap, Number, Value as Json};
use thiserror::Error;

use super::{Key, ListData, Raw, RecordData};
use crate::reactive::dep::TargetId;

/// Failure to represent a value tree as JSON.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// NaN and infinities have no JSON representation.
    #[error("non-finite number cannot be represented in JSON")]
    NonFiniteNumber,

    /// The value graph references one of its own ancestors.
    #[error("cyclic value cannot be snapshotted")]
    CyclicValue,
}

impl Raw {
    /// Build a value tree from JSON. Objects become records, arrays become
    /// lists; maps and sets are never produced by this conversion.
    pub fn from_json(json: &Json) -> Raw {
        match json {
            Json::Null => Raw::Unit,
            Json::Bool(b) => Raw::Bool(*b),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Raw::Int(i)
                } else {
                    Raw::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Json::String(s) => Raw::Str(Arc::from(s.as_str())),
            Json::Array(items) => {
                Raw::List(ListData::new(items.iter().map(Raw::from_json).collect()))
            }
            Json::Object(fields) => {
                let entries: IndexMap<Arc<str>, Raw> = fields
                    .iter()
                    .map(|(k, v)| (Arc::from(k.as_str()), Raw::from_json(v)))
                    .collect();
                Raw::Record(RecordData::new(entries))
            }
        }
    }

    /// Snapshot the current contents of this value tree as JSON.
    ///
    /// Map keys are stringified; sets become arrays of their elements.
    pub fn to_json(&self) -> Result<Json, SnapshotError> {
        let mut seen = HashSet::new();
        self.to_json_inner(&mut seen)
    }

    fn to_json_inner(&self, seen: &mut HashSet<TargetId>) -> Result<Json, SnapshotError> {
        let guard = self.target_id();
        if let Some(id) = guard {
            if !seen.insert(id) {
                return Err(SnapshotError::CyclicValue);
            }
        }

        let result = match self {
            Raw::Unit => Ok(Json::Null),
            Raw::Bool(b) => Ok(Json::Bool(*b)),
            Raw::Int(i) => Ok(Json::Number((*i).into())),
            Raw::Float(x) => Number::from_f64(*x)
                .map(Json::Number)
                .ok_or(SnapshotError::NonFiniteNumber),
            Raw::Str(s) => Ok(Json::String(s.to_string())),
            Raw::Record(data) => {
                let entries: IndexMap<Arc<str>, Raw> = data.entries.read().clone();
                let mut out = JsonMap::new();
                for (k, v) in &entries {
                    out.insert(k.to_string(), v.to_json_inner(seen)?);
                }
                Ok(Json::Object(out))
            }
            Raw::List(data) => {
                let items: Vec<Raw> = data.items.read().clone();
                items
                    .iter()
                    .map(|v| v.to_json_inner(seen))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Json::Array)
            }
            Raw::Map(data) => {
                let entries: IndexMap<Key, Raw> = data.entries.read().clone();
                let mut out = JsonMap::new();
                for (k, v) in &entries {
                    out.insert(k.to_string(), v.to_json_inner(seen)?);
                }
                Ok(Json::Object(out))
            }
            Raw::Set(data) => {
                let items: IndexSet<Key> = data.items.read().clone();
                items
                    .iter()
                    .map(|k| Raw::from(k.clone()).to_json_inner(seen))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Json::Array)
            }
        };

        if let Some(id) = guard {
            seen.remove(&id);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_round_trip() {
        let source = json!({
            "name": "weft",
            "count": 3,
            "ratio": 0.5,
            "tags": ["a", "b"],
            "nested": { "ok": true, "none": null }
        });

        let raw = Raw::from_json(&source);
        assert_eq!(raw.to_json().unwrap(), source);
    }

    #[test]
    fn map_and_set_snapshots() {
        let map = Raw::map_from([("a", 1i64), ("b", 2i64)]);
        assert_eq!(map.to_json().unwrap(), json!({ "a": 1, "b": 2 }));

        let set = Raw::set_from([1i64, 2, 3]);
        assert_eq!(set.to_json().unwrap(), json!([1, 2, 3]));
    }

    #[test]
    fn nan_snapshot_fails() {
        let raw = Raw::record_from([("x", f64::NAN)]);
        assert!(matches!(
            raw.to_json(),
            Err(SnapshotError::NonFiniteNumber)
        ));
    }

    #[test]
    fn cyclic_snapshot_fails() {
        let outer = Raw::record();
        if let Raw::Record(data) = &outer {
            data.entries
                .write()
                .insert(Arc::from("me"), outer.clone());
        }
        assert!(matches!(outer.to_json(), Err(SnapshotError::CyclicValue)));
    }
}
