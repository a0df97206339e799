//! Index model: the `repodata.json` document of one subdir and its package records.
//!
//! Only the fields the patch rules read are typed; everything else is carried
//! through `extra` untouched so a cached clone round-trips without loss.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::PatchError;

/// A subdir's index, keyed by package filename.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Repodata {
    #[serde(default)]
    pub packages: BTreeMap<String, PackageRecord>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One package entry of an index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageRecord {
    pub name: String,
    pub version: String,
    /// Stored as an integer by most indexers, as a string by some.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_number: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends: Option<Vec<String>>,
    /// Any JSON value; only its truthiness is read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_in_name: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PackageRecord {
    /// Numeric build number. Missing or non-integer values are a data-integrity fault.
    pub fn build_number(&self, identifier: &str) -> Result<i64, PatchError> {
        let parsed = match &self.build_number {
            Some(Value::Number(n)) => n.as_i64(),
            Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        parsed.ok_or_else(|| PatchError::MalformedRecord {
            identifier: identifier.to_string(),
            reason: match &self.build_number {
                None => "missing build_number".to_string(),
                Some(raw) => format!("build_number {raw} is not an integer"),
            },
        })
    }

    /// Whether the record already sets `namespace_in_name` to a truthy value.
    pub fn namespace_in_name(&self) -> bool {
        match &self.namespace_in_name {
            None | Some(Value::Null) => false,
            Some(Value::Bool(flag)) => *flag,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Array(items)) => !items.is_empty(),
            Some(Value::Object(fields)) => !fields.is_empty(),
        }
    }

    /// The dependency list. A record without one is a data-integrity fault.
    pub fn depends(&self, identifier: &str) -> Result<&[String], PatchError> {
        self.depends
            .as_deref()
            .ok_or_else(|| PatchError::MalformedRecord {
                identifier: identifier.to_string(),
                reason: "missing depends".to_string(),
            })
    }
}

/// Name segment of a dependency specifier (`"r-base 3.1.2 0"` -> `"r-base"`).
pub fn dependency_name(spec: &str) -> &str {
    spec.split_whitespace().next().unwrap_or("")
}
