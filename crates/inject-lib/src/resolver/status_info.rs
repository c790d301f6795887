//! Checked access to the verbose status `info` document
//!
//! The document is produced by the runtime (containerd, CRI-O, ...) and its
//! shape differs between vendors and versions. Every descent step goes through
//! [`Field`], which checks presence and type and reports the dotted path of the
//! field it was looking at.

use super::NetnsPath;
use crate::error::InjectError;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// Key of the JSON document inside the verbose `info` map
const INFO_KEY: &str = "info";

const NAMESPACES_PATH: &[&str] = &["runtimeSpec", "linux", "namespaces"];

/// A value inside the status document together with its path
#[derive(Debug, Clone)]
pub struct Field<'a> {
    path: String,
    value: &'a Value,
}

impl<'a> Field<'a> {
    pub fn root(value: &'a Value) -> Self {
        Self {
            path: String::new(),
            value,
        }
    }

    /// Dotted path of this field; the document root is `info`
    pub fn path(&self) -> &str {
        if self.path.is_empty() {
            INFO_KEY
        } else {
            &self.path
        }
    }

    fn child_path(&self, key: &str) -> String {
        if self.path.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", self.path, key)
        }
    }

    fn error(&self, reason: impl Into<String>) -> InjectError {
        InjectError::info_parse(self.path(), reason)
    }

    /// Descend into object member `key`
    pub fn get(&self, key: &str) -> Result<Field<'a>, InjectError> {
        let object = self
            .value
            .as_object()
            .ok_or_else(|| self.error(format!("expected an object, found {}", kind(self.value))))?;

        let path = self.child_path(key);
        match object.get(key) {
            Some(value) => Ok(Field { path, value }),
            None => Err(InjectError::info_parse(path, "missing")),
        }
    }

    /// Descend along `keys`, one checked step at a time
    pub fn get_path(&self, keys: &[&str]) -> Result<Field<'a>, InjectError> {
        keys.iter()
            .try_fold(self.clone(), |field, key| field.get(key))
    }

    /// Elements of an array, each carrying its indexed path
    pub fn elements(&self) -> Result<Vec<Field<'a>>, InjectError> {
        let items = self
            .value
            .as_array()
            .ok_or_else(|| self.error(format!("expected an array, found {}", kind(self.value))))?;

        Ok(items
            .iter()
            .enumerate()
            .map(|(i, value)| Field {
                path: format!("{}[{}]", self.path(), i),
                value,
            })
            .collect())
    }

    pub fn as_str(&self) -> Result<&'a str, InjectError> {
        self.value
            .as_str()
            .ok_or_else(|| self.error(format!("expected a string, found {}", kind(self.value))))
    }

    /// A strictly positive integer; integral floats are accepted
    pub fn as_pid(&self) -> Result<u32, InjectError> {
        let pid = match self.value {
            Value::Number(n) => {
                if let Some(v) = n.as_u64() {
                    Some(v)
                } else {
                    n.as_f64()
                        .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f <= u32::MAX as f64)
                        .map(|f| f as u64)
                }
            }
            other => {
                return Err(self.error(format!("expected a number, found {}", kind(other))));
            }
        };

        match pid.and_then(|p| u32::try_from(p).ok()) {
            Some(p) if p > 0 => Ok(p),
            _ => Err(self.error(format!("not a usable pid: {}", self.value))),
        }
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// How a namespace path was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetnsSource {
    /// `runtimeSpec.linux.namespaces[].path` of the network entry
    NamespaceEntry,
    /// Synthesised from the `pid` field
    Pid,
}

/// Parsed verbose status document
#[derive(Debug, Clone)]
pub struct StatusInfo {
    root: Value,
}

impl StatusInfo {
    /// Parse the JSON document stored under `"info"` in a verbose status map
    pub fn from_info_map(info: &HashMap<String, String>) -> Result<Self, InjectError> {
        let raw = info
            .get(INFO_KEY)
            .ok_or_else(|| InjectError::info_parse(INFO_KEY, "missing from verbose status"))?;
        let root: Value = serde_json::from_str(raw)
            .map_err(|e| InjectError::info_parse(INFO_KEY, format!("invalid JSON: {}", e)))?;
        Self::from_value(root)
    }

    pub fn from_value(root: Value) -> Result<Self, InjectError> {
        if !root.is_object() {
            return Err(InjectError::info_parse(
                INFO_KEY,
                format!("expected an object, found {}", kind(&root)),
            ));
        }
        Ok(Self { root })
    }

    pub fn as_value(&self) -> &Value {
        &self.root
    }

    /// Locate the network namespace
    ///
    /// The `network` entry of `runtimeSpec.linux.namespaces` is preferred
    /// unconditionally; `/proc/<pid>/ns/net` is used only when there is no
    /// such entry. Malformed namespace entries are errors, not a reason to
    /// fall back.
    pub fn network_namespace(&self) -> Result<(NetnsPath, NetnsSource), InjectError> {
        let root = Field::root(&self.root);

        let entry_miss = match root.get_path(NAMESPACES_PATH).and_then(|f| f.elements()) {
            Ok(entries) => match network_entry(&entries)? {
                Some(path) => return Ok((path, NetnsSource::NamespaceEntry)),
                None => format!("no network entry in {}", NAMESPACES_PATH.join(".")),
            },
            Err(e) => {
                debug!(error = %e, "Namespace list unavailable, falling back to pid");
                e.to_string()
            }
        };

        match root.get("pid").and_then(|f| f.as_pid()) {
            Ok(pid) => Ok((NetnsPath::from_pid(pid), NetnsSource::Pid)),
            Err(pid_miss) => Err(InjectError::NamespaceNotFound {
                detail: format!("{}; {}", entry_miss, pid_miss),
            }),
        }
    }
}

/// Path of the first `network` entry with a non-empty path
fn network_entry(entries: &[Field<'_>]) -> Result<Option<NetnsPath>, InjectError> {
    for entry in entries {
        if entry.get("type")?.as_str()? != "network" {
            continue;
        }

        let path = entry.get("path")?;
        match NetnsPath::new(path.as_str()?) {
            Some(netns) => return Ok(Some(netns)),
            None => debug!(field = %path.path(), "Network namespace entry has an empty path"),
        }
    }
    Ok(None)
}
