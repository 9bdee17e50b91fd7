//! Nested namespaces: ordered string-keyed maps whose nested mappings are
//! themselves namespaces.
//!
//! A [`Namespace`] can only be built through the conversion functions in this
//! module or by inserting [`Value`]s, and [`Value::Map`] always holds a
//! `Namespace`. No raw `serde_yaml`/`serde_json` mapping is reachable from a
//! converted tree.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde_yaml::Number;

/// A leaf or container inside a [`Namespace`].
///
/// A [`Value::Path`] compares equal to the [`Value::String`] it is written as,
/// so a saved and reloaded config compares equal to the original.
#[derive(Debug, Clone, Default)]
pub enum Value {
  /// Explicitly absent. Reads through [`Namespace::get`] the same as a missing key.
  #[default]
  Null,
  Bool(bool),
  Number(Number),
  String(String),
  /// A filesystem path. Serialized as its string form.
  Path(PathBuf),
  Seq(Vec<Value>),
  Map(Namespace),
}

impl PartialEq for Value {
  fn eq(&self, other: &Self) -> bool {
    match (self, other) {
      (Value::Null, Value::Null) => true,
      (Value::Bool(a), Value::Bool(b)) => a == b,
      (Value::Number(a), Value::Number(b)) => a == b,
      (Value::String(a), Value::String(b)) => a == b,
      (Value::Path(a), Value::Path(b)) => a == b,
      (Value::Path(p), Value::String(s)) | (Value::String(s), Value::Path(p)) => {
        p.as_os_str() == s.as_str()
      }
      (Value::Seq(a), Value::Seq(b)) => a == b,
      (Value::Map(a), Value::Map(b)) => a == b,
      _ => false,
    }
  }
}

impl Value {
  pub fn is_null(&self) -> bool {
    matches!(self, Value::Null)
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Value::String(s) => Some(s),
      Value::Path(p) => p.to_str(),
      _ => None,
    }
  }

  pub fn as_bool(&self) -> Option<bool> {
    match self {
      Value::Bool(b) => Some(*b),
      _ => None,
    }
  }

  pub fn as_i64(&self) -> Option<i64> {
    match self {
      Value::Number(n) => n.as_i64(),
      _ => None,
    }
  }

  pub fn as_u64(&self) -> Option<u64> {
    match self {
      Value::Number(n) => n.as_u64(),
      _ => None,
    }
  }

  pub fn as_f64(&self) -> Option<f64> {
    match self {
      Value::Number(n) => n.as_f64(),
      _ => None,
    }
  }

  /// Paths written to disk come back as plain strings, so both read as a path.
  pub fn as_path(&self) -> Option<&Path> {
    match self {
      Value::Path(p) => Some(p),
      Value::String(s) => Some(Path::new(s)),
      _ => None,
    }
  }

  pub fn as_seq(&self) -> Option<&[Value]> {
    match self {
      Value::Seq(items) => Some(items),
      _ => None,
    }
  }

  pub fn as_seq_mut(&mut self) -> Option<&mut Vec<Value>> {
    match self {
      Value::Seq(items) => Some(items),
      _ => None,
    }
  }

  pub fn as_map(&self) -> Option<&Namespace> {
    match self {
      Value::Map(ns) => Some(ns),
      _ => None,
    }
  }

  pub fn as_map_mut(&mut self) -> Option<&mut Namespace> {
    match self {
      Value::Map(ns) => Some(ns),
      _ => None,
    }
  }
}

impl From<&str> for Value {
  fn from(s: &str) -> Self {
    Value::String(s.to_string())
  }
}

impl From<String> for Value {
  fn from(s: String) -> Self {
    Value::String(s)
  }
}

impl From<bool> for Value {
  fn from(b: bool) -> Self {
    Value::Bool(b)
  }
}

impl From<i64> for Value {
  fn from(n: i64) -> Self {
    Value::Number(n.into())
  }
}

impl From<u64> for Value {
  fn from(n: u64) -> Self {
    Value::Number(n.into())
  }
}

impl From<f64> for Value {
  fn from(n: f64) -> Self {
    Value::Number(n.into())
  }
}

impl From<PathBuf> for Value {
  fn from(p: PathBuf) -> Self {
    Value::Path(p)
  }
}

impl From<Vec<Value>> for Value {
  fn from(items: Vec<Value>) -> Self {
    Value::Seq(items)
  }
}

impl From<Namespace> for Value {
  fn from(ns: Namespace) -> Self {
    Value::Map(ns)
  }
}

impl<T: Into<Value>> From<Option<T>> for Value {
  fn from(v: Option<T>) -> Self {
    v.map_or(Value::Null, Into::into)
  }
}

impl From<&serde_yaml::Value> for Value {
  fn from(value: &serde_yaml::Value) -> Self {
    match value {
      serde_yaml::Value::Null => Value::Null,
      serde_yaml::Value::Bool(b) => Value::Bool(*b),
      serde_yaml::Value::Number(n) => Value::Number(n.clone()),
      serde_yaml::Value::String(s) => Value::String(s.clone()),
      serde_yaml::Value::Sequence(items) => Value::Seq(items.iter().map(Value::from).collect()),
      serde_yaml::Value::Mapping(mapping) => Value::Map(convert(mapping)),
      // Tags carry no meaning in the cluster description; keep the tagged value.
      serde_yaml::Value::Tagged(tagged) => Value::from(&tagged.value),
    }
  }
}

impl From<&serde_json::Value> for Value {
  fn from(value: &serde_json::Value) -> Self {
    match value {
      serde_json::Value::Null => Value::Null,
      serde_json::Value::Bool(b) => Value::Bool(*b),
      serde_json::Value::Number(n) => json_number(n),
      serde_json::Value::String(s) => Value::String(s.clone()),
      serde_json::Value::Array(items) => Value::Seq(items.iter().map(Value::from).collect()),
      serde_json::Value::Object(map) => Value::Map(convert_json(map)),
    }
  }
}

fn json_number(n: &serde_json::Number) -> Value {
  if let Some(i) = n.as_i64() {
    Value::from(i)
  } else if let Some(u) = n.as_u64() {
    Value::from(u)
  } else {
    n.as_f64().map_or(Value::Null, Value::from)
  }
}

/// An insertion-ordered map from field name to [`Value`].
///
/// Missing keys are not an error: [`Namespace::get`] returns `None` both for
/// keys that were never set and for keys explicitly set to [`Value::Null`].
/// Use [`Namespace::contains_key`] to tell the two apart.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Namespace {
  entries: IndexMap<String, Value>,
}

impl Namespace {
  pub fn new() -> Self {
    Self::default()
  }

  /// Returns the value stored under `key`, or `None` if it is missing or null.
  pub fn get(&self, key: &str) -> Option<&Value> {
    self.entries.get(key).filter(|v| !v.is_null())
  }

  /// Returns the stored entry as-is, explicit nulls included.
  pub fn get_raw(&self, key: &str) -> Option<&Value> {
    self.entries.get(key)
  }

  /// Mutable access to a present entry, null entries included.
  pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
    self.entries.get_mut(key)
  }

  pub fn get_str(&self, key: &str) -> Option<&str> {
    self.get(key).and_then(Value::as_str)
  }

  pub fn contains_key(&self, key: &str) -> bool {
    self.entries.contains_key(key)
  }

  /// Inserts or replaces `key`. A new key goes to the end; a replaced key keeps its position.
  pub fn insert<K, V>(&mut self, key: K, value: V) -> Option<Value>
  where
    K: Into<String>,
    V: Into<Value>,
  {
    self.entries.insert(key.into(), value.into())
  }

  /// Removes `key` and keeps the order of the remaining entries.
  pub fn remove(&mut self, key: &str) -> Option<Value> {
    self.entries.shift_remove(key)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn keys(&self) -> impl Iterator<Item = &str> {
    self.entries.keys().map(String::as_str)
  }

  pub fn values(&self) -> impl Iterator<Item = &Value> {
    self.entries.values()
  }

  pub fn values_mut(&mut self) -> impl Iterator<Item = &mut Value> {
    self.entries.values_mut()
  }

  pub fn iter(&self) -> indexmap::map::Iter<'_, String, Value> {
    self.entries.iter()
  }

  pub fn iter_mut(&mut self) -> indexmap::map::IterMut<'_, String, Value> {
    self.entries.iter_mut()
  }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Namespace {
  fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
    Self {
      entries: iter
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect(),
    }
  }
}

impl<'a> IntoIterator for &'a Namespace {
  type Item = (&'a String, &'a Value);
  type IntoIter = indexmap::map::Iter<'a, String, Value>;

  fn into_iter(self) -> Self::IntoIter {
    self.entries.iter()
  }
}

impl IntoIterator for Namespace {
  type Item = (String, Value);
  type IntoIter = indexmap::map::IntoIter<String, Value>;

  fn into_iter(self) -> Self::IntoIter {
    self.entries.into_iter()
  }
}

impl From<&serde_yaml::Mapping> for Namespace {
  fn from(mapping: &serde_yaml::Mapping) -> Self {
    convert(mapping)
  }
}

impl From<&serde_json::Map<String, serde_json::Value>> for Namespace {
  fn from(map: &serde_json::Map<String, serde_json::Value>) -> Self {
    convert_json(map)
  }
}

/// Converts a YAML mapping into a [`Namespace`], recursing through nested
/// mappings and sequences. The input is left untouched.
pub fn convert(mapping: &serde_yaml::Mapping) -> Namespace {
  let mut ns = Namespace::new();
  for (key, value) in mapping {
    match yaml_key(key) {
      Some(key) => {
        ns.insert(key, Value::from(value));
      }
      None => tracing::warn!(?key, "Skipping mapping entry with a non-scalar key"),
    }
  }
  ns
}

/// Converts a JSON object into a [`Namespace`], same rules as [`convert`].
pub fn convert_json(map: &serde_json::Map<String, serde_json::Value>) -> Namespace {
  map
    .iter()
    .map(|(k, v)| (k.clone(), Value::from(v)))
    .collect()
}

fn yaml_key(key: &serde_yaml::Value) -> Option<String> {
  match key {
    serde_yaml::Value::String(s) => Some(s.clone()),
    serde_yaml::Value::Number(n) => Some(n.to_string()),
    serde_yaml::Value::Bool(b) => Some(b.to_string()),
    serde_yaml::Value::Tagged(tagged) => yaml_key(&tagged.value),
    _ => None,
  }
}
